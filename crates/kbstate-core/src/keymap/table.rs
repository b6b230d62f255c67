// Kbstate Table Keymap
// Pure Rust keymap built from a keycode -> action table

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::rc::Rc;

use smallvec::SmallVec;
use strum::IntoEnumIterator;

use super::{
    KeyDirection, Keymap, KeymapError, ModComponent, TranslationState, EVDEV_KEYCODE_OFFSET,
};
use crate::modifier::{Modifiers, StandardModifier};
use crate::state::KEYS_CAP;

/// What a key does to the modifier/group state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    /// Modifiers are depressed while the key is held
    SetMods(Modifiers),
    /// Held like `SetMods`; latched on release if no other key was pressed meanwhile
    LatchMods(Modifiers),
    /// Held like `SetMods`; toggles the locked state on every press
    LockMods(Modifiers),
    /// Shift the base group while held
    SetGroup(u32),
    /// Lock the given group
    LockGroup(u32),
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAction::SetMods(mods) => write!(f, "SetMods({})", ModNames(*mods)),
            KeyAction::LatchMods(mods) => write!(f, "LatchMods({})", ModNames(*mods)),
            KeyAction::LockMods(mods) => write!(f, "LockMods({})", ModNames(*mods)),
            KeyAction::SetGroup(group) => write!(f, "SetGroup({})", group),
            KeyAction::LockGroup(group) => write!(f, "LockGroup({})", group),
        }
    }
}

/// Formats a modifier mask as `Shift+Control`, or `none`
struct ModNames(Modifiers);

impl fmt::Display for ModNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for modifier in StandardModifier::iter().filter(|m| self.0.contains(m.flag())) {
            if !first {
                f.write_str("+")?;
            }
            f.write_str(modifier.keymap_name())?;
            first = false;
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct TableData {
    /// Modifiers the keymap defines; each sits at its standard bit
    defined: Modifiers,
    groups: u32,
    /// Keyed by XKB keycode
    keys: BTreeMap<u32, KeyAction>,
    /// Indicator name and the locked modifiers that light it
    leds: Vec<(String, Modifiers)>,
}

/// A small, fully deterministic keymap defined in Rust.
///
/// Cloning is cheap and shares the underlying table.
#[derive(Debug, Clone)]
pub struct TableKeymap {
    data: Rc<TableData>,
}

/// Builder for [`TableKeymap`]
#[derive(Debug)]
pub struct TableKeymapBuilder {
    defined: Modifiers,
    groups: u32,
    keys: BTreeMap<u32, KeyAction>,
    leds: Vec<(String, Modifiers)>,
}

impl TableKeymapBuilder {
    /// Restrict the keymap to the given modifiers (default: all eight)
    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.defined = modifiers;
        self
    }

    /// Number of groups (layouts); at least one
    pub fn groups(mut self, groups: u32) -> Self {
        self.groups = groups.max(1);
        self
    }

    /// Bind an evdev keycode to an action
    pub fn key(mut self, keycode: u32, action: KeyAction) -> Self {
        self.keys.insert(keycode.wrapping_add(EVDEV_KEYCODE_OFFSET), action);
        self
    }

    /// Define an indicator lit while any of `locked` is locked
    pub fn led(mut self, name: impl Into<String>, locked: Modifiers) -> Self {
        let name = name.into();
        match self.leds.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = locked,
            None => self.leds.push((name, locked)),
        }
        self
    }

    pub fn build(self) -> TableKeymap {
        TableKeymap {
            data: Rc::new(TableData {
                defined: self.defined,
                groups: self.groups,
                keys: self.keys,
                leds: self.leds,
            }),
        }
    }
}

impl TableKeymap {
    pub fn builder() -> TableKeymapBuilder {
        TableKeymapBuilder {
            defined: Modifiers::all(),
            groups: 1,
            keys: BTreeMap::new(),
            leds: Vec::new(),
        }
    }

    /// Standard PC keyboard modifiers and lock keys
    pub fn pc105() -> Self {
        Self::builder()
            .key(42, KeyAction::SetMods(Modifiers::SHIFT)) // LEFT_SHIFT
            .key(54, KeyAction::SetMods(Modifiers::SHIFT)) // RIGHT_SHIFT
            .key(29, KeyAction::SetMods(Modifiers::CTRL)) // LEFT_CTRL
            .key(97, KeyAction::SetMods(Modifiers::CTRL)) // RIGHT_CTRL
            .key(56, KeyAction::SetMods(Modifiers::ALT)) // LEFT_ALT
            .key(100, KeyAction::SetMods(Modifiers::MOD5)) // RIGHT_ALT (AltGr)
            .key(125, KeyAction::SetMods(Modifiers::LOGO)) // LEFT_META
            .key(126, KeyAction::SetMods(Modifiers::LOGO)) // RIGHT_META
            .key(58, KeyAction::LockMods(Modifiers::CAPS)) // CAPSLOCK
            .key(69, KeyAction::LockMods(Modifiers::MOD2)) // NUMLOCK
            .key(70, KeyAction::LockMods(Modifiers::MOD3)) // SCROLLLOCK
            .led("Num Lock", Modifiers::MOD2)
            .led("Caps Lock", Modifiers::CAPS)
            .led("Scroll Lock", Modifiers::MOD3)
            .build()
    }

    /// Action bound to an evdev keycode
    pub fn action(&self, keycode: u32) -> Option<KeyAction> {
        self.data
            .keys
            .get(&keycode.wrapping_add(EVDEV_KEYCODE_OFFSET))
            .copied()
    }

    pub fn groups(&self) -> u32 {
        self.data.groups
    }
}

impl Keymap for TableKeymap {
    type State = TableState;

    fn new_state(&self) -> Result<TableState, KeymapError> {
        Ok(TableState {
            data: Rc::clone(&self.data),
            held: SmallVec::new(),
            depressed: 0,
            latched: 0,
            locked: 0,
            pending_latch: 0,
            base_group: 0,
            latched_group: 0,
            locked_group: 0,
        })
    }

    fn serialize(&self) -> Result<String, KeymapError> {
        let mut out = String::new();
        write_table(&self.data, &mut out).map_err(|e| KeymapError::Serialize(e.to_string()))?;
        Ok(out)
    }

    fn mod_index(&self, name: &str) -> Option<u32> {
        StandardModifier::iter()
            .find(|m| m.keymap_name() == name)
            .filter(|m| self.data.defined.contains(m.flag()))
            .map(|m| m as u32)
    }

    fn led_index(&self, name: &str) -> Option<u32> {
        self.data
            .leds
            .iter()
            .position(|(n, _)| n == name)
            .map(|index| index as u32)
    }
}

fn write_table(data: &TableData, out: &mut String) -> fmt::Result {
    writeln!(out, "kbstate_table_keymap {{")?;
    writeln!(out, "\tgroups = {};", data.groups)?;
    writeln!(out, "\tmodifiers = {};", ModNames(data.defined))?;
    for (keycode, action) in &data.keys {
        writeln!(out, "\tkey <{}> = {};", keycode, action)?;
    }
    for (name, locked) in &data.leds {
        writeln!(out, "\tindicator \"{}\" = {};", name, ModNames(*locked))?;
    }
    writeln!(out, "}};")
}

/// Translation state for a [`TableKeymap`]
#[derive(Debug, Clone)]
pub struct TableState {
    data: Rc<TableData>,
    held: SmallVec<[u32; KEYS_CAP]>,
    depressed: u32,
    latched: u32,
    locked: u32,
    /// Latches armed by held latch keys, applied on release
    pending_latch: u32,
    base_group: u32,
    latched_group: u32,
    locked_group: u32,
}

impl TableState {
    fn mask(&self, mods: Modifiers) -> u32 {
        (mods & self.data.defined).bits()
    }

    /// Modifiers still depressed by held keys other than the one released
    fn held_mods(&self) -> u32 {
        self.held
            .iter()
            .filter_map(|keycode| self.data.keys.get(keycode))
            .map(|action| match action {
                KeyAction::SetMods(m) | KeyAction::LatchMods(m) | KeyAction::LockMods(m) => {
                    self.mask(*m)
                }
                _ => 0,
            })
            .fold(0, |acc, m| acc | m)
    }

    fn key_down(&mut self, keycode: u32) {
        if self.held.contains(&keycode) {
            return;
        }
        if self.held.len() >= KEYS_CAP {
            return;
        }
        self.held.push(keycode);

        match self.data.keys.get(&keycode).copied() {
            Some(KeyAction::SetMods(m)) => self.depressed |= self.mask(m),
            Some(KeyAction::LatchMods(m)) => {
                let mask = self.mask(m);
                self.depressed |= mask;
                self.pending_latch |= mask;
            }
            Some(KeyAction::LockMods(m)) => {
                let mask = self.mask(m);
                self.depressed |= mask;
                self.locked ^= mask;
            }
            Some(KeyAction::SetGroup(g)) => self.base_group = self.base_group.wrapping_add(g),
            Some(KeyAction::LockGroup(g)) => self.locked_group = g,
            None => {
                // Any other key consumes latches and cancels pending ones
                self.latched = 0;
                self.latched_group = 0;
                self.pending_latch = 0;
            }
        }
    }

    fn key_up(&mut self, keycode: u32) {
        let Some(index) = self.held.iter().position(|&k| k == keycode) else {
            return;
        };
        self.held.swap_remove(index);

        match self.data.keys.get(&keycode).copied() {
            Some(KeyAction::SetMods(m)) | Some(KeyAction::LockMods(m)) => {
                let mask = self.mask(m) & !self.held_mods();
                self.depressed &= !mask;
            }
            Some(KeyAction::LatchMods(m)) => {
                let mask = self.mask(m);
                self.depressed &= !(mask & !self.held_mods());
                self.latched |= self.pending_latch & mask;
                self.pending_latch &= !mask;
            }
            Some(KeyAction::SetGroup(g)) => self.base_group = self.base_group.wrapping_sub(g),
            Some(KeyAction::LockGroup(_)) | None => {}
        }
    }
}

impl TranslationState for TableState {
    fn update_key(&mut self, keycode: u32, direction: KeyDirection) {
        match direction {
            KeyDirection::Down => self.key_down(keycode),
            KeyDirection::Up => self.key_up(keycode),
        }
    }

    fn update_mask(
        &mut self,
        depressed_mods: u32,
        latched_mods: u32,
        locked_mods: u32,
        depressed_layout: u32,
        latched_layout: u32,
        locked_layout: u32,
    ) {
        let defined = self.data.defined.bits();
        self.depressed = depressed_mods & defined;
        self.latched = latched_mods & defined;
        self.locked = locked_mods & defined;
        self.pending_latch = 0;
        self.base_group = depressed_layout;
        self.latched_group = latched_layout;
        self.locked_group = locked_layout;
    }

    fn serialize_mods(&self, component: ModComponent) -> u32 {
        match component {
            ModComponent::Depressed => self.depressed,
            ModComponent::Latched => self.latched,
            ModComponent::Locked => self.locked,
        }
    }

    fn serialize_layout(&self) -> u32 {
        let sum = self.base_group as u64 + self.latched_group as u64 + self.locked_group as u64;
        (sum % self.data.groups as u64) as u32
    }

    fn led_index_is_active(&self, index: u32) -> bool {
        self.data
            .leds
            .get(index as usize)
            .is_some_and(|(_, locked)| self.locked & self.mask(*locked) != 0)
    }
}
