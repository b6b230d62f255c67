// Kbstate Modifier System
// The eight standard modifiers and their mapping onto keymap bit indexes

use std::fmt;

use bitflags::bitflags;
use strum::IntoEnumIterator;
use strum_macros::{EnumCount, EnumIter, IntoStaticStr};

use crate::keymap::Keymap;

/// The standard modifiers, in their canonical order.
///
/// The string form is the modifier name a keymap is queried with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum StandardModifier {
    #[strum(serialize = "Shift")]
    Shift,
    #[strum(serialize = "Lock")]
    Caps,
    #[strum(serialize = "Control")]
    Ctrl,
    #[strum(serialize = "Mod1")]
    Alt,
    #[strum(serialize = "Mod2")]
    Mod2,
    #[strum(serialize = "Mod3")]
    Mod3,
    #[strum(serialize = "Mod4")]
    Logo,
    #[strum(serialize = "Mod5")]
    Mod5,
}

impl StandardModifier {
    /// Name used to look the modifier up in a keymap
    pub fn keymap_name(self) -> &'static str {
        self.into()
    }

    /// The bit this modifier occupies in a [`Modifiers`] mask
    pub fn flag(self) -> Modifiers {
        Modifiers::from_bits_truncate(1 << self as u32)
    }
}

impl fmt::Display for StandardModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keymap_name())
    }
}

bitflags! {
    /// Compact, keymap-independent modifier mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CAPS = 1 << 1;
        const CTRL = 1 << 2;
        const ALT = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const LOGO = 1 << 6;
        const MOD5 = 1 << 7;
    }
}

/// Per-keymap bit index of every standard modifier.
///
/// `None` means the keymap does not define that modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModifierIndexes {
    indexes: [Option<u32>; <StandardModifier as strum::EnumCount>::COUNT],
}

impl ModifierIndexes {
    /// Look up every standard modifier in `keymap`
    pub fn from_keymap<K: Keymap>(keymap: &K) -> Self {
        let mut indexes = [None; <StandardModifier as strum::EnumCount>::COUNT];
        for modifier in StandardModifier::iter() {
            indexes[modifier as usize] = keymap.mod_index(modifier.keymap_name());
        }
        Self { indexes }
    }

    /// Bit index of a modifier in the keymap, if defined
    pub fn get(&self, modifier: StandardModifier) -> Option<u32> {
        self.indexes[modifier as usize]
    }

    /// Translate a serialized keymap mask into a [`Modifiers`] mask
    pub fn translate(&self, mask: u32) -> Modifiers {
        let mut modifiers = Modifiers::empty();
        for modifier in StandardModifier::iter() {
            let Some(index) = self.get(modifier) else {
                continue;
            };
            if index < u32::BITS && mask & (1 << index) != 0 {
                modifiers |= modifier.flag();
            }
        }
        modifiers
    }
}
