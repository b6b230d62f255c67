// Kbstate Keyboard
// Per-device keyboard state machine: held keys, keymap, modifiers, LEDs

use std::fmt;
use std::rc::Rc;

use crate::key_event::{KeyEvent, KeyState};
use crate::keymap::{
    KeyDirection, Keymap, KeymapError, SerializedKeymap, TranslationState, EVDEV_KEYCODE_OFFSET,
};
use crate::led::{LedIndexes, Leds};
use crate::modifier::{ModifierIndexes, Modifiers};
use crate::repeat::RepeatInfo;
use crate::signal::Signal;
use crate::state::{KeySet, KeyboardModifiers, KEYS_CAP};

/// Device-specific hooks a keyboard calls into.
///
/// Both methods have no-op defaults, so a backend only implements what its
/// hardware supports.
pub trait KeyboardBackend {
    /// Light the given indicators on the device
    fn led_update(&mut self, _leds: Leds) {}

    /// Device-specific teardown, called last when the keyboard is destroyed
    fn destroy(self: Box<Self>) {}
}

/// Notification feeds of a keyboard.
///
/// Every feed except `key` hands listeners the keyboard itself, so they
/// can read whatever state they need.
pub struct KeyboardEvents<K: Keymap> {
    /// A raw key transition, fired before any state derived from it changes
    pub key: Signal<KeyEvent>,
    /// The serialized modifier state changed
    pub modifiers: Signal<Keyboard<K>>,
    /// A new keymap was installed
    pub keymap: Signal<Keyboard<K>>,
    pub repeat_info: Signal<Keyboard<K>>,
    /// The keyboard is about to be torn down; its state is still intact
    pub destroy: Signal<Keyboard<K>>,
}

impl<K: Keymap> Default for KeyboardEvents<K> {
    fn default() -> Self {
        Self {
            key: Signal::new(),
            modifiers: Signal::new(),
            keymap: Signal::new(),
            repeat_info: Signal::new(),
            destroy: Signal::new(),
        }
    }
}

/// Everything derived from the installed keymap; present or absent as a unit
struct Translation<K: Keymap> {
    keymap: Rc<K>,
    state: K::State,
    mod_indexes: ModifierIndexes,
    led_indexes: LedIndexes,
    serialized: SerializedKeymap,
}

impl<K: Keymap> Translation<K> {
    fn new(keymap: Rc<K>) -> Result<Self, KeymapError> {
        let state = keymap.new_state()?;
        let led_indexes = LedIndexes::from_keymap(&*keymap);
        let mod_indexes = ModifierIndexes::from_keymap(&*keymap);
        let serialized = SerializedKeymap::new(keymap.serialize()?);
        Ok(Self {
            keymap,
            state,
            mod_indexes,
            led_indexes,
            serialized,
        })
    }
}

/// State machine for one keyboard device
pub struct Keyboard<K: Keymap> {
    keycodes: KeySet,
    translation: Option<Translation<K>>,
    modifiers: KeyboardModifiers,
    repeat_info: RepeatInfo,
    backend: Option<Box<dyn KeyboardBackend>>,
    events: KeyboardEvents<K>,
}

impl<K: Keymap> Keyboard<K> {
    /// Create a keyboard with no keymap and default repeat settings
    pub fn new() -> Self {
        Self {
            keycodes: KeySet::new(),
            translation: None,
            modifiers: KeyboardModifiers::default(),
            repeat_info: RepeatInfo::default(),
            backend: None,
            events: KeyboardEvents::default(),
        }
    }

    /// Create a keyboard driving the given backend
    pub fn with_backend(backend: impl KeyboardBackend + 'static) -> Self {
        let mut keyboard = Self::new();
        keyboard.backend = Some(Box::new(backend));
        keyboard
    }

    /// Start from the given repeat settings instead of the defaults
    ///
    /// No repeat-info notification is fired.
    pub fn with_repeat_info(mut self, repeat_info: RepeatInfo) -> Self {
        self.repeat_info = repeat_info;
        self
    }

    pub fn events(&self) -> &KeyboardEvents<K> {
        &self.events
    }

    /// Keycodes currently held down
    pub fn keycodes(&self) -> &[u32] {
        self.keycodes.as_slice()
    }

    pub fn num_keycodes(&self) -> usize {
        self.keycodes.len()
    }

    /// Last serialized modifier state
    pub fn modifiers(&self) -> KeyboardModifiers {
        self.modifiers
    }

    pub fn repeat_info(&self) -> RepeatInfo {
        self.repeat_info
    }

    pub fn has_keymap(&self) -> bool {
        self.translation.is_some()
    }

    pub fn keymap(&self) -> Option<&Rc<K>> {
        self.translation.as_ref().map(|t| &t.keymap)
    }

    /// Wire form of the installed keymap
    pub fn serialized_keymap(&self) -> Option<&SerializedKeymap> {
        self.translation.as_ref().map(|t| &t.serialized)
    }

    /// Indicators currently lit according to the keymap
    pub fn leds(&self) -> Leds {
        self.translation
            .as_ref()
            .map(|t| t.led_indexes.active(&t.state))
            .unwrap_or_default()
    }

    /// Depressed and latched standard modifiers
    ///
    /// Locked modifiers are not included; they show up in `modifiers().locked`
    /// and through the indicators.
    pub fn get_modifiers(&self) -> Modifiers {
        match &self.translation {
            Some(translation) => translation.mod_indexes.translate(self.modifiers.transient()),
            None => Modifiers::empty(),
        }
    }

    /// Install a new keymap
    ///
    /// The previous keymap is released first. Keys held at the time are
    /// replayed into the new state, so e.g. a held Shift survives a layout
    /// switch. On failure the keyboard is left without a keymap and no
    /// notification fires.
    pub fn set_keymap(&mut self, keymap: Rc<K>) -> Result<(), KeymapError> {
        self.translation = None;

        let mut translation = Translation::new(keymap).map_err(|err| {
            log::error!("Failed to install keymap: {}", err);
            err
        })?;

        for keycode in self.keycodes.iter() {
            translation
                .state
                .update_key(keycode.wrapping_add(EVDEV_KEYCODE_OFFSET), KeyDirection::Down);
        }
        self.modifiers.update(&translation.state);

        log::debug!(
            "Installed keymap ({} bytes, {} keys replayed)",
            translation.serialized.size(),
            self.keycodes.len()
        );
        self.translation = Some(translation);

        self.events.keymap.emit(self);
        Ok(())
    }

    /// Update repeat settings, notifying only on change
    pub fn set_repeat_info(&mut self, rate: i32, delay: i32) {
        if !self.repeat_info.set(rate, delay) {
            return;
        }
        log::debug!("Repeat info changed: rate {} delay {}", rate, delay);
        self.events.repeat_info.emit(self);
    }

    /// Process a raw key transition
    pub fn notify_key(&mut self, event: &KeyEvent) {
        log::trace!("{}", event);
        match event.state {
            KeyState::Pressed => self.keycodes.add(event.keycode),
            KeyState::Released => self.keycodes.remove(event.keycode),
        };
        debug_assert!(self.keycodes.len() <= KEYS_CAP);

        self.events.key.emit(event);

        let Some(translation) = self.translation.as_mut() else {
            return;
        };
        if event.update_state {
            let direction = match event.state {
                KeyState::Pressed => KeyDirection::Down,
                KeyState::Released => KeyDirection::Up,
            };
            translation
                .state
                .update_key(event.keycode.wrapping_add(EVDEV_KEYCODE_OFFSET), direction);
        }

        self.sync_modifiers_and_leds();
    }

    /// Overwrite the modifier state with masks translated elsewhere
    ///
    /// `group` is applied as the locked layout; the depressed and latched
    /// layouts are reset to zero.
    pub fn notify_modifiers(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        let Some(translation) = self.translation.as_mut() else {
            return;
        };
        translation
            .state
            .update_mask(depressed, latched, locked, 0, 0, group);

        self.sync_modifiers_and_leds();
    }

    /// Forward an indicator mask to the backend, if it drives LEDs
    pub fn led_update(&mut self, leds: Leds) {
        if let Some(backend) = self.backend.as_mut() {
            backend.led_update(leds);
        }
    }

    /// Tear the keyboard down
    ///
    /// Listeners of the destroy feed run first and still see the full
    /// state. Dropping a keyboard does the same.
    pub fn destroy(self) {
        drop(self);
    }

    fn sync_modifiers_and_leds(&mut self) {
        let changed = match &self.translation {
            Some(translation) => self.modifiers.update(&translation.state),
            None => return,
        };
        if changed {
            self.events.modifiers.emit(self);
        }

        let leds = self.leds();
        self.led_update(leds);
    }
}

impl<K: Keymap> Default for Keyboard<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Keymap> Drop for Keyboard<K> {
    fn drop(&mut self) {
        self.events.destroy.emit(self);
        self.translation = None;
        if let Some(backend) = self.backend.take() {
            backend.destroy();
        }
    }
}

impl<K: Keymap> fmt::Debug for Keyboard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyboard")
            .field("keycodes", &self.keycodes.as_slice())
            .field("has_keymap", &self.has_keymap())
            .field("modifiers", &self.modifiers)
            .field("repeat_info", &self.repeat_info)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::table::TableKeymap;
    use std::cell::{Cell, RefCell};

    struct RecordingBackend {
        leds: Rc<RefCell<Vec<Leds>>>,
        destroyed: Rc<Cell<bool>>,
    }

    impl KeyboardBackend for RecordingBackend {
        fn led_update(&mut self, leds: Leds) {
            self.leds.borrow_mut().push(leds);
        }

        fn destroy(self: Box<Self>) {
            self.destroyed.set(true);
        }
    }

    #[test]
    fn test_new_keyboard_defaults() {
        let keyboard: Keyboard<TableKeymap> = Keyboard::new();
        assert!(!keyboard.has_keymap());
        assert_eq!(keyboard.num_keycodes(), 0);
        assert_eq!(keyboard.modifiers(), KeyboardModifiers::default());
        assert_eq!(keyboard.repeat_info(), RepeatInfo::new(25, 600));
        assert!(keyboard.serialized_keymap().is_none());
        assert_eq!(keyboard.get_modifiers(), Modifiers::empty());
    }

    #[test]
    fn test_with_repeat_info_overrides_defaults() {
        let keyboard: Keyboard<TableKeymap> =
            Keyboard::new().with_repeat_info(RepeatInfo::new(40, 250));
        assert_eq!(keyboard.repeat_info(), RepeatInfo::new(40, 250));
    }

    #[test]
    fn test_keys_tracked_without_keymap() {
        let mut keyboard: Keyboard<TableKeymap> = Keyboard::new();
        keyboard.notify_key(&KeyEvent::pressed(30));
        keyboard.notify_key(&KeyEvent::pressed(48));
        keyboard.notify_key(&KeyEvent::released(30));
        assert_eq!(keyboard.keycodes(), &[48]);
    }

    #[test]
    fn test_set_keymap_stores_serialized_form() {
        let mut keyboard = Keyboard::new();
        let keymap = Rc::new(TableKeymap::pc105());
        keyboard.set_keymap(Rc::clone(&keymap)).unwrap();

        let expected = keymap.serialize().unwrap();
        let serialized = keyboard.serialized_keymap().unwrap();
        assert_eq!(serialized.as_bytes(), expected.as_bytes());
        assert_eq!(serialized.size(), expected.len() + 1);
        assert!(Rc::ptr_eq(keyboard.keymap().unwrap(), &keymap));
    }

    #[test]
    fn test_set_keymap_releases_previous() {
        let mut keyboard = Keyboard::new();
        let first = Rc::new(TableKeymap::pc105());
        let second = Rc::new(TableKeymap::pc105());

        keyboard.set_keymap(Rc::clone(&first)).unwrap();
        assert_eq!(Rc::strong_count(&first), 2);
        keyboard.set_keymap(Rc::clone(&second)).unwrap();
        assert_eq!(Rc::strong_count(&first), 1);
        assert_eq!(Rc::strong_count(&second), 2);
    }

    #[test]
    fn test_backend_receives_leds_and_destroy() {
        let leds = Rc::new(RefCell::new(Vec::new()));
        let destroyed = Rc::new(Cell::new(false));
        let mut keyboard = Keyboard::with_backend(RecordingBackend {
            leds: Rc::clone(&leds),
            destroyed: Rc::clone(&destroyed),
        });
        keyboard.set_keymap(Rc::new(TableKeymap::pc105())).unwrap();

        keyboard.notify_key(&KeyEvent::pressed(58)); // CAPSLOCK
        keyboard.notify_key(&KeyEvent::released(58));
        assert_eq!(*leds.borrow(), [Leds::CAPS_LOCK, Leds::CAPS_LOCK]);

        keyboard.destroy();
        assert!(destroyed.get());
    }

    #[test]
    fn test_led_update_without_backend_is_noop() {
        let mut keyboard: Keyboard<TableKeymap> = Keyboard::new();
        keyboard.led_update(Leds::all());
    }

    #[test]
    fn test_get_modifiers_excludes_locked() {
        let mut keyboard = Keyboard::new();
        keyboard.set_keymap(Rc::new(TableKeymap::pc105())).unwrap();

        keyboard.notify_key(&KeyEvent::pressed(58));
        keyboard.notify_key(&KeyEvent::released(58));
        assert_eq!(keyboard.modifiers().locked, Modifiers::CAPS.bits());
        assert_eq!(keyboard.get_modifiers(), Modifiers::empty());
        assert_eq!(keyboard.leds(), Leds::CAPS_LOCK);
    }

    #[test]
    fn test_event_without_state_update_leaves_translation() {
        let mut keyboard = Keyboard::new();
        keyboard.set_keymap(Rc::new(TableKeymap::pc105())).unwrap();

        keyboard.notify_key(&KeyEvent::pressed(42).without_state_update());
        assert_eq!(keyboard.keycodes(), &[42]);
        assert_eq!(keyboard.get_modifiers(), Modifiers::empty());
    }

    #[test]
    fn test_debug_output() {
        let keyboard: Keyboard<TableKeymap> = Keyboard::new();
        let debug = format!("{:?}", keyboard);
        assert!(debug.contains("has_keymap: false"));
    }
}
