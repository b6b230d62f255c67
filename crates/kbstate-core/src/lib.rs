// Kbstate Core Library
// Keyboard device state: held keys, keymap, modifiers, indicators, repeat

pub mod key_event;
pub mod keyboard;
pub mod keymap;
pub mod led;
pub mod modifier;
pub mod repeat;
pub mod signal;
pub mod state;

#[cfg(feature = "config")]
pub mod settings;

pub use key_event::{KeyEvent, KeyState};
pub use keyboard::{Keyboard, KeyboardBackend, KeyboardEvents};
pub use keymap::table::{KeyAction, TableKeymap};
pub use keymap::{
    KeyDirection, Keymap, KeymapError, ModComponent, RuleNames, SerializedKeymap,
    TranslationState, EVDEV_KEYCODE_OFFSET,
};
pub use led::{Led, LedIndexes, Leds};
pub use modifier::{ModifierIndexes, Modifiers, StandardModifier};
pub use repeat::{RepeatInfo, DEFAULT_REPEAT_DELAY, DEFAULT_REPEAT_RATE};
pub use signal::{Signal, SubscriptionId};
pub use state::{KeySet, KeyboardModifiers, KEYS_CAP};

#[cfg(feature = "xkb")]
pub use keymap::xkb::{XkbKeymap, XkbState};

#[cfg(feature = "config")]
pub use settings::{Settings, SettingsError};
