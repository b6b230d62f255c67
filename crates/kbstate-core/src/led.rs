// Kbstate Indicator LEDs
// Num/Caps/Scroll Lock indicators and their keymap indexes

use std::fmt;

use bitflags::bitflags;
use strum::IntoEnumIterator;
use strum_macros::{EnumCount, EnumIter, IntoStaticStr};

use crate::keymap::{Keymap, TranslationState};

/// The indicators a keyboard drives, in their canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum Led {
    #[strum(serialize = "Num Lock")]
    NumLock,
    #[strum(serialize = "Caps Lock")]
    CapsLock,
    #[strum(serialize = "Scroll Lock")]
    ScrollLock,
}

impl Led {
    /// Name used to look the indicator up in a keymap
    pub fn keymap_name(self) -> &'static str {
        self.into()
    }

    /// The bit this indicator occupies in a [`Leds`] mask
    pub fn flag(self) -> Leds {
        Leds::from_bits_truncate(1 << self as u32)
    }
}

impl fmt::Display for Led {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keymap_name())
    }
}

bitflags! {
    /// Mask of lit indicators, as handed to the device backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Leds: u32 {
        const NUM_LOCK = 1 << 0;
        const CAPS_LOCK = 1 << 1;
        const SCROLL_LOCK = 1 << 2;
    }
}

/// Per-keymap index of every indicator; `None` if the keymap lacks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedIndexes {
    indexes: [Option<u32>; <Led as strum::EnumCount>::COUNT],
}

impl LedIndexes {
    /// Look up every indicator in `keymap`
    pub fn from_keymap<K: Keymap>(keymap: &K) -> Self {
        let mut indexes = [None; <Led as strum::EnumCount>::COUNT];
        for led in Led::iter() {
            indexes[led as usize] = keymap.led_index(led.keymap_name());
        }
        Self { indexes }
    }

    /// Index of an indicator in the keymap, if defined
    pub fn get(&self, led: Led) -> Option<u32> {
        self.indexes[led as usize]
    }

    /// Indicators lit in the given translation state
    pub fn active<S: TranslationState>(&self, state: &S) -> Leds {
        Led::iter()
            .filter(|&led| {
                self.get(led)
                    .is_some_and(|index| state.led_index_is_active(index))
            })
            .fold(Leds::empty(), |leds, led| leds | led.flag())
    }
}
