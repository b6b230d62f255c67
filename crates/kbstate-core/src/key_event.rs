// Kbstate Key Events
// Raw key transitions as delivered by a device backend

use std::fmt;

/// Physical state of a key in a raw key event.
///
/// The numeric values match the wire encoding used by display servers:
///   0 == 'released'
///   1 == 'pressed'
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum KeyState {
    Released = 0,
    Pressed = 1,
}

impl KeyState {
    /// Returns true if the key went down
    pub fn is_pressed(self) -> bool {
        matches!(self, KeyState::Pressed)
    }

    /// Returns true if the key went up
    pub fn is_released(self) -> bool {
        matches!(self, KeyState::Released)
    }

    /// Create a KeyState from its wire value
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(KeyState::Released),
            1 => Some(KeyState::Pressed),
            _ => None,
        }
    }

    /// Convert KeyState to its wire value
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyState::Released => write!(f, "released"),
            KeyState::Pressed => write!(f, "pressed"),
        }
    }
}

/// A raw key transition reported by a keyboard device.
///
/// `keycode` is the evdev keycode, without the XKB offset applied.
/// When `update_state` is false the transition is recorded and broadcast,
/// but the translation state is left untouched (the caller has already
/// accounted for it, e.g. through `notify_modifiers`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub time_msec: u32,
    pub keycode: u32,
    pub state: KeyState,
    pub update_state: bool,
}

impl KeyEvent {
    /// Create a new event that updates translation state
    pub fn new(keycode: u32, state: KeyState) -> Self {
        Self {
            time_msec: 0,
            keycode,
            state,
            update_state: true,
        }
    }

    /// Shorthand for a key-down event
    pub fn pressed(keycode: u32) -> Self {
        Self::new(keycode, KeyState::Pressed)
    }

    /// Shorthand for a key-up event
    pub fn released(keycode: u32) -> Self {
        Self::new(keycode, KeyState::Released)
    }

    /// Set the event timestamp
    pub fn at(mut self, time_msec: u32) -> Self {
        self.time_msec = time_msec;
        self
    }

    /// Mark the event as already reflected in translation state
    pub fn without_state_update(mut self) -> Self {
        self.update_state = false;
        self
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key {} {} @{}ms", self.keycode, self.state, self.time_msec)
    }
}
