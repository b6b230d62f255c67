// Kbstate Keymap Layer
// Collaborator traits for compiled keymaps and their live translation state

pub mod table;

#[cfg(feature = "xkb")]
pub mod xkb;

use std::fmt;

/// Offset between evdev keycodes and XKB keycodes.
///
/// XKB reserves keycodes 0-7, so every raw keycode is shifted by this
/// amount before it reaches a translation state.
pub const EVDEV_KEYCODE_OFFSET: u32 = 8;

/// RMLVO names a keymap is compiled from; empty strings select the system default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleNames {
    pub rules: String,
    pub model: String,
    pub layout: String,
    pub variant: String,
    pub options: Option<String>,
}

/// Direction of a key transition fed into a translation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    Up,
    Down,
}

/// Which component of the modifier state to serialize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModComponent {
    Depressed,
    Latched,
    Locked,
}

/// Errors that can occur when installing a keymap
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeymapError {
    #[error("failed to create keymap state: {0}")]
    State(String),

    #[error("failed to serialize keymap: {0}")]
    Serialize(String),

    #[error("failed to compile keymap: {0}")]
    Compile(String),
}

/// A compiled keymap, shared read-only between the keyboard and whoever
/// produced it.
///
/// Keyboards hold keymaps behind `Rc`; cloning the `Rc` acquires a
/// reference and dropping it releases one.
pub trait Keymap {
    type State: TranslationState;

    /// Create a fresh translation state with no keys held
    fn new_state(&self) -> Result<Self::State, KeymapError>;

    /// Canonical textual form of the keymap
    ///
    /// Must be byte-for-byte identical for identical keymaps.
    fn serialize(&self) -> Result<String, KeymapError>;

    /// Bit index of a named modifier
    fn mod_index(&self, name: &str) -> Option<u32>;

    /// Index of a named indicator
    fn led_index(&self, name: &str) -> Option<u32>;
}

/// Live state derived from a keymap: held keys, latches and locks.
///
/// Keycodes passed here are XKB keycodes (evdev + [`EVDEV_KEYCODE_OFFSET`]).
pub trait TranslationState {
    fn update_key(&mut self, keycode: u32, direction: KeyDirection);

    fn update_mask(
        &mut self,
        depressed_mods: u32,
        latched_mods: u32,
        locked_mods: u32,
        depressed_layout: u32,
        latched_layout: u32,
        locked_layout: u32,
    );

    fn serialize_mods(&self, component: ModComponent) -> u32;

    /// Effective layout (group) index
    fn serialize_layout(&self) -> u32;

    fn led_index_is_active(&self, index: u32) -> bool;
}

/// Serialized keymap in its wire form: the text followed by a NUL byte.
#[derive(Clone, PartialEq, Eq)]
pub struct SerializedKeymap {
    bytes: Vec<u8>,
}

impl SerializedKeymap {
    /// Wrap keymap text, stripping anything after an embedded NUL
    pub fn new(text: String) -> Self {
        let mut bytes = text.into_bytes();
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(nul);
        }
        bytes.push(0);
        Self { bytes }
    }

    /// Size on the wire, terminator included
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// The text without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 1]
    }

    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.bytes
    }

    /// The text as a string slice
    pub fn as_str(&self) -> &str {
        // Built from a String and only ever truncated at a NUL byte
        std::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }
}

impl fmt::Debug for SerializedKeymap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedKeymap")
            .field("size", &self.size())
            .finish()
    }
}
