// Kbstate State Layer
// Pressed keys and serialized modifier snapshots

mod key_set;
mod modifiers;

pub use key_set::{KeySet, KEYS_CAP};
pub use modifiers::KeyboardModifiers;
