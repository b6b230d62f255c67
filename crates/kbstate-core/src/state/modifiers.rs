// Kbstate Modifier State
// Last serialized depressed/latched/locked/group snapshot

use crate::keymap::{ModComponent, TranslationState};

/// Serialized modifier state, in keymap bit space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyboardModifiers {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

impl KeyboardModifiers {
    /// Snapshot the modifier state of a translation state
    pub fn serialize<S: TranslationState>(state: &S) -> Self {
        Self {
            depressed: state.serialize_mods(ModComponent::Depressed),
            latched: state.serialize_mods(ModComponent::Latched),
            locked: state.serialize_mods(ModComponent::Locked),
            group: state.serialize_layout(),
        }
    }

    /// Refresh from `state`; returns true if any field changed
    pub fn update<S: TranslationState>(&mut self, state: &S) -> bool {
        let current = Self::serialize(state);
        if current == *self {
            return false;
        }
        *self = current;
        true
    }

    /// Modifiers currently in effect for the next key, locks excluded
    pub fn transient(&self) -> u32 {
        self.depressed | self.latched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::table::{KeyAction, TableKeymap};
    use crate::keymap::{KeyDirection, Keymap};
    use crate::modifier::Modifiers;
    use crate::EVDEV_KEYCODE_OFFSET;

    #[test]
    fn test_update_reports_changes_only() {
        let keymap = TableKeymap::pc105();
        let mut state = keymap.new_state().unwrap();
        let mut mods = KeyboardModifiers::default();

        assert!(!mods.update(&state));

        state.update_key(42 + EVDEV_KEYCODE_OFFSET, KeyDirection::Down);
        assert!(mods.update(&state));
        assert_eq!(mods.depressed, Modifiers::SHIFT.bits());
        assert!(!mods.update(&state));
    }

    #[test]
    fn test_group_change_counts() {
        let keymap = TableKeymap::builder()
            .groups(2)
            .key(99, KeyAction::LockGroup(1))
            .build();
        let mut state = keymap.new_state().unwrap();
        let mut mods = KeyboardModifiers::default();

        state.update_key(99 + EVDEV_KEYCODE_OFFSET, KeyDirection::Down);
        assert!(mods.update(&state));
        assert_eq!(mods.group, 1);
        assert_eq!(mods.depressed, 0);
    }

    #[test]
    fn test_transient_excludes_locked() {
        let mods = KeyboardModifiers {
            depressed: 0b001,
            latched: 0b100,
            locked: 0b010,
            group: 0,
        };
        assert_eq!(mods.transient(), 0b101);
    }
}
