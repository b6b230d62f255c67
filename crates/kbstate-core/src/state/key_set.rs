// Kbstate Pressed Key Set
// Bounded, duplicate-free storage for the keycodes currently held down

use smallvec::SmallVec;

/// Maximum number of simultaneously held keys tracked per keyboard.
pub const KEYS_CAP: usize = 32;

/// Tracks the raw keycodes currently held on a keyboard
///
/// Storage is inline (no heap allocation) and bounded by [`KEYS_CAP`].
/// Iteration order is insertion order, except that removal moves the last
/// key into the freed slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: SmallVec<[u32; KEYS_CAP]>,
}

impl KeySet {
    /// Create a new empty key set
    pub fn new() -> Self {
        Self {
            keys: SmallVec::new(),
        }
    }

    /// Add a keycode, ignoring duplicates
    ///
    /// Running out of room means press/release accounting upstream is
    /// broken: this asserts in debug builds and drops the key otherwise.
    /// Returns true if the set changed.
    pub fn add(&mut self, keycode: u32) -> bool {
        if self.contains(keycode) {
            return false;
        }
        if self.keys.len() >= KEYS_CAP {
            debug_assert!(false, "pressed key set overflow adding keycode {}", keycode);
            log::warn!("Dropping keycode {}: {} keys already held", keycode, KEYS_CAP);
            return false;
        }
        self.keys.push(keycode);
        true
    }

    /// Remove a keycode if present
    ///
    /// Returns true if the set changed.
    pub fn remove(&mut self, keycode: u32) -> bool {
        match self.keys.iter().position(|&k| k == keycode) {
            Some(index) => {
                self.keys.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Check if a keycode is currently held
    pub fn contains(&self, keycode: u32) -> bool {
        self.keys.contains(&keycode)
    }

    /// Held keycodes as a slice
    pub fn as_slice(&self) -> &[u32] {
        &self.keys
    }

    /// Iterate over held keycodes
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.keys.iter().copied()
    }

    /// Get the number of held keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if no key is held
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Clear all held keys
    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_set_add_remove() {
        let mut set = KeySet::new();

        assert!(!set.contains(30));
        assert!(set.add(30));
        assert!(set.contains(30));
        assert!(set.remove(30));
        assert!(!set.contains(30));
        assert!(set.is_empty());
    }

    #[test]
    fn test_key_set_duplicate_add() {
        let mut set = KeySet::new();
        assert!(set.add(30));
        assert!(!set.add(30));

        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice(), &[30]);
    }

    #[test]
    fn test_key_set_remove_absent() {
        let mut set = KeySet::new();
        set.add(30);

        assert!(!set.remove(48));
        assert_eq!(set.as_slice(), &[30]);
    }

    #[test]
    fn test_key_set_remove_keeps_others() {
        let mut set = KeySet::new();
        set.add(30);
        set.add(48);
        set.add(46);

        set.remove(30);
        assert_eq!(set.len(), 2);
        assert!(set.contains(48));
        assert!(set.contains(46));
    }

    #[test]
    fn test_key_set_len_tracks_distinct_keys() {
        let mut set = KeySet::new();
        let ops: &[(bool, u32)] = &[
            (true, 1),
            (true, 2),
            (true, 1),
            (false, 3),
            (true, 3),
            (false, 1),
            (false, 1),
            (true, 4),
        ];
        let mut expected = std::collections::HashSet::new();
        for &(press, code) in ops {
            if press {
                set.add(code);
                expected.insert(code);
            } else {
                set.remove(code);
                expected.remove(&code);
            }
            assert_eq!(set.len(), expected.len());
        }
        for code in expected {
            assert!(set.contains(code));
        }
    }

    #[test]
    fn test_key_set_fills_to_capacity() {
        let mut set = KeySet::new();
        for code in 0..KEYS_CAP as u32 {
            assert!(set.add(code));
        }
        assert_eq!(set.len(), KEYS_CAP);
        // Re-adding a held key at capacity is still a plain no-op
        assert!(!set.add(0));
        assert_eq!(set.len(), KEYS_CAP);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_key_set_overflow_is_capped() {
        let mut set = KeySet::new();
        for code in 0..KEYS_CAP as u32 + 4 {
            set.add(code);
        }
        assert_eq!(set.len(), KEYS_CAP);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "pressed key set overflow")]
    fn test_key_set_overflow_asserts() {
        let mut set = KeySet::new();
        for code in 0..KEYS_CAP as u32 + 1 {
            set.add(code);
        }
    }

    #[test]
    fn test_key_set_clear() {
        let mut set = KeySet::new();
        set.add(30);
        set.add(48);
        set.clear();
        assert!(set.is_empty());
    }
}
