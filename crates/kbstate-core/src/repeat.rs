// Kbstate Key Repeat
// Repeat rate/delay advertised to clients

/// Default repeat rate, in keys per second.
pub const DEFAULT_REPEAT_RATE: i32 = 25;

/// Default delay before repeating starts, in milliseconds.
pub const DEFAULT_REPEAT_DELAY: i32 = 600;

/// Key repeat configuration.
///
/// Values are passed through unvalidated; a rate of zero conventionally
/// disables repeat, but that is for the consumer to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RepeatInfo {
    pub rate: i32,
    pub delay: i32,
}

impl RepeatInfo {
    pub fn new(rate: i32, delay: i32) -> Self {
        Self { rate, delay }
    }

    /// Store new values; returns true if anything changed
    pub fn set(&mut self, rate: i32, delay: i32) -> bool {
        if self.rate == rate && self.delay == delay {
            return false;
        }
        self.rate = rate;
        self.delay = delay;
        true
    }
}

impl Default for RepeatInfo {
    fn default() -> Self {
        Self::new(DEFAULT_REPEAT_RATE, DEFAULT_REPEAT_DELAY)
    }
}
