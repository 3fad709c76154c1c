//! Retry delay after failed fetches.

use std::time::Duration;

/// First delay after a failure.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Exponential backoff: 1s, 2s, 4s, ... capped at a ceiling, reset on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    ceiling: Duration,
}

impl Backoff {
    /// Create a backoff capped at `ceiling` (normally the poll interval).
    pub fn new(ceiling: Duration) -> Self {
        Self {
            current: INITIAL_BACKOFF,
            ceiling: ceiling.max(INITIAL_BACKOFF),
        }
    }

    /// Delay to wait now; doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.ceiling);
        self.current = (self.current * 2).min(self.ceiling);
        delay
    }

    /// Delay the next failure would wait, without advancing.
    pub fn peek(&self) -> Duration {
        self.current.min(self.ceiling)
    }

    /// Back to the initial delay.
    pub fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}
