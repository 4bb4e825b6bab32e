//! Reconnection delay policy

use std::time::Duration;

/// Capped doubling backoff.
///
/// Delays never decrease within a failure streak and never exceed the cap.
/// Retries are unlimited; the caller stops by cancellation.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Start a fresh streak after a successful connect
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    /// Failed attempts in the current streak
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
