use std::time::Duration;

pub const BASE_DELAY: Duration = Duration::from_secs(1);
pub const CAP_DELAY: Duration = Duration::from_secs(30);
pub const MAX_ATTEMPTS: u32 = 5;

/// Capped exponential reconnect schedule.
///
/// The attempt counter increments before the delay is computed, so the
/// observed sequence for the defaults is 2s, 4s, 8s, 16s, 30s, then
/// exhaustion. A successful open resets the counter.
#[derive(Clone, Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BASE_DELAY, CAP_DELAY, MAX_ATTEMPTS)
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempts: 0,
        }
    }

    /// Delay before the next reconnect attempt, or `None` once the attempt
    /// budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(self.attempts));
        Some(delay.min(self.cap))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
