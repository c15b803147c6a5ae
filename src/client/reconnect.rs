//! Linear reconnect backoff.

use std::time::Duration;

/// Bounded linear backoff: the n-th retry waits `n * base_delay`.
///
/// The attempt counter is reset on every successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    attempt: u32,
    max_attempts: u32,
    base_delay: Duration,
}

impl ReconnectPolicy {
    /// Creates a policy allowing `max_attempts` retries.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            base_delay,
        }
    }

    /// Consumes one attempt and returns its delay, or `None` once the
    /// limit has been reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt += 1;
        Some(self.base_delay.saturating_mul(self.attempt))
    }

    /// Resets the attempt counter.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts consumed since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Configured attempt limit.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns `true` when no further retry may be scheduled.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
