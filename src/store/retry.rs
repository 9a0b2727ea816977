//! Retry policy for transient poll failures.

use std::time::Duration;

/// Default base delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
/// Default delay cap.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);
/// Default total attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Exponential backoff: `base * 2^attempt`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts per poll cycle, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Whether another attempt is allowed after attempt `attempt` failed.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }
}
