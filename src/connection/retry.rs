//! Bounded retry with exponential backoff

use crate::utils::config::RetryConfig;
use std::time::Duration;

/// Counts consecutive link failures and spaces out retries.
///
/// The delay doubles with every consecutive failure, capped at
/// `max_backoff`. Once `max_failures` is reached the caller should stop
/// retrying.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_failures: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    consecutive_failures: u32,
}

impl RetryPolicy {
    pub fn new(max_failures: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            base_backoff,
            max_backoff: max_backoff.max(base_backoff),
            consecutive_failures: 0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_consecutive_failures,
            Duration::from_millis(config.base_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Record a failure; returns true once the bound is reached
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.is_exhausted()
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.consecutive_failures >= self.max_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    /// Delay before the next retry given the failures recorded so far
    pub fn next_delay(&self) -> Duration {
        let exponent = self.consecutive_failures.saturating_sub(1).min(31);
        self.base_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(500));

        policy.record_failure();
        assert_eq!(policy.next_delay(), Duration::from_millis(100));
        policy.record_failure();
        assert_eq!(policy.next_delay(), Duration::from_millis(200));
        policy.record_failure();
        assert_eq!(policy.next_delay(), Duration::from_millis(400));
        policy.record_failure();
        assert_eq!(policy.next_delay(), Duration::from_millis(500));

        for _ in 0..40 {
            policy.record_failure();
        }
        assert_eq!(policy.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_exhaustion_and_reset() {
        let mut policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(10));

        assert!(!policy.record_failure());
        assert!(!policy.record_failure());
        assert!(policy.record_failure());
        assert!(policy.is_exhausted());

        policy.record_success();
        assert_eq!(policy.consecutive_failures(), 0);
        assert!(!policy.is_exhausted());
    }

    #[test]
    fn test_zero_bound_is_clamped() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10), Duration::from_millis(1));
        assert_eq!(policy.max_failures(), 1);
        assert_eq!(policy.next_delay(), Duration::from_millis(10));
    }
}
