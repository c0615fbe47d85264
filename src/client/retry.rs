//! Backoff schedule for throttled requests.

use std::time::Duration;

use crate::config::ApiConfig;

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Bounded exponential backoff: retry `n` waits `base_delay * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first throttled attempt
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_backoff_ms),
        )
    }

    /// Delay before retry number `attempt`, counting from zero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(MAX_BACKOFF_SHIFT);
        self.base_delay.saturating_mul(multiplier)
    }

    /// Whether a request that has already been retried `attempt` times may
    /// be sent again.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Sum of every delay the policy can impose.
    #[cfg(test)]
    pub fn total_delay(&self) -> Duration {
        (0..self.max_retries)
            .map(|attempt| self.delay_for(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_is_one_two_four_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.total_delay(), Duration::from_secs(7));
    }

    #[test]
    fn test_should_retry_is_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::new(0, Duration::from_millis(10)).should_retry(0));
    }

    #[test]
    fn test_large_attempts_do_not_overflow() {
        let policy = RetryPolicy::new(100, Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.delay_for(99), Duration::MAX);
    }

    #[test]
    fn test_from_config() {
        let config = ApiConfig {
            max_retries: 5,
            base_backoff_ms: 250,
            ..ApiConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }
}
