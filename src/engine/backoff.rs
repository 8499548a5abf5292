//! Retry Backoff Policy
//!
//! Capped exponential backoff with full jitter for transient provider
//! faults. Each retry doubles the ceiling up to the cap; the actual sleep is
//! drawn uniformly from `[0, ceiling]` so concurrent workers retrying the
//! same throttled endpoint spread out instead of stampeding.

use std::time::Duration;

use rand::Rng;

/// Delay schedule between transient-fault retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Ceiling for the first retry.
    pub base: Duration,
    /// Ceiling never grows past this.
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            cap: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Ceiling for the given retry (0-based): `min(base * 2^attempt, cap)`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(self.cap);
        exp.min(self.cap)
    }

    /// Jittered delay before the given retry.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling(0), Duration::from_millis(200));
        assert_eq!(policy.ceiling(1), Duration::from_millis(400));
        assert_eq!(policy.ceiling(2), Duration::from_millis(800));
        assert_eq!(policy.ceiling(10), Duration::from_secs(5));
    }

    #[test]
    fn test_delay_within_ceiling() {
        let policy = RetryPolicy::default();
        for attempt in 0..6 {
            let delay = policy.delay(attempt);
            assert!(delay <= policy.ceiling(attempt));
        }
    }

    #[test]
    fn test_overflow_saturates_at_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_base_yields_zero_delay() {
        let policy = RetryPolicy::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.delay(3), Duration::ZERO);
    }
}
