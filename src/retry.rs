//! Reconnect backoff policy.
//!
//! Computes the delay before each leader-driven reconnect attempt:
//! exponential growth from a base delay, a uniform jitter so that
//! simultaneously demoted clients do not reconnect in lockstep, and a
//! hard ceiling on both the delay and the number of attempts.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

// ============================================================================
// Constants
// ============================================================================

/// Default base delay for the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(2000);

/// Default ceiling on a single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(15_000);

/// Default exponential growth factor.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

/// Default jitter range added on top of the exponential term.
pub const DEFAULT_JITTER_RANGE: Duration = Duration::from_millis(1000);

/// Default ceiling on retry attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

// ============================================================================
// RetryPolicy
// ============================================================================

/// Backoff parameters for leader-driven reconnects.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay for the first retry, before jitter.
    pub base_delay: Duration,

    /// Ceiling on any single computed delay.
    pub max_delay: Duration,

    /// Exponential growth factor per attempt.
    pub backoff_factor: f64,

    /// Uniform jitter range added to the exponential term.
    pub jitter_range: Duration,

    /// Maximum number of reconnect attempts before giving up.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter_range: DEFAULT_JITTER_RANGE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Computes the delay before the given attempt (1-based).
    ///
    /// `min(base * factor^(n-1) + uniform(0, jitter), max_delay)`.
    #[inline]
    #[must_use]
    pub fn delay(&self, retry_count: u32) -> Duration {
        self.delay_with(retry_count, &mut rand::thread_rng())
    }

    /// Computes the delay using the given randomness source.
    ///
    /// The result is always in `[0, max_delay]` and non-decreasing in
    /// expectation with `retry_count`.
    #[must_use]
    pub fn delay_with(&self, retry_count: u32, rng: &mut impl Rng) -> Duration {
        let exponent = retry_count.saturating_sub(1);
        let exponential =
            self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent as i32);

        let jitter = if self.jitter_range.is_zero() {
            0.0
        } else {
            rng.r#gen::<f64>() * self.jitter_range.as_secs_f64()
        };

        Duration::from_secs_f64((exponential + jitter).min(self.max_delay.as_secs_f64()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_millis(2000));
        assert_eq!(policy.max_delay, Duration::from_millis(15_000));
        assert_eq!(policy.backoff_factor, 1.5);
        assert_eq!(policy.jitter_range, Duration::from_millis(1000));
        assert_eq!(policy.max_retries, 10);
    }

    #[test]
    fn test_first_retry_window() {
        // Exponential term reduces to the base delay for attempt 1.
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..256 {
            let delay = policy.delay_with(1, &mut rng);
            assert!(delay >= policy.base_delay);
            assert!(delay <= policy.base_delay + policy.jitter_range);
        }
    }

    #[test]
    fn test_bounded_by_max_delay() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);

        for attempt in 1..=policy.max_retries {
            let delay = policy.delay_with(attempt, &mut rng);
            assert!(delay <= policy.max_delay, "attempt {attempt} exceeded ceiling");
        }
    }

    #[test]
    fn test_monotone_floor_until_ceiling() {
        // Without jitter the delay is exactly the clamped exponential.
        let policy = RetryPolicy {
            jitter_range: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(0);

        let mut previous = Duration::ZERO;
        for attempt in 1..=policy.max_retries {
            let delay = policy.delay_with(attempt, &mut rng);

            let expected = (policy.base_delay.as_secs_f64()
                * policy.backoff_factor.powi(attempt as i32 - 1))
            .min(policy.max_delay.as_secs_f64());
            assert_eq!(delay, Duration::from_secs_f64(expected));

            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_large_attempt_stays_clamped() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_with(1000, &mut StdRng::seed_from_u64(1));
        assert!(delay <= policy.max_delay);
    }
}
