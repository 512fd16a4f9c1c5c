//! Socket configuration options.
//!
//! Provides a type-safe interface for tuning the connection lifecycle:
//! frame discriminant, retry/backoff parameters, the randomized initial
//! delay, and payload logging.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use leaderwire::SocketOptions;
//!
//! let options = SocketOptions::new()
//!     .with_discriminant(0x01)
//!     .with_max_retries(5)
//!     .with_retry_base_delay(Duration::from_secs(1))
//!     .with_debug(true);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

use crate::retry::RetryPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Default frame discriminant.
pub const DEFAULT_DISCRIMINANT: u8 = 0x00;

/// Default upper bound on the randomized initial connection delay.
pub const DEFAULT_INITIAL_DELAY_MAX: Duration = Duration::from_millis(1000);

// ============================================================================
// SocketOptions
// ============================================================================

/// Configuration for a [`Socket`](crate::Socket).
#[derive(Debug, Clone, PartialEq)]
pub struct SocketOptions {
    /// Protocol tag stamped on every outbound frame and expected on
    /// every inbound one.
    pub discriminant: u8,

    /// Backoff parameters for leader-driven reconnects.
    pub retry: RetryPolicy,

    /// Upper bound on the randomized delay before the first transport
    /// open. The delay statistically reduces the chance of being the
    /// first connected, and thus most electable, peer.
    pub initial_delay_max: Duration,

    /// Enables payload-level debug logging.
    pub debug: bool,

    /// Truncates logged payloads to this many characters (0 = unlimited).
    pub debug_max_chars: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl SocketOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            discriminant: DEFAULT_DISCRIMINANT,
            retry: RetryPolicy::default(),
            initial_delay_max: DEFAULT_INITIAL_DELAY_MAX,
            debug: false,
            debug_max_chars: 0,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SocketOptions {
    /// Sets the frame discriminant.
    #[inline]
    #[must_use]
    pub fn with_discriminant(mut self, discriminant: u8) -> Self {
        self.discriminant = discriminant;
        self
    }

    /// Sets the maximum number of leader-driven reconnect attempts.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Sets the base delay for the first reconnect attempt.
    #[inline]
    #[must_use]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    /// Sets the ceiling on any single reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry.max_delay = delay;
        self
    }

    /// Sets the exponential backoff growth factor.
    #[inline]
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.retry.backoff_factor = factor;
        self
    }

    /// Sets the jitter range added to each reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_jitter_range(mut self, range: Duration) -> Self {
        self.retry.jitter_range = range;
        self
    }

    /// Sets the full retry policy at once.
    #[inline]
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the upper bound on the randomized initial delay.
    #[inline]
    #[must_use]
    pub fn with_initial_delay_max(mut self, max: Duration) -> Self {
        self.initial_delay_max = max;
        self
    }

    /// Enables or disables payload-level debug logging.
    #[inline]
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Truncates logged payloads to `max_chars` (0 = unlimited).
    #[inline]
    #[must_use]
    pub fn with_debug_max_chars(mut self, max_chars: usize) -> Self {
        self.debug_max_chars = max_chars;
        self
    }
}

// ============================================================================
// Derived Values
// ============================================================================

impl SocketOptions {
    /// Draws the randomized delay before the first transport open.
    #[inline]
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay_with(&mut rand::thread_rng())
    }

    /// Draws the initial delay from the given randomness source.
    #[must_use]
    pub fn initial_delay_with(&self, rng: &mut impl Rng) -> Duration {
        if self.initial_delay_max.is_zero() {
            return Duration::ZERO;
        }
        self.initial_delay_max.mul_f64(rng.r#gen::<f64>())
    }

    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err("Backoff factor must be a finite value >= 1".to_string());
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err("Retry base delay must not exceed the max delay".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
