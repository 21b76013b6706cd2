//! Retry configuration with exponential backoff and jitter

use stash_core::StorageError;
use std::time::Duration;

/// Default maximum number of retry attempts
const DEFAULT_MAX_RETRIES: usize = 3;

/// Default base delay for exponential backoff (50ms)
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);

/// Default maximum delay for exponential backoff (2s)
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);

/// Default jitter factor (0.1 = 10% randomization)
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first one
    pub max_retries: usize,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Jitter factor for randomization (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Create a retry config allowing `max_failures` consecutive failed attempts
    pub fn with_max_failures(max_failures: usize) -> Self {
        Self {
            max_retries: max_failures.saturating_sub(1),
            ..Self::default()
        }
    }

    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Check if an error should be retried
    ///
    /// Corruption never heals by retrying and timeouts already waited their
    /// full bound, so both stop the loop.
    pub fn should_retry(&self, error: &StorageError) -> bool {
        !error.is_corruption() && !error.is_timeout()
    }

    /// Calculate delay for a given attempt with exponential backoff and jitter
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16) as u32);
        let exponential_delay = self.base_delay.saturating_mul(factor);
        let capped_delay = exponential_delay.min(self.max_delay);

        if self.jitter_factor > 0.0 {
            let jitter_range = capped_delay.as_millis() as f64 * self.jitter_factor;
            let normalized = (fastrand::f64() - 0.5) * 2.0;
            let jitter = normalized * jitter_range;
            let final_millis = (capped_delay.as_millis() as f64 + jitter).max(0.0) as u64;
            Duration::from_millis(final_millis)
        } else {
            capped_delay
        }
    }
}
