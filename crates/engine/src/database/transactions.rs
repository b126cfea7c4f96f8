//! Retry policy for conflicting transactions
//!
//! Only `Conflict` errors are retried. Each retry reruns the closure in a
//! fresh transaction after an exponentially growing pause.

use std::time::Duration;

// ============================================================================
// Retry Configuration
// ============================================================================

/// Backoff settings for [`Database::transaction_with_retry`]
///
/// [`Database::transaction_with_retry`]: super::Database::transaction_with_retry
///
/// # Example
/// ```
/// use annals_engine::RetryConfig;
///
/// let config = RetryConfig::new()
///     .with_max_retries(5)
///     .with_base_delay_ms(2)
///     .with_max_delay_ms(50);
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts after the first one (0 = run once)
    pub max_retries: usize,
    /// Pause before the first retry, doubled for each further retry
    pub base_delay_ms: u64,
    /// Upper bound on a single pause
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Default policy: 3 retries, 10ms doubling up to 100ms
    pub fn new() -> Self {
        Self::default()
    }

    /// Run exactly once
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set the number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the first pause
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set the pause ceiling
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Pause before retry number `attempt + 1`
    pub(crate) fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u64 << attempt.min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
