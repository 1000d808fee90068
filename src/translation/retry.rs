use std::time::Duration;

use crate::app_config::TranslationCommonConfig;
use crate::errors::BackendError;

/// Exponential backoff for retryable backend failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled each time
    pub base_delay: Duration,
    /// Ceiling for any single delay, server hints included
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(common: &TranslationCommonConfig) -> Self {
        Self::new(
            common.retry_count,
            Duration::from_millis(common.retry_backoff_ms),
            Duration::from_millis(common.max_backoff_ms),
        )
    }

    /// Whether another attempt is allowed after `attempt` failed (0-based)
    pub fn should_retry(&self, attempt: u32, error: &BackendError) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }

    /// Delay before retrying after `attempt` failed (0-based)
    pub fn delay_for(&self, attempt: u32, error: &BackendError) -> Duration {
        let delay = match error.retry_after() {
            Some(hint) => hint,
            None => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt.min(16))),
        };
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TranslationCommonConfig::default())
    }
}
