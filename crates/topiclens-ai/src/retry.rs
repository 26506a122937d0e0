//! Retry with exponential back-off shared by the embedder and the brief
//! generator.
//!
//! The wait before retry `n` (zero-based) is `backoff_factor^n` units, where
//! the unit is one second in production. Attempts are bounded by
//! `max_retries + 1`.

use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

/// Upper bound on a single back-off sleep.
const MAX_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: u32,
    /// Length of one back-off unit. Tests set this to zero.
    pub unit: Duration,
    /// Decides whether an error is worth another attempt.
    pub retryable: fn(&ProviderError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, backoff_factor: u32) -> Self {
        Self {
            max_retries,
            backoff_factor,
            unit: Duration::from_secs(1),
            retryable: ProviderError::is_retryable,
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    /// Total number of attempts, first try included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before retry number `retry` (zero-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = self.backoff_factor.saturating_pow(retry);
        self.unit.saturating_mul(multiplier).min(MAX_DELAY)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent. The last error is returned.
    ///
    /// # Errors
    ///
    /// Returns the final [`ProviderError`] from `operation`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !(self.retryable)(&err) || attempt >= self.max_retries {
                        if attempt > 0 {
                            tracing::error!(
                                operation = label,
                                attempts = attempt + 1,
                                error = %err,
                                "giving up after retries"
                            );
                        }
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retryable provider error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
