//! Retry Policy
//!
//! Per-attempt timeout plus exponential backoff for calls that are safe to
//! repeat. Only errors reporting `is_retryable()` are retried.

use std::future::Future;
use std::time::Duration;

use crate::error::{PaymentError, Result};

/// Backoff configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Timeout applied to each attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Read `CHECKOUT_MAX_ATTEMPTS` and `PROVIDER_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_attempts = std::env::var("CHECKOUT_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_attempts);
        let attempt_timeout = std::env::var("PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.attempt_timeout, Duration::from_secs);

        Self {
            max_attempts,
            attempt_timeout,
            ..defaults
        }
    }

    /// No delay between attempts (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => PaymentError::Upstream(format!(
                    "{operation} timed out after {:?}",
                    self.attempt_timeout
                )),
            };

            if !err.is_retryable() || attempt >= attempts {
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                operation,
                attempt,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after failure"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
