//! Retry logic for transport operations.

use std::future::Future;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use esdump_core::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};

/// Tracing target for retries.
const TRACING_TARGET: &str = "esdump_engine::retry";

/// Configuration for retrying transient transport failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (0 disables retries).
    #[cfg_attr(
        feature = "config",
        arg(long = "retries", env = "ESDUMP_RETRIES", default_value_t = 3)
    )]
    pub max_attempts: u32,

    /// Backoff before the first retry.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "retry-backoff",
            env = "ESDUMP_RETRY_BACKOFF",
            value_parser = esdump_core::parse_duration,
            default_value = "500ms"
        )
    )]
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Upper bound for any single backoff.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "retry-max-backoff",
            env = "ESDUMP_RETRY_MAX_BACKOFF",
            value_parser = esdump_core::parse_duration,
            default_value = "30s"
        )
    )]
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential backoff.
    #[cfg_attr(feature = "config", arg(skip = 2.0))]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Creates a configuration with the given retry count and first backoff.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            ..Self::default()
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the maximum backoff duration.
    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Calculates the backoff before retry number `attempt` (0-based).
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let backoff = if millis.is_finite() && millis < u64::MAX as f64 {
            Duration::from_millis(millis as u64)
        } else {
            self.max_backoff
        };
        backoff.min(self.max_backoff)
    }

    /// Retries an operation while it fails with `SourceUnavailable`.
    ///
    /// Expired cursors are not retried here; resubmitting the same token
    /// cannot succeed.
    pub async fn retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry_if(operation, |err| err.kind() == ErrorKind::SourceUnavailable)
            .await
    }

    /// Retries an operation while `should_retry` accepts its error.
    pub async fn retry_if<F, Fut, T, P>(&self, mut operation: F, mut should_retry: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnMut(&Error) -> bool,
    {
        let mut attempt = 0;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !should_retry(&err) {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                tracing::warn!(
                    target: TRACING_TARGET,
                    attempts = attempt + 1,
                    error = %err,
                    "Giving up after retries"
                );
                return Err(err);
            }

            let backoff = self.calculate_backoff(attempt);
            attempt += 1;
            tracing::debug!(
                target: TRACING_TARGET,
                attempt,
                max_attempts = self.max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Retrying operation after backoff"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}
