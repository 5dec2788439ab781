//! Retry and timeout utilities.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::PathfinderError;

/// Errors that know whether trying again could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for PathfinderError {
    fn is_retryable(&self) -> bool {
        matches!(self, PathfinderError::Timeout(_) | PathfinderError::Io(_))
    }
}

/// Exponential backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Pause before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single pause.
    pub max_delay: Duration,
    /// Each pause is this many times the previous one.
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::attempts(3)
    }
}

impl RetryConfig {
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Pause before retry number `retry` (1 = first retry).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with an error that is not
/// [`Retryable`], or runs out of attempts. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() {
            debug!(attempt, error = %err, "Not retrying permanent failure");
            return Err(err);
        }
        if attempt >= max_attempts {
            warn!(attempt, error = %err, "Giving up");
            return Err(err);
        }

        let pause = config.backoff(attempt);
        debug!(attempt, max_attempts, ?pause, error = %err, "Retrying");
        tokio::time::sleep(pause).await;
        attempt += 1;
    }
}

/// Await `future`, giving up after `limit`.
pub async fn with_timeout<F: Future>(limit: Duration, future: F) -> Result<F::Output, PathfinderError> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| PathfinderError::Timeout(limit))
}
