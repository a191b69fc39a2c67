//! Retry with exponential backoff for calls to external services.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "crate::config::humantime_duration")]
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Run `operation` until it succeeds or `max_attempts` is exhausted.
    ///
    /// Attempt `i` (zero-based) that fails is followed by a sleep of
    /// `base_delay * 2^i`. The last error is returned to the caller.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    tracing::warn!("Attempt {} failed: {}", attempt, e);

                    if attempt >= attempts {
                        return Err(e);
                    }

                    tokio::time::sleep(self.backoff(attempt - 1)).await;
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}
