//! Retry Policy Module
//!
//! Exponential backoff used both between retry attempts of one fetch and
//! for the window that holds off background refreshes after a failure.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::cache::{BACKOFF_MULTIPLIER, BASE_RETRY_DELAY_MS, MAX_RETRIES};

/// Upper bound of any computed delay (24 h)
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

// == Retry Policy ==
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub max_retries: u32,
    /// Growth factor per attempt
    pub backoff_multiplier: f64,
    /// Delay before the first retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            backoff_multiplier: BACKOFF_MULTIPLIER,
            base_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    // == Delays ==
    /// Delay before retry number `attempt` (0-based): `base * multiplier^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.scaled(attempt)
    }

    /// Backoff window after `failures` consecutive failed fetches:
    /// `base * multiplier^failures`.
    pub fn backoff_window(&self, failures: u32) -> Duration {
        self.scaled(failures)
    }

    fn scaled(&self, exponent: u32) -> Duration {
        let exponent = exponent.min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    // == Run ==
    /// Runs `operation`, retrying failures with backoff.
    ///
    /// With `allow_retry` false the operation runs exactly once. Otherwise
    /// it runs up to `max_retries + 1` times; the last error is returned.
    pub async fn run<T, F, Fut>(
        &self,
        key: &str,
        allow_retry: bool,
        mut operation: F,
    ) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let retries = if allow_retry { self.max_retries } else { 0 };
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < retries => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        "Fetch attempt {} for '{}' failed: {:#}; retrying in {:?}",
                        attempt + 1,
                        key,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
