//! Fetch Options Module
//!
//! Per-call options with explicit defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_DURATION_MS;

// == Fetch Options ==
/// Options controlling caching, refresh and retry for one fetch.
///
/// # Defaults
/// - `cache_duration_ms`: 30000
/// - `critical`: false (critical keys use a 5 s staleness window)
/// - `auto_refresh`: true
/// - `retry_on_error`: true
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Lifetime of the cached value and period of the refresh schedule
    pub cache_duration_ms: u64,
    /// Use the short critical staleness window
    pub critical: bool,
    /// Arm a periodic background refresh while subscribers exist
    pub auto_refresh: bool,
    /// Retry a failing fetcher with exponential backoff
    pub retry_on_error: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            cache_duration_ms: DEFAULT_CACHE_DURATION_MS,
            critical: false,
            auto_refresh: true,
            retry_on_error: true,
        }
    }
}

impl FetchOptions {
    pub fn with_cache_duration_ms(mut self, cache_duration_ms: u64) -> Self {
        self.cache_duration_ms = cache_duration_ms;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    pub fn retry_on_error(mut self, retry_on_error: bool) -> Self {
        self.retry_on_error = retry_on_error;
        self
    }

    /// Configured cache duration, never shorter than one millisecond.
    pub fn cache_duration(&self) -> Duration {
        Duration::from_millis(self.cache_duration_ms.max(1))
    }

    /// Validates the options.
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.cache_duration_ms == 0 {
            return Some("cache_duration_ms must be greater than zero".to_string());
        }
        None
    }
}
