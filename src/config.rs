//! Configuration Module
//!
//! Handles loading the gateway and data manager configuration from
//! environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{
    FetchOptions, RetryPolicy, BACKOFF_MULTIPLIER, BASE_RETRY_DELAY_MS,
    CRITICAL_CACHE_DURATION_MS, DEFAULT_CACHE_DURATION_MS, MAX_RETRIES, REFRESH_THRESHOLD,
};

/// Gateway configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Base URL of the marketplace API the gateway fetches from
    pub upstream_url: String,
    /// Per-request timeout for upstream calls in milliseconds
    pub upstream_timeout_ms: u64,
    /// Cache duration used when a request carries no options
    pub default_cache_duration_ms: u64,
    /// Staleness tolerance for keys flagged critical
    pub critical_cache_duration_ms: u64,
    /// Fraction of the cache duration after which an entry is refreshed
    pub refresh_threshold: f64,
    /// Additional attempts after a failed fetch
    pub max_retries: u32,
    /// Growth factor of the retry delay
    pub backoff_multiplier: f64,
    /// Delay before the first retry in milliseconds
    pub base_retry_delay_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 4000)
    /// - `UPSTREAM_URL` - Marketplace API base URL (default: http://localhost:3000)
    /// - `UPSTREAM_TIMEOUT_MS` - Upstream request timeout (default: 10000)
    /// - `DEFAULT_CACHE_DURATION_MS` - Default cache duration (default: 30000)
    /// - `CRITICAL_CACHE_DURATION_MS` - Critical data tolerance (default: 5000)
    /// - `REFRESH_THRESHOLD` - Pre-emptive refresh fraction (default: 0.8)
    /// - `MAX_RETRIES` - Retries per fetch (default: 3)
    /// - `BACKOFF_MULTIPLIER` - Retry delay growth (default: 1.5)
    /// - `BASE_RETRY_DELAY_MS` - First retry delay (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            upstream_url: env::var("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            upstream_timeout_ms: env_or("UPSTREAM_TIMEOUT_MS", defaults.upstream_timeout_ms),
            default_cache_duration_ms: env_or(
                "DEFAULT_CACHE_DURATION_MS",
                defaults.default_cache_duration_ms,
            ),
            critical_cache_duration_ms: env_or(
                "CRITICAL_CACHE_DURATION_MS",
                defaults.critical_cache_duration_ms,
            ),
            refresh_threshold: env_or("REFRESH_THRESHOLD", defaults.refresh_threshold),
            max_retries: env_or("MAX_RETRIES", defaults.max_retries),
            backoff_multiplier: env_or("BACKOFF_MULTIPLIER", defaults.backoff_multiplier),
            base_retry_delay_ms: env_or("BASE_RETRY_DELAY_MS", defaults.base_retry_delay_ms),
        }
    }

    /// Builds the data manager configuration.
    ///
    /// Out-of-range thresholds fall back to the default.
    pub fn manager_config(&self) -> ManagerConfig {
        let refresh_threshold = if self.refresh_threshold > 0.0 && self.refresh_threshold <= 1.0 {
            self.refresh_threshold
        } else {
            REFRESH_THRESHOLD
        };

        ManagerConfig {
            retry: RetryPolicy {
                max_retries: self.max_retries,
                backoff_multiplier: self.backoff_multiplier.max(1.0),
                base_delay: Duration::from_millis(self.base_retry_delay_ms),
            },
            critical_duration: Duration::from_millis(self.critical_cache_duration_ms.max(1)),
            refresh_threshold,
        }
    }

    /// Options applied to gateway queries that do not carry their own.
    pub fn default_fetch_options(&self) -> FetchOptions {
        FetchOptions::default().with_cache_duration_ms(self.default_cache_duration_ms.max(1))
    }

    /// Upstream request timeout.
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 4000,
            upstream_url: "http://localhost:3000".to_string(),
            upstream_timeout_ms: 10_000,
            default_cache_duration_ms: DEFAULT_CACHE_DURATION_MS,
            critical_cache_duration_ms: CRITICAL_CACHE_DURATION_MS,
            refresh_threshold: REFRESH_THRESHOLD,
            max_retries: MAX_RETRIES,
            backoff_multiplier: BACKOFF_MULTIPLIER,
            base_retry_delay_ms: BASE_RETRY_DELAY_MS,
        }
    }
}

// == Manager Config ==
/// Policy the data manager is constructed with.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Retry and backoff policy
    pub retry: RetryPolicy,
    /// Effective cache duration for critical keys
    pub critical_duration: Duration,
    /// Fraction of the effective duration after which an entry is due
    pub refresh_threshold: f64,
}

impl ManagerConfig {
    /// Staleness window applied to a fetch with the given options.
    pub fn freshness_window(&self, options: &FetchOptions) -> Duration {
        if options.critical {
            self.critical_duration
        } else {
            options.cache_duration()
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Config::default().manager_config()
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
