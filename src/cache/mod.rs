//! Cache Module
//!
//! In-memory data manager: keyed cache with pre-emptive refresh, in-flight
//! fetch deduplication, retry with exponential backoff, stale fallback and
//! auto-refreshing subscriptions.

mod entry;
mod fetch_state;
mod key;
mod manager;
mod options;
mod retry;
mod stats;
mod subscribers;


// Re-export public types
pub use entry::{CacheEntry, EntryInfo};
pub use fetch_state::FetchState;
pub use key::DataKey;
pub use manager::{DataCacheManager, Subscription, WeakDataCacheManager};
pub use options::FetchOptions;
pub use retry::RetryPolicy;
pub use stats::CacheStats;
pub use subscribers::SubscriberId;

pub(crate) use manager::{AnyValue, ErasedFetcher};

// == Public Constants ==
/// Cache duration applied when options do not specify one (30 s)
pub const DEFAULT_CACHE_DURATION_MS: u64 = 30_000;

/// Effective cache duration for critical keys (5 s)
pub const CRITICAL_CACHE_DURATION_MS: u64 = 5_000;

/// Fraction of the effective duration after which an entry is refreshed
pub const REFRESH_THRESHOLD: f64 = 0.8;

/// Additional attempts after a failed fetch
pub const MAX_RETRIES: u32 = 3;

/// Growth factor of retry delays and backoff windows
pub const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Delay before the first retry (1 s)
pub const BASE_RETRY_DELAY_MS: u64 = 1000;
