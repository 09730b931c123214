//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with freshness tracking.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

// == Cache Entry ==
/// A single cached value with its production and expiry instants.
///
/// Entries are replaced wholesale on every successful fetch.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Monotonic instant the value was produced
    pub produced_at: Instant,
    /// Monotonic instant the value hard-expires, always after `produced_at`
    pub expires_at: Instant,
    /// Wall-clock time of the fetch, for reporting
    pub fetched_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry produced at `now` that lives for `duration`.
    ///
    /// Zero durations are clamped to one millisecond.
    pub fn new(value: V, now: Instant, duration: Duration) -> Self {
        let duration = duration.max(Duration::from_millis(1));
        Self {
            value,
            produced_at: now,
            expires_at: now + duration,
            fetched_at: Utc::now(),
        }
    }

    // == Age ==
    /// Time elapsed since the value was produced.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.produced_at)
    }

    // == Is Expired ==
    /// True once `now` has reached the hard expiry.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    // == Is Fresh ==
    /// True while the entry can be served without refetching.
    ///
    /// An entry is due for refresh once its age reaches `threshold` of the
    /// staleness `window`, or once it has hard-expired.
    pub fn is_fresh(&self, now: Instant, window: Duration, threshold: f64) -> bool {
        if self.is_expired(now) {
            return false;
        }
        self.age(now) < window.mul_f64(threshold)
    }

    // == Info ==
    /// Reporting snapshot of the entry metadata.
    pub fn info(&self, now: Instant) -> EntryInfo {
        EntryInfo {
            fetched_at: self.fetched_at,
            age_ms: self.age(now).as_millis() as u64,
            expires_in_ms: self.expires_at.saturating_duration_since(now).as_millis() as u64,
        }
    }
}

// == Entry Info ==
/// Metadata about a cached value, without the value itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Wall-clock time of the fetch
    pub fetched_at: DateTime<Utc>,
    /// Age in milliseconds
    pub age_ms: u64,
    /// Remaining lifetime in milliseconds, 0 once expired
    pub expires_in_ms: u64,
}
