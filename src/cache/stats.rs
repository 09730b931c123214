//! Cache Statistics Module
//!
//! Tracks data manager counters: cache hits, issued fetches, deduplicated
//! joins, failures, stale fallbacks and subscriber notifications.

use serde::Serialize;

// == Cache Stats ==
/// Counters and gauges of the data manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Fetches served from a fresh cache entry
    pub hits: u64,
    /// Fetches that had to start a new fetch
    pub misses: u64,
    /// Fetches that joined an already running fetch
    pub deduplicated: u64,
    /// Individual fetcher invocations, retries included
    pub fetch_attempts: u64,
    /// Fetches that failed after all retries
    pub failures: u64,
    /// Failed fetches answered with a stale value
    pub stale_served: u64,
    /// Subscriber callbacks invoked
    pub notifications: u64,
    /// Subscriber callbacks that panicked
    pub subscriber_panics: u64,
    /// Fetches issued by refresh schedules
    pub background_refreshes: u64,
    /// Current number of cache entries
    pub total_entries: usize,
    /// Fetches currently running
    pub in_flight: usize,
    /// Keys with at least one subscriber
    pub subscribed_keys: usize,
    /// Active refresh schedules
    pub scheduled_refreshes: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Joined in-flight fetches count as hits. Returns 0.0 if no requests
    /// have been made.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.deduplicated;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_deduplicated(&mut self) {
        self.deduplicated += 1;
    }

    pub fn record_attempt(&mut self) {
        self.fetch_attempts += 1;
    }

    /// Records a failed fetch, noting whether a stale value covered it.
    pub fn record_failure(&mut self, stale_served: bool) {
        self.failures += 1;
        if stale_served {
            self.stale_served += 1;
        }
    }

    pub fn record_notifications(&mut self, delivered: u64, panicked: u64) {
        self.notifications += delivered;
        self.subscriber_panics += panicked;
    }

    pub fn record_background_refresh(&mut self) {
        self.background_refreshes += 1;
    }
}
