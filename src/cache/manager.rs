//! Data Cache Manager Module
//!
//! Owns the keyed cache, per-key fetch state, in-flight fetches, subscriber
//! sets and refresh schedules. One manager is created per process and cloned
//! into every consumer.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use anyhow::anyhow;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::subscribers::{Callback, SubscriberRegistry};
use crate::cache::{
    CacheEntry, CacheStats, DataKey, EntryInfo, FetchOptions, FetchState, SubscriberId,
};
use crate::config::ManagerConfig;
use crate::error::{DataError, Result};
use crate::tasks::spawn_refresh_task;

/// Type-erased cached value.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// Type-erased fetcher, kept so refresh schedules can call it again.
pub(crate) type ErasedFetcher =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<AnyValue>> + Send + Sync>;

type SharedFetch = Shared<BoxFuture<'static, Result<AnyValue>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchOrigin {
    Caller,
    Background,
}

struct State {
    entries: HashMap<String, CacheEntry<AnyValue>>,
    fetch_states: HashMap<String, FetchState>,
    in_flight: HashMap<String, SharedFetch>,
    subscribers: SubscriberRegistry,
    schedules: HashMap<String, JoinHandle<()>>,
    stats: CacheStats,
    /// Bumped by `destroy()` so fetches started earlier are discarded
    epoch: u64,
}

impl State {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            fetch_states: HashMap::new(),
            in_flight: HashMap::new(),
            subscribers: SubscriberRegistry::new(),
            schedules: HashMap::new(),
            stats: CacheStats::new(),
            epoch: 0,
        }
    }
}

struct Inner {
    config: ManagerConfig,
    state: Mutex<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for (_, handle) in self.state.get_mut().schedules.drain() {
            handle.abort();
        }
    }
}

// == Data Cache Manager ==
/// Cache-and-subscription layer over caller-supplied fetchers.
///
/// Cloning is cheap and yields a handle to the same cache.
#[derive(Clone)]
pub struct DataCacheManager {
    inner: Arc<Inner>,
}

/// Non-owning handle held by refresh schedules and subscriptions.
#[derive(Clone)]
pub struct WeakDataCacheManager {
    inner: Weak<Inner>,
}

impl WeakDataCacheManager {
    pub fn upgrade(&self) -> Option<DataCacheManager> {
        self.inner.upgrade().map(|inner| DataCacheManager { inner })
    }
}

impl DataCacheManager {
    // == Constructor ==
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::new()),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakDataCacheManager {
        WeakDataCacheManager {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // == Fetch ==
    /// Returns the value for `key`, fetching it when needed.
    ///
    /// A fresh entry is returned without calling `fetcher`. A fetch already
    /// running for the key is joined instead of duplicated. Otherwise the
    /// fetcher runs under the retry policy; on final failure the previous
    /// value is returned if one is cached, else the error.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &DataKey<T>,
        fetcher: F,
        options: FetchOptions,
    ) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let value = self
            .fetch_erased(key.as_str(), erase(fetcher), options, FetchOrigin::Caller)
            .await?;
        downcast(key.as_str(), value)
    }

    /// Refetch issued by a refresh schedule.
    ///
    /// Never re-arms the schedule and holds off while the key is in backoff.
    pub(crate) async fn refresh_in_background(
        &self,
        key: &str,
        fetcher: ErasedFetcher,
        options: FetchOptions,
    ) -> Result<()> {
        let options = options.auto_refresh(false);
        self.fetch_erased(key, fetcher, options, FetchOrigin::Background)
            .await
            .map(|_| ())
    }

    async fn fetch_erased(
        &self,
        key: &str,
        fetcher: ErasedFetcher,
        options: FetchOptions,
        origin: FetchOrigin,
    ) -> Result<AnyValue> {
        let pending = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let now = Instant::now();
            let window = self.inner.config.freshness_window(&options);
            let threshold = self.inner.config.refresh_threshold;

            if let Some(entry) = state.entries.get(key) {
                if entry.is_fresh(now, window, threshold) {
                    state.stats.record_hit();
                    return Ok(Arc::clone(&entry.value));
                }

                let backing_off = state
                    .fetch_states
                    .get(key)
                    .is_some_and(|fetch_state| fetch_state.in_backoff(now));
                if origin == FetchOrigin::Background && backing_off {
                    debug!("Skipping refresh of '{}' during backoff", key);
                    return Ok(Arc::clone(&entry.value));
                }
            }

            match state.in_flight.get(key).cloned() {
                Some(running) => {
                    state.stats.record_deduplicated();
                    debug!("Joining in-flight fetch for '{}'", key);
                    running
                }
                None => {
                    state.stats.record_miss();
                    if origin == FetchOrigin::Background {
                        state.stats.record_background_refresh();
                    }
                    self.start_fetch(state, key, fetcher, options, now)
                }
            }
        };

        pending.await
    }

    fn start_fetch(
        &self,
        state: &mut State,
        key: &str,
        fetcher: ErasedFetcher,
        options: FetchOptions,
        now: Instant,
    ) -> SharedFetch {
        let fetch_state = state.fetch_states.entry(key.to_string()).or_default();
        let allow_retry =
            options.retry_on_error && fetch_state.allows_retry(&self.inner.config.retry);
        fetch_state.begin_attempt(now);

        debug!("Starting fetch for '{}' (retries allowed: {})", key, allow_retry);

        // Spawned so the fetch completes even if every waiter goes away
        let task = tokio::spawn(self.clone().run_fetch(
            key.to_string(),
            fetcher,
            options,
            allow_retry,
            state.epoch,
        ));

        let task_key = key.to_string();
        let shared = async move {
            task.await.unwrap_or_else(|err| {
                Err(DataError::Aborted {
                    key: task_key,
                    reason: err.to_string(),
                })
            })
        }
        .boxed()
        .shared();

        state.in_flight.insert(key.to_string(), shared.clone());
        shared
    }

    async fn run_fetch(
        self,
        key: String,
        fetcher: ErasedFetcher,
        options: FetchOptions,
        allow_retry: bool,
        epoch: u64,
    ) -> Result<AnyValue> {
        let policy = self.inner.config.retry.clone();
        let outcome = policy
            .run(&key, allow_retry, || {
                self.inner.state.lock().stats.record_attempt();
                guarded_call(&fetcher)
            })
            .await;

        match outcome {
            Ok(value) => {
                self.complete_success(&key, &value, &fetcher, &options, epoch);
                Ok(value)
            }
            Err(err) => self.complete_failure(&key, err, epoch),
        }
    }

    fn complete_success(
        &self,
        key: &str,
        value: &AnyValue,
        fetcher: &ErasedFetcher,
        options: &FetchOptions,
        epoch: u64,
    ) {
        let callbacks = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.epoch != epoch {
                debug!("Discarding result for '{}' fetched before teardown", key);
                return;
            }

            let now = Instant::now();
            state.in_flight.remove(key);
            state.entries.insert(
                key.to_string(),
                CacheEntry::new(Arc::clone(value), now, options.cache_duration()),
            );
            state
                .fetch_states
                .entry(key.to_string())
                .or_default()
                .record_success();

            if options.auto_refresh && state.subscribers.count(key) > 0 {
                let handle = spawn_refresh_task(
                    self.downgrade(),
                    key.to_string(),
                    Arc::clone(fetcher),
                    options.clone(),
                );
                if let Some(previous) = state.schedules.insert(key.to_string(), handle) {
                    previous.abort();
                }
            }

            state.subscribers.callbacks(key)
        };

        let (delivered, panicked) = notify(key, &callbacks, value);
        self.inner
            .state
            .lock()
            .stats
            .record_notifications(delivered, panicked);
        debug!("Fetched '{}', notified {} subscribers", key, delivered);
    }

    fn complete_failure(&self, key: &str, err: anyhow::Error, epoch: u64) -> Result<AnyValue> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.epoch != epoch {
            return Err(DataError::fetch(key, err));
        }

        let now = Instant::now();
        state.in_flight.remove(key);
        let fetch_state = state.fetch_states.entry(key.to_string()).or_default();
        fetch_state.record_failure(now, &self.inner.config.retry);
        let failures = fetch_state.consecutive_failures;

        match state.entries.get(key) {
            Some(entry) => {
                state.stats.record_failure(true);
                warn!(
                    "Fetch for '{}' failed ({} in a row), serving cached value: {:#}",
                    key, failures, err
                );
                Ok(Arc::clone(&entry.value))
            }
            None => {
                state.stats.record_failure(false);
                warn!("Fetch for '{}' failed ({} in a row): {:#}", key, failures, err);
                Err(DataError::fetch(key, err))
            }
        }
    }

    // == Subscribe ==
    /// Registers `callback` for every successful fetch of `key`.
    ///
    /// Dropping the returned [`Subscription`] unsubscribes. Removing the
    /// last subscriber of a key cancels its refresh schedule; the cached
    /// value stays.
    pub fn subscribe<T, F>(&self, key: &DataKey<T>, callback: F) -> Subscription
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) + Send + Sync + 'static,
    {
        let name = key.as_str().to_string();
        let label = name.clone();
        let erased: Callback = Arc::new(move |value: &AnyValue| {
            match Arc::clone(value).downcast::<T>() {
                Ok(typed) => callback(typed),
                Err(_) => warn!("Subscriber of '{}' expects a different value type", label),
            }
        });

        let id = self.inner.state.lock().subscribers.add(&name, erased);
        debug!("Subscriber {} registered for '{}'", id, name);

        Subscription {
            manager: self.downgrade(),
            key: name,
            id,
            active: true,
        }
    }

    fn remove_subscriber(&self, key: &str, id: SubscriberId) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if !state.subscribers.remove(key, id) {
            return;
        }

        if let Some(handle) = state.schedules.remove(key) {
            handle.abort();
            info!("Auto-refresh for '{}' cancelled: no subscribers left", key);
        }
    }

    // == Destroy ==
    /// Cancels every schedule and clears all cached data and bookkeeping.
    ///
    /// Results of fetches still running are discarded when they complete.
    pub fn destroy(&self) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let cancelled = state.schedules.len();
        for (_, handle) in state.schedules.drain() {
            handle.abort();
        }
        state.entries.clear();
        state.fetch_states.clear();
        state.in_flight.clear();
        state.subscribers.clear();
        state.stats = CacheStats::new();
        state.epoch += 1;

        info!("Data manager cleared, {} refresh schedules cancelled", cancelled);
    }

    // == Inspection ==
    /// Cached value for `key` without fetching.
    ///
    /// Returns None when nothing is cached or the value has another type.
    pub fn cached<T: Send + Sync + 'static>(&self, key: &DataKey<T>) -> Option<Arc<T>> {
        let value = self
            .inner
            .state
            .lock()
            .entries
            .get(key.as_str())
            .map(|entry| Arc::clone(&entry.value))?;
        downcast(key.as_str(), value).ok()
    }

    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let now = Instant::now();
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.info(now))
    }

    pub fn fetch_state(&self, key: &str) -> Option<FetchState> {
        self.inner.state.lock().fetch_states.get(key).cloned()
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.state.lock().subscribers.count(key)
    }

    pub fn is_refresh_scheduled(&self, key: &str) -> bool {
        self.inner.state.lock().schedules.contains_key(key)
    }

    /// True when every internal map is empty.
    pub fn is_empty(&self) -> bool {
        let state = self.inner.state.lock();
        state.entries.is_empty()
            && state.fetch_states.is_empty()
            && state.in_flight.is_empty()
            && state.subscribers.is_empty()
            && state.schedules.is_empty()
    }

    // == Stats ==
    /// Current counters plus live gauges.
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let mut stats = state.stats.clone();
        stats.total_entries = state.entries.len();
        stats.in_flight = state.in_flight.len();
        stats.subscribed_keys = state.subscribers.key_count();
        stats.scheduled_refreshes = state.schedules.len();
        stats
    }
}

impl Default for DataCacheManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl fmt::Debug for DataCacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataCacheManager")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

// == Subscription ==
/// Registration handle returned by [`DataCacheManager::subscribe`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    manager: WeakDataCacheManager,
    key: String,
    id: SubscriberId,
    active: bool,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Removes the callback. Same as dropping the handle.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(manager) = self.manager.upgrade() {
            manager.remove_subscriber(&self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

// == Helpers ==
fn erase<T, F, Fut>(fetcher: F) -> ErasedFetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move || {
        let pending = fetcher();
        async move { pending.await.map(|value| Arc::new(value) as AnyValue) }.boxed()
    })
}

/// Calls the fetcher, turning a panic into an ordinary failed attempt.
fn guarded_call(fetcher: &ErasedFetcher) -> BoxFuture<'static, anyhow::Result<AnyValue>> {
    let fetcher = Arc::clone(fetcher);
    async move {
        match AssertUnwindSafe(async move { fetcher().await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(anyhow!("fetcher panicked: {}", panic_message(&*panic))),
        }
    }
    .boxed()
}

/// Invokes each callback in order; a panicking callback does not stop the rest.
///
/// Returns (delivered, panicked).
fn notify(key: &str, callbacks: &[Callback], value: &AnyValue) -> (u64, u64) {
    let mut panicked = 0;
    for callback in callbacks {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| callback(value)));
        if let Err(panic) = outcome {
            panicked += 1;
            warn!("Subscriber of '{}' panicked: {}", key, panic_message(&*panic));
        }
    }
    (callbacks.len() as u64 - panicked, panicked)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn downcast<T: Send + Sync + 'static>(key: &str, value: AnyValue) -> Result<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| DataError::TypeMismatch(key.to_string()))
}
