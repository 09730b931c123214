//! Live Query Binding
//!
//! Consumer-side adapter over the data manager: mounts a query, keeps a
//! `loading / error / data` state current through a watch channel, and
//! unsubscribes when dropped.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::{DataCacheManager, DataKey, FetchOptions, Subscription};
use crate::error::DataError;

// == Load State ==
/// What a mounted query currently shows.
#[derive(Debug)]
pub enum LoadState<T> {
    /// No value yet
    Loading,
    /// Latest value
    Ready(Arc<T>),
    /// Initial fetch failed and nothing was cached
    Failed(DataError),
}

impl<T> Clone for LoadState<T> {
    fn clone(&self) -> Self {
        match self {
            LoadState::Loading => LoadState::Loading,
            LoadState::Ready(value) => LoadState::Ready(Arc::clone(value)),
            LoadState::Failed(err) => LoadState::Failed(err.clone()),
        }
    }
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn data(&self) -> Option<&Arc<T>> {
        match self {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DataError> {
        match self {
            LoadState::Failed(err) => Some(err),
            _ => None,
        }
    }
}

// == Live Query ==
/// A mounted query bound to one key.
pub struct LiveQuery<T> {
    state: watch::Receiver<LoadState<T>>,
    _subscription: Subscription,
    loader: JoinHandle<()>,
}

impl<T: Send + Sync + 'static> LiveQuery<T> {
    /// Mounts a query: subscribe for pushed updates, then fetch.
    ///
    /// Subscribing before fetching lets the fetch arm auto-refresh.
    pub fn mount<F, Fut>(
        manager: &DataCacheManager,
        key: DataKey<T>,
        fetcher: F,
        options: FetchOptions,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let initial = manager
            .cached(&key)
            .map_or(LoadState::Loading, LoadState::Ready);
        let (tx, rx) = watch::channel(initial);
        let tx = Arc::new(tx);

        let pushed = Arc::clone(&tx);
        let subscription = manager.subscribe(&key, move |value| {
            pushed.send_replace(LoadState::Ready(value));
        });

        let manager = manager.clone();
        let loader = tokio::spawn(async move {
            match manager.fetch(&key, fetcher, options).await {
                // Subscribers already saw this value unless it came from cache
                Ok(value) => {
                    tx.send_if_modified(|current| {
                        let shown = matches!(
                            current,
                            LoadState::Ready(shown) if Arc::ptr_eq(shown, &value)
                        );
                        if !shown {
                            *current = LoadState::Ready(value);
                        }
                        !shown
                    });
                }
                Err(err) => {
                    tx.send_replace(LoadState::Failed(err));
                }
            }
        });

        Self {
            state: rx,
            _subscription: subscription,
            loader,
        }
    }
}

impl<T> LiveQuery<T> {
    /// Snapshot of the current state.
    pub fn current(&self) -> LoadState<T> {
        self.state.borrow().clone()
    }

    /// Waits for the next state change and returns it.
    pub async fn changed(&mut self) -> LoadState<T> {
        // The sender lives in the subscription callback as long as `self`
        let _ = self.state.changed().await;
        self.state.borrow_and_update().clone()
    }

    /// Additional receiver for the same state.
    pub fn watch(&self) -> watch::Receiver<LoadState<T>> {
        self.state.clone()
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        // The fetch itself keeps running inside the manager
        self.loader.abort();
    }
}
