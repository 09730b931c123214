//! Auto-Refresh Task
//!
//! Background task that periodically refetches one key while it has
//! subscribers.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::{ErasedFetcher, FetchOptions, WeakDataCacheManager};

/// Spawns the refresh schedule for `key`.
///
/// The task ticks every `options.cache_duration()`, starting one period
/// from now. On each tick it performs a background fetch with the original
/// fetcher, provided the key still has subscribers. Failures are logged and
/// the schedule keeps its period.
///
/// The task holds only a weak handle to the manager and exits once the
/// manager is gone. Cancel it by aborting the returned handle.
pub fn spawn_refresh_task(
    manager: WeakDataCacheManager,
    key: String,
    fetcher: ErasedFetcher,
    options: FetchOptions,
) -> JoinHandle<()> {
    let period = options.cache_duration();

    tokio::spawn(async move {
        info!("Starting auto-refresh for '{}' every {:?}", key, period);

        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(manager) = manager.upgrade() else {
                debug!("Manager dropped, stopping auto-refresh for '{}'", key);
                break;
            };

            if manager.subscriber_count(&key) == 0 {
                debug!("Auto-refresh: '{}' has no subscribers, skipping", key);
                continue;
            }

            match manager
                .refresh_in_background(&key, Arc::clone(&fetcher), options.clone())
                .await
            {
                Ok(()) => debug!("Auto-refresh: '{}' refreshed", key),
                Err(err) => warn!("Auto-refresh: '{}' failed: {}", key, err),
            }
        }
    })
}
