//! Realtime Data - cache and subscription layer for marketplace data
//!
//! Deduplicates concurrent fetches, retries with exponential backoff, serves
//! stale data on error and keeps subscribers current with auto-refresh.

pub mod api;
pub mod binding;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;
pub mod upstream;

pub use api::{create_router, AppState};
pub use binding::{LiveQuery, LoadState};
pub use cache::{DataCacheManager, DataKey, FetchOptions, Subscription};
pub use config::{Config, ManagerConfig};
pub use error::{DataError, Result};
pub use upstream::UpstreamClient;
