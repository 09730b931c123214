//! Background Tasks Module
//!
//! Contains background tasks spawned by the data manager.
//!
//! # Tasks
//! - Auto-refresh: periodically refetches a subscribed key

mod refresh;

pub use refresh::spawn_refresh_task;
