//! API Handlers
//!
//! HTTP request handlers for each gateway endpoint.

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::cache::{DataCacheManager, DataKey, FetchOptions};
use crate::config::Config;
use crate::error::{DataError, Result};
use crate::models::{FlushResponse, HealthResponse, QueryRequest, QueryResponse, StatsResponse};
use crate::upstream::UpstreamClient;

/// Application state shared across all handlers.
///
/// Holds the single data manager of the process; clones share it.
#[derive(Clone)]
pub struct AppState {
    pub manager: DataCacheManager,
    pub upstream: UpstreamClient,
    /// Options for queries that carry none
    pub defaults: FetchOptions,
}

impl AppState {
    pub fn new(manager: DataCacheManager, upstream: UpstreamClient, defaults: FetchOptions) -> Self {
        Self {
            manager,
            upstream,
            defaults,
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream_url, config.upstream_timeout())?;
        Ok(Self::new(
            DataCacheManager::new(config.manager_config()),
            upstream,
            config.default_fetch_options(),
        ))
    }
}

/// Handler for POST /query
///
/// Resolves the request to a cache key and fetches it through the data
/// manager, calling the marketplace API only when the cache cannot answer.
pub async fn query_handler(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(DataError::InvalidRequest(error_msg));
    }

    let key: DataKey<Value> = DataKey::with_params(&req.endpoint, &req.filters)?;
    let options = req.options.unwrap_or_else(|| state.defaults.clone());
    let body = if req.filters.is_null() {
        json!({})
    } else {
        req.filters
    };

    let fetcher = state.upstream.fetcher(req.endpoint, body);
    let data = state.manager.fetch(&key, fetcher, options).await?;

    // A concurrent flush may already have dropped the entry
    let fetched_at = state
        .manager
        .entry_info(key.as_str())
        .map_or_else(Utc::now, |info| info.fetched_at);

    Ok(Json(QueryResponse {
        key: key.to_string(),
        data: Value::clone(&data),
        fetched_at,
    }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.manager.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for DELETE /cache
///
/// Tears the manager down: schedules, entries and bookkeeping.
pub async fn flush_handler(State(state): State<AppState>) -> Json<FlushResponse> {
    let cleared = state.manager.stats().total_entries;
    state.manager.destroy();
    info!("Cache flushed via API ({} entries)", cleared);

    Json(FlushResponse::new(cleared))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Nothing listens on port 9, so every upstream call fails fast
    fn offline_state() -> AppState {
        let upstream = UpstreamClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        AppState::new(
            DataCacheManager::default(),
            upstream,
            FetchOptions::default().retry_on_error(false),
        )
    }

    fn query(endpoint: &str) -> QueryRequest {
        serde_json::from_value(json!({ "endpoint": endpoint })).unwrap()
    }

    #[tokio::test]
    async fn test_query_served_from_cache() {
        let state = offline_state();
        let key: DataKey<Value> = DataKey::new("/api/projects");
        state
            .manager
            .fetch(&key, || async { Ok(json!(["p1"])) }, FetchOptions::default())
            .await
            .unwrap();

        let response = query_handler(State(state), Json(query("/api/projects")))
            .await
            .unwrap();
        assert_eq!(response.key, "/api/projects");
        assert_eq!(response.data, json!(["p1"]));
    }

    #[tokio::test]
    async fn test_query_invalid_endpoint() {
        let result = query_handler(State(offline_state()), Json(query("api/projects"))).await;
        assert!(matches!(result, Err(DataError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_query_upstream_unreachable() {
        let result = query_handler(State(offline_state()), Json(query("/api/credits"))).await;
        assert!(matches!(result, Err(DataError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let response = stats_handler(State(offline_state())).await;
        assert_eq!(response.stats.hits, 0);
        assert_eq!(response.stats.misses, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_flush_handler_clears_manager() {
        let state = offline_state();
        let key: DataKey<Value> = DataKey::new("/api/donations");
        state
            .manager
            .fetch(&key, || async { Ok(json!({})) }, FetchOptions::default())
            .await
            .unwrap();

        let response = flush_handler(State(state.clone())).await;
        assert_eq!(response.cleared_entries, 1);
        assert!(state.manager.is_empty());
    }
}
