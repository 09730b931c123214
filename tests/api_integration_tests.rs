//! Integration Tests for API Endpoints
//!
//! Tests the full request/response cycle of the gateway against a mock
//! marketplace API served on an ephemeral port.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use realtime_data::{
    api::create_router, AppState, DataCacheManager, FetchOptions, UpstreamClient,
};
use serde_json::{json, Value};
use tower::ServiceExt;

// == Mock Upstream ==

#[derive(Clone, Default)]
struct Upstream {
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

async fn projects(State(upstream): State<Upstream>, Json(filters): Json<Value>) -> impl IntoResponse {
    let n = upstream.calls.fetch_add(1, Ordering::SeqCst) + 1;
    if upstream.failing.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "db down" })));
    }
    (
        StatusCode::OK,
        Json(json!({ "call": n, "filters": filters, "projects": ["reforestation", "solar"] })),
    )
}

async fn spawn_upstream(upstream: Upstream) -> String {
    let app = Router::new()
        .route("/api/projects", post(projects))
        .with_state(upstream);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// == Helper Functions ==

async fn create_test_app(upstream: &Upstream) -> (Router, DataCacheManager) {
    let base_url = spawn_upstream(upstream.clone()).await;
    let client = UpstreamClient::new(base_url, Duration::from_secs(5)).unwrap();
    let manager = DataCacheManager::default();
    let state = AppState::new(
        manager.clone(),
        client,
        FetchOptions::default().retry_on_error(false),
    );
    (create_router(state), manager)
}

fn query_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// == QUERY Endpoint Tests ==

#[tokio::test]
async fn test_query_fetches_from_upstream() {
    let upstream = Upstream::default();
    let (app, _) = create_test_app(&upstream).await;

    let response = app
        .oneshot(query_request(json!({
            "endpoint": "/api/projects",
            "filters": { "status": "active" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["key"], r#"/api/projects?{"status":"active"}"#);
    assert_eq!(json["data"]["filters"]["status"], "active");
    assert_eq!(json["data"]["projects"][0], "reforestation");
    assert!(json["fetched_at"].is_string());
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_repeated_query_is_cached() {
    let upstream = Upstream::default();
    let (app, _) = create_test_app(&upstream).await;
    let body = json!({ "endpoint": "/api/projects" });

    for _ in 0..3 {
        let response = app.clone().oneshot(query_request(body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_to_json(response.into_body()).await;
        assert_eq!(json["data"]["call"], 1);
    }
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

    let response = app.oneshot(get_request("/stats")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["hits"], 2);
    assert_eq!(json["misses"], 1);
    assert_eq!(json["total_entries"], 1);
}

#[tokio::test]
async fn test_different_filters_use_different_keys() {
    let upstream = Upstream::default();
    let (app, manager) = create_test_app(&upstream).await;

    for project_id in [1, 2] {
        let response = app
            .clone()
            .oneshot(query_request(json!({
                "endpoint": "/api/projects",
                "filters": { "project_id": project_id }
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    assert_eq!(manager.stats().total_entries, 2);
}

#[tokio::test]
async fn test_concurrent_queries_share_one_upstream_call() {
    let upstream = Upstream::default();
    let (app, _) = create_test_app(&upstream).await;
    let body = json!({ "endpoint": "/api/projects", "filters": { "page": 1 } });

    let (a, b) = tokio::join!(
        app.clone().oneshot(query_request(body.clone())),
        app.clone().oneshot(query_request(body)),
    );

    assert_eq!(a.unwrap().status(), StatusCode::OK);
    assert_eq!(b.unwrap().status(), StatusCode::OK);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upstream_failure_without_cache() {
    let upstream = Upstream::default();
    upstream.failing.store(true, Ordering::SeqCst);
    let (app, _) = create_test_app(&upstream).await;

    let response = app
        .oneshot(query_request(json!({ "endpoint": "/api/projects" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("/api/projects"));
}

#[tokio::test]
async fn test_stale_data_served_when_upstream_fails() {
    let upstream = Upstream::default();
    let (app, manager) = create_test_app(&upstream).await;
    let body = json!({
        "endpoint": "/api/projects",
        "options": { "cache_duration_ms": 50, "retry_on_error": false }
    });

    let response = app.clone().oneshot(query_request(body.clone())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    upstream.failing.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = app.oneshot(query_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["data"]["call"], 1);

    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    assert_eq!(manager.stats().stale_served, 1);
}

// == Validation Tests ==

#[tokio::test]
async fn test_query_rejects_invalid_requests() {
    let upstream = Upstream::default();
    let (app, _) = create_test_app(&upstream).await;

    let invalid = [
        json!({ "endpoint": "" }),
        json!({ "endpoint": "api/projects" }),
        json!({ "endpoint": "/api/projects", "options": { "cache_duration_ms": 0 } }),
    ];

    for body in invalid {
        let response = app.clone().oneshot(query_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_to_json(response.into_body()).await;
        assert!(json.get("error").is_some());
    }
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_json_request() {
    let upstream = Upstream::default();
    let (app, _) = create_test_app(&upstream).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/query")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"invalid json"#))
                .unwrap(),
        )
        .await
        .unwrap();

    // Axum returns 400 or 422 for JSON parsing errors
    assert!(
        response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::UNPROCESSABLE_ENTITY
    );
}

// == CACHE / HEALTH Endpoint Tests ==

#[tokio::test]
async fn test_flush_forces_refetch() {
    let upstream = Upstream::default();
    let (app, manager) = create_test_app(&upstream).await;
    let body = json!({ "endpoint": "/api/projects" });

    app.clone().oneshot(query_request(body.clone())).await.unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/cache")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["cleared_entries"], 1);
    assert!(manager.is_empty());

    let response = app.oneshot(query_request(body)).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["data"]["call"], 2);
}

#[tokio::test]
async fn test_health_endpoint() {
    let upstream = Upstream::default();
    let (app, _) = create_test_app(&upstream).await;

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"].as_str().unwrap(), "healthy");
    assert!(json.get("timestamp").is_some());
}
