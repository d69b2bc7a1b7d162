//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use memo_cache::{
    api::create_router, cache::CacheCore, clock::ManualClock, AppState, CacheConfig,
};
use serde_json::{json, Value};
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app() -> Router {
    create_router(AppState::new(CacheCore::new(CacheConfig::default())))
}

fn create_app_with_clock(clock: &ManualClock) -> Router {
    let cache = CacheCore::new(CacheConfig::default()).with_clock(Arc::new(clock.clone()));
    create_router(AppState::new(cache))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn put_entry(app: &Router, body: Value) -> StatusCode {
    send(app, json_request("PUT", "/entries", body)).await.0
}

// == Set Endpoint Tests ==

#[tokio::test]
async fn test_set_endpoint_success() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        json_request(
            "PUT",
            "/entries",
            json!({"resource_id": "/api/optimize", "payload": {"K": 3}, "value": [1, 2, 3]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let key = json["key"].as_str().unwrap();
    assert!(key.starts_with("::/api/optimize#"));
    assert!(json["message"].as_str().unwrap().contains(key));
}

#[tokio::test]
async fn test_set_endpoint_with_ttl() {
    let clock = ManualClock::starting_now();
    let app = create_app_with_clock(&clock);
    let entry = json!({"resource_id": "/api/optimize", "value": "short", "ttl": 2});
    let lookup = json!({"resource_id": "/api/optimize"});

    assert_eq!(put_entry(&app, entry).await, StatusCode::OK);
    let (status, _) = send(
        &app,
        json_request("POST", "/entries/lookup", lookup.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    clock.advance(Duration::from_secs(3));

    let (status, _) = send(&app, json_request("POST", "/entries/lookup", lookup)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_set_endpoint_empty_resource() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        json_request("PUT", "/entries", json!({"resource_id": "", "value": 1})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_set_endpoint_invalid_json() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/entries")
                .header("content-type", "application/json")
                .body(Body::from("not valid json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_set_endpoint_value_too_large() {
    let config = CacheConfig {
        max_memory_bytes: 512,
        compression_threshold: usize::MAX,
        ..CacheConfig::default()
    };
    let app = create_router(AppState::new(CacheCore::new(config)));

    let (status, json) = send(
        &app,
        json_request(
            "PUT",
            "/entries",
            json!({"resource_id": "/api/optimize", "value": "x".repeat(4096)}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json["error"].as_str().unwrap().contains("cannot fit"));
}

// == Lookup Endpoint Tests ==

#[tokio::test]
async fn test_lookup_ignores_volatile_fields_and_key_order() {
    let app = create_test_app();

    put_entry(
        &app,
        json!({
            "resource_id": "/api/optimize?debug=1",
            "payload": {"K": 3, "items": ["b", "a"], "timestamp": 1},
            "value": {"plan": "cached"}
        }),
    )
    .await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/entries/lookup",
            json!({
                "resource_id": "/api/optimize/",
                "payload": {"items": ["a", "b"], "requestId": "r-9", "K": 3}
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], json!({"plan": "cached"}));
}

#[tokio::test]
async fn test_lookup_respects_isolation() {
    let app = create_test_app();

    put_entry(
        &app,
        json!({"resource_id": "/api/parse", "isolation": "tenant-a", "value": "a"}),
    )
    .await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/entries/lookup",
            json!({"resource_id": "/api/parse", "isolation": "tenant-b"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/entries/lookup",
            json!({"resource_id": "/api/parse", "isolation": "tenant-a"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], "a");
}

#[tokio::test]
async fn test_lookup_large_value_roundtrips_through_compression() {
    let app = create_test_app();
    let big: Vec<String> = (0..2000).map(|i| format!("row-{}", i % 10)).collect();

    put_entry(
        &app,
        json!({"resource_id": "/api/parse", "payload": {"doc": 1}, "value": big}),
    )
    .await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/entries/lookup",
            json!({"resource_id": "/api/parse", "payload": {"doc": 1}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], json!(big));

    let (_, stats) = send(&app, empty_request("GET", "/stats")).await;
    assert_eq!(stats["per_entry"][0]["compressed"], true);
}

// == Exists Endpoint Tests ==

#[tokio::test]
async fn test_exists_endpoint() {
    let app = create_test_app();
    let lookup = json!({"resource_id": "/api/optimize", "payload": {"K": 1}});

    let (_, json) = send(
        &app,
        json_request("POST", "/entries/exists", lookup.clone()),
    )
    .await;
    assert_eq!(json["exists"], false);

    put_entry(
        &app,
        json!({"resource_id": "/api/optimize", "payload": {"K": 1}, "value": 1}),
    )
    .await;

    let (status, json) = send(&app, json_request("POST", "/entries/exists", lookup)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["exists"], true);

    let (_, stats) = send(&app, empty_request("GET", "/stats")).await;
    assert_eq!(stats["hits"], 0);
    assert_eq!(stats["misses"], 0);
}

// == Invalidation Endpoint Tests ==

#[tokio::test]
async fn test_invalidate_endpoint() {
    let app = create_test_app();
    let lookup = json!({"resource_id": "/api/optimize", "payload": {"K": 2}});

    put_entry(
        &app,
        json!({"resource_id": "/api/optimize", "payload": {"K": 2}, "value": 2}),
    )
    .await;

    let (status, json) = send(
        &app,
        json_request("POST", "/entries/invalidate", lookup.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 1);

    let (_, json) = send(&app, json_request("POST", "/entries/invalidate", lookup)).await;
    assert_eq!(json["removed"], 0);
}

#[tokio::test]
async fn test_invalidate_pattern_endpoint() {
    let app = create_test_app();
    for k in 0..4 {
        put_entry(
            &app,
            json!({"resource_id": "/api/optimize", "payload": {"K": k}, "value": k}),
        )
        .await;
    }
    put_entry(&app, json!({"resource_id": "/api/parse", "value": "keep"})).await;

    let (status, json) = send(&app, empty_request("DELETE", "/entries?pattern=optimize")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 4);

    let (_, stats) = send(&app, empty_request("GET", "/stats")).await;
    assert_eq!(stats["count"], 1);
    assert_eq!(stats["per_entry"][0]["source_identifier"], "/api/parse");
}

#[tokio::test]
async fn test_clear_endpoint() {
    let app = create_test_app();
    for k in 0..3 {
        put_entry(
            &app,
            json!({
                "resource_id": "/api/parse",
                "payload": {"doc": k},
                "value": k,
                "priority": "critical"
            }),
        )
        .await;
    }

    let (status, json) = send(&app, empty_request("DELETE", "/entries/all")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 3);

    let (_, stats) = send(&app, empty_request("GET", "/stats")).await;
    assert_eq!(stats["count"], 0);
    assert_eq!(stats["memory_usage"], 0);
}

// == Stats Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint_tracks_hits_and_misses() {
    let app = create_test_app();
    let lookup = json!({"resource_id": "/api/optimize"});

    put_entry(&app, json!({"resource_id": "/api/optimize", "value": "v"})).await;
    send(
        &app,
        json_request("POST", "/entries/lookup", lookup.clone()),
    )
    .await;
    send(&app, json_request("POST", "/entries/lookup", lookup)).await;
    send(
        &app,
        json_request(
            "POST",
            "/entries/lookup",
            json!({"resource_id": "/api/missing"}),
        ),
    )
    .await;

    let (status, stats) = send(&app, empty_request("GET", "/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["hits"], 2);
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["count"], 1);
    assert_eq!(stats["capacity"], 1000);
    assert!((stats["hit_rate"].as_f64().unwrap() - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats["per_entry"][0]["access_count"], 2);
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let (status, json) = send(&app, empty_request("GET", "/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}
