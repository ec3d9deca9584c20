//! Integration Tests for API Endpoints
//!
//! Full request/response cycles through the router, one shared app per test.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use threatcore::cache::MemoryCache;
use threatcore::config::CacheTtls;
use threatcore::{create_router, AppState};
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app() -> Router {
    let state = AppState::new(Arc::new(MemoryCache::new(1000)), CacheTtls::default());
    create_router(state)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_as(app, method, uri, body, None).await
}

async fn send_as(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    user: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user", user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

// == Metadata Lifecycle ==

#[tokio::test]
async fn test_metadata_create_list_conflict() {
    let app = create_test_app();
    let base = "/entities/threat/T1/metadata";

    let (status, _) = send(&app, "POST", base, Some(json!({"key": "severity", "value": "high"}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send(&app, "GET", base, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([{"key": "severity", "value": "high"}]));

    let (status, json) = send(&app, "POST", base, Some(json!({"key": "severity", "value": "low"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].is_string());

    let (_, json) = send(&app, "GET", &format!("{base}/severity"), None).await;
    assert_eq!(json["value"], "high");
}

#[tokio::test]
async fn test_metadata_update_and_delete() {
    let app = create_test_app();
    let base = "/entities/diagram/D1/metadata";

    let (status, _) = send(&app, "PUT", &format!("{base}/layer"), Some(json!({"value": "x"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, "POST", base, Some(json!({"key": "layer", "value": "dmz"}))).await;
    let (status, json) = send(&app, "PUT", &format!("{base}/layer"), Some(json!({"value": "core"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], "core");

    let (status, _) = send(&app, "DELETE", &format!("{base}/layer"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "DELETE", &format!("{base}/layer"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metadata_invalid_key_is_bad_request() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        "POST",
        "/entities/note/N1/metadata",
        Some(json!({"key": "has space", "value": "v"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("has space"));
}

// == Bulk Metadata ==

#[tokio::test]
async fn test_bulk_create_is_all_or_nothing() {
    let app = create_test_app();
    let base = "/entities/asset/A1/metadata";
    send(&app, "POST", base, Some(json!({"key": "owner", "value": "ops"}))).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("{base}/bulk"),
        Some(json!([
            {"key": "tier", "value": "1"},
            {"key": "owner", "value": "sec"}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = send(&app, "GET", base, None).await;
    assert_eq!(json, json!([{"key": "owner", "value": "ops"}]));
}

#[tokio::test]
async fn test_bulk_update_and_delete() {
    let app = create_test_app();
    let base = "/entities/document/DOC1/metadata";

    let (status, json) = send(
        &app,
        "PUT",
        &format!("{base}/bulk"),
        Some(json!([
            {"key": "a", "value": "1"},
            {"key": "b", "value": "2"}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (status, json) = send(
        &app,
        "DELETE",
        &format!("{base}/bulk"),
        Some(json!({"keys": ["a", "missing"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);

    let (_, json) = send(&app, "GET", base, None).await;
    assert_eq!(json, json!([{"key": "b", "value": "2"}]));
}

#[tokio::test]
async fn test_bulk_over_limit_is_bad_request() {
    let app = create_test_app();
    let entries: Vec<Value> = (0..21)
        .map(|i| json!({"key": format!("k{i}"), "value": "v"}))
        .collect();

    let (status, _) = send(
        &app,
        "POST",
        "/entities/threat/T9/metadata/bulk",
        Some(Value::Array(entries)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metadata_by_key_across_entities() {
    let app = create_test_app();
    send(&app, "POST", "/entities/threat/T1/metadata", Some(json!({"key": "cwe", "value": "79"}))).await;
    send(&app, "POST", "/entities/threat/T2/metadata", Some(json!({"key": "cwe", "value": "89"}))).await;

    let (status, json) = send(&app, "GET", "/metadata/keys/cwe", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);
}

// == Threat Models ==

async fn create_model(app: &Router, owner: &str) -> Value {
    let (status, json) = send_as(
        app,
        "POST",
        "/threat_models",
        Some(json!({"name": "Payments"})),
        Some(owner),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json
}

#[tokio::test]
async fn test_threat_model_create_and_get() {
    let app = create_test_app();
    let created = create_model(&app, "alice").await;
    let id = created["id"].as_str().unwrap();

    let (status, json) = send(&app, "GET", &format!("/threat_models/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["owner"], "alice");

    let (status, _) = send(&app, "GET", "/threat_models/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_owner_grants_access_then_writer_patches() {
    let app = create_test_app();
    let created = create_model(&app, "alice").await;
    let uri = format!("/threat_models/{}", created["id"].as_str().unwrap());

    // warm the cache before changing permissions
    send(&app, "GET", &uri, None).await;

    let (status, _) = send_as(
        &app,
        "PATCH",
        &uri,
        Some(json!([{"op": "add", "path": "/authorization/-", "value": {"principal": "bob", "role": "writer"}}])),
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send_as(
        &app,
        "PATCH",
        &uri,
        Some(json!([{"op": "replace", "path": "/description", "value": "card flows"}])),
        Some("bob"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["description"], "card flows");

    let (_, json) = send(&app, "GET", &uri, None).await;
    assert_eq!(json["description"], "card flows");
    assert_eq!(json["authorization"][0]["principal"], "bob");
}

#[tokio::test]
async fn test_writer_cannot_change_owner() {
    let app = create_test_app();
    let created = create_model(&app, "alice").await;
    let uri = format!("/threat_models/{}", created["id"].as_str().unwrap());
    send_as(
        &app,
        "PATCH",
        &uri,
        Some(json!([{"op": "add", "path": "/authorization/-", "value": {"principal": "bob", "role": "writer"}}])),
        Some("alice"),
    )
    .await;

    let (status, json) = send_as(
        &app,
        "PATCH",
        &uri,
        Some(json!([{"op": "replace", "path": "/owner", "value": "bob"}])),
        Some("bob"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(json["error"].is_string());

    let (_, json) = send(&app, "GET", &uri, None).await;
    assert_eq!(json["owner"], "alice");
}

#[tokio::test]
async fn test_reader_cannot_patch() {
    let app = create_test_app();
    let created = create_model(&app, "alice").await;
    let uri = format!("/threat_models/{}", created["id"].as_str().unwrap());
    let (status, _) = send_as(
        &app,
        "PATCH",
        &uri,
        Some(json!([{"op": "add", "path": "/authorization/-", "value": {"principal": "rita", "role": "reader"}}])),
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // warm the cache so a stale read would also show up
    send(&app, "GET", &uri, None).await;

    let (status, json) = send_as(
        &app,
        "PATCH",
        &uri,
        Some(json!([{"op": "replace", "path": "/name", "value": "Renamed"}])),
        Some("rita"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(json["error"].is_string());

    let (_, json) = send(&app, "GET", &uri, None).await;
    assert_eq!(json["name"], "Payments");
    assert_eq!(json["authorization"][0]["role"], "reader");
}

#[tokio::test]
async fn test_patch_errors_map_to_bad_request() {
    let app = create_test_app();
    let created = create_model(&app, "alice").await;
    let uri = format!("/threat_models/{}", created["id"].as_str().unwrap());

    let (status, _) = send_as(
        &app,
        "PATCH",
        &uri,
        Some(json!([{"op": "move", "path": "/name", "value": "x"}])),
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_as(
        &app,
        "PATCH",
        &uri,
        Some(json!([{"op": "replace", "path": "/name", "value": 42}])),
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_as(
        &app,
        "PATCH",
        &uri,
        Some(json!([{"op": "test", "path": "/name", "value": "Other"}])),
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_without_user_is_forbidden() {
    let app = create_test_app();
    let created = create_model(&app, "alice").await;
    let uri = format!("/threat_models/{}", created["id"].as_str().unwrap());

    let (status, _) = send(
        &app,
        "PATCH",
        &uri,
        Some(json!([{"op": "replace", "path": "/name", "value": "x"}])),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// == Cache Endpoints ==

#[tokio::test]
async fn test_cache_patterns_endpoint() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        "GET",
        "/cache/patterns?entity_type=note&entity_id=N1&parent_type=threat_model&parent_id=TM1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let patterns: Vec<&str> = json["patterns"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(patterns.contains(&"cache:threat_model:TM1"));
    assert!(patterns.contains(&"cache:auth:TM1"));
    assert!(patterns.contains(&"cache:list:notes:TM1:*"));
}

#[tokio::test]
async fn test_cache_stats_report_hits() {
    let app = create_test_app();
    let created = create_model(&app, "alice").await;
    let uri = format!("/threat_models/{}", created["id"].as_str().unwrap());
    send(&app, "GET", &uri, None).await;

    let (status, json) = send(&app, "GET", "/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["backend"]["hits"].as_u64().unwrap() >= 1);
    assert!(json["metrics"]["total_hits"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["cache"], "ok");
}
