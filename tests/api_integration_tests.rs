//! Integration Tests for Admin API Endpoints
//!
//! Tests full request/response cycle for each endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use integration_gateway::{
    api::create_router,
    gateway::{DownstreamError, DownstreamInvoker, Gateway, InvokeOptions, TracingAuditSink},
    AppState, Config,
};
use serde_json::{json, Value};
use tower::ServiceExt;

// == Helper Functions ==

struct Echo;

#[async_trait]
impl DownstreamInvoker for Echo {
    async fn call(&self, _service: &str, _operation: &str, payload: &Value) -> Result<Value, DownstreamError> {
        Ok(payload.clone())
    }
}

fn create_gateway() -> Arc<Gateway> {
    let gateway = Gateway::from_config(&Config::default(), Arc::new(TracingAuditSink));
    gateway.register_service("court", Arc::new(Echo));
    gateway.register_service("payments", Arc::new(Echo));
    Arc::new(gateway)
}

fn create_test_app(gateway: &Arc<Gateway>) -> Router {
    create_router(AppState::new(gateway.clone()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
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

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["services"], json!(["court", "payments"]));
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn test_health_degraded_while_circuit_open() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    send(&app, "POST", "/breakers/court/open", None).await;
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["open_circuits"], json!(["court"]));
}

// == Breaker Endpoint Tests ==

#[tokio::test]
async fn test_breaker_lifecycle_over_http() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    let (status, json) = send(&app, "GET", "/breakers/court", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "CLOSED");
    assert_eq!(json["failure_count"], 0);

    let (status, json) = send(&app, "POST", "/breakers/court/open", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "OPEN");
    assert_eq!(json["forced"], true);

    // Gateway traffic is now rejected
    let err = gateway
        .invoke("court", "file", &json!({}), "user-1", InvokeOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        integration_gateway::GatewayError::CircuitOpen { .. }
    ));

    let (status, json) = send(&app, "POST", "/breakers/court/close", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "CLOSED");

    let (_, json) = send(&app, "POST", "/breakers/court/reset", None).await;
    assert_eq!(json["state"], "CLOSED");
    assert!(json["last_failure_at"].is_null());
}

#[tokio::test]
async fn test_list_breakers_sorted() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    send(&app, "POST", "/breakers/payments/open", None).await;
    send(&app, "POST", "/breakers/court/reset", None).await;

    let (status, json) = send(&app, "GET", "/breakers", None).await;
    assert_eq!(status, StatusCode::OK);
    let services: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["service"].as_str().unwrap())
        .collect();
    assert_eq!(services, vec!["court", "payments"]);
}

#[tokio::test]
async fn test_unknown_breaker_returns_404() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    let (status, json) = send(&app, "GET", "/breakers/nowhere", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("nowhere"));
}

// == Rate Limit Endpoint Tests ==

#[tokio::test]
async fn test_rate_limit_status_and_reset() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    for _ in 0..3 {
        gateway
            .invoke("court", "docket", &json!({}), "user-1", InvokeOptions::default())
            .await
            .unwrap();
    }

    let (status, json) = send(&app, "GET", "/rate-limits/user-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["identity"], "user-1");
    assert_eq!(json["windows"][0]["service"], "court");
    assert_eq!(json["windows"][0]["count"], 3);

    let (status, json) = send(&app, "DELETE", "/rate-limits/user-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cleared"], 1);

    let (_, json) = send(&app, "GET", "/rate-limits/user-1", None).await;
    assert_eq!(json["windows"], json!([]));
}

#[tokio::test]
async fn test_reset_all_rate_limits() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    for identity in ["a", "b"] {
        gateway
            .invoke("payments", "charge", &json!({}), identity, InvokeOptions::default())
            .await
            .unwrap();
    }

    let (status, json) = send(&app, "DELETE", "/rate-limits", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cleared"], 2);
    assert!(gateway.limiter().is_empty());
}

// == Cache Endpoint Tests ==

#[tokio::test]
async fn test_cache_stats_reflect_gateway_traffic() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    let payload = json!({"query": "due process"});
    for _ in 0..3 {
        gateway
            .invoke("court", "search", &payload, "user-1", InvokeOptions::cached(60))
            .await
            .unwrap();
    }

    let (status, json) = send(&app, "GET", "/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_entries"], 1);
    assert_eq!(json["hits"], 2);
    assert_eq!(json["misses"], 1);
}

#[tokio::test]
async fn test_cache_export_import_round_trip() {
    let source = create_gateway();
    let source_app = create_test_app(&source);
    source
        .invoke("court", "lookup", &json!({"case": 1}), "u", InvokeOptions::cached(600))
        .await
        .unwrap();
    source
        .invoke("court", "lookup", &json!({"case": 2}), "u", InvokeOptions::cached(-1))
        .await
        .unwrap();

    let (status, exported) = send(&source_app, "GET", "/cache/export", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(exported["count"], 2);

    let target = create_gateway();
    let target_app = create_test_app(&target);
    let (status, json) = send(&target_app, "POST", "/cache/import", Some(exported.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["imported"], 2);

    let (_, reexported) = send(&target_app, "GET", "/cache/export", None).await;
    let keys = |v: &Value| -> Vec<String> {
        v["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["key"].as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(keys(&exported), keys(&reexported));
}

#[tokio::test]
async fn test_cache_import_skips_expired_entries() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    let body = json!({"entries": [{"key": "k", "value": 1, "ttl_seconds": -5}]});
    let (status, json) = send(&app, "POST", "/cache/import", Some(body)).await;

    // Already-expired snapshot entries are skipped rather than rejected
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["imported"], 0);
}

#[tokio::test]
async fn test_cache_import_rejects_empty_key() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    let body = json!({"entries": [{"key": "", "value": 1, "ttl_seconds": 60}]});
    let (status, json) = send(&app, "POST", "/cache/import", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_cache_import_is_all_or_nothing() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    let oversized = "x".repeat(integration_gateway::cache::MAX_VALUE_SIZE + 1);
    let body = json!({"entries": [
        {"key": "a", "value": 1, "ttl_seconds": 60},
        {"key": "b", "value": oversized, "ttl_seconds": 60},
    ]});
    let (status, _) = send(&app, "POST", "/cache/import", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, exported) = send(&app, "GET", "/cache/export", None).await;
    assert_eq!(exported["count"], 0);
}

#[tokio::test]
async fn test_clear_cache_is_idempotent() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);
    gateway
        .invoke("court", "lookup", &json!({}), "u", InvokeOptions::cached(60))
        .await
        .unwrap();

    let (status, json) = send(&app, "DELETE", "/cache", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cleared"], 1);

    let (status, json) = send(&app, "DELETE", "/cache", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cleared"], 0);

    let (_, stats) = send(&app, "GET", "/cache/stats", None).await;
    assert_eq!(stats["total_entries"], 0);
    assert_eq!(stats["hits"], 0);
}

// == Error Handling Tests ==

#[tokio::test]
async fn test_invalid_json_body() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cache/import")
                .header("content-type", "application/json")
                .body(Body::from("not valid json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_route() {
    let gateway = create_gateway();
    let app = create_test_app(&gateway);

    let (status, _) = send(&app, "GET", "/get/anything", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
