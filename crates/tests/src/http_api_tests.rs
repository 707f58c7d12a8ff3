//! HTTP surface semantics: status codes, JSON-RPC error envelopes, the
//! operational API, and metrics exposition.

use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use server::{router::build_router, AppState};
use solstice_core::metrics;
use tower::ServiceExt;

use crate::mock_provider::{Behavior, Harness, HarnessBuilder, MockProvider};

fn app_for(harness: &Harness) -> Router {
    let state = Arc::new(AppState::new(Arc::clone(&harness.engine), metrics::install()));
    build_router(state, Duration::from_secs(10))
}

async fn post_rpc(app: &Router, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri("/")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().uri(uri).method("GET").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn malformed_json_yields_parse_error_envelope() {
    let harness =
        HarnessBuilder::new().provider(MockProvider::new("a", Behavior::Success(json!(1)))).build();
    let app = app_for(&harness);

    let (status, body) = post_rpc(&app, "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!(-32700));
    assert_eq!(body["jsonrpc"], json!("2.0"));
}

#[tokio::test]
async fn wrong_version_yields_invalid_request() {
    let harness =
        HarnessBuilder::new().provider(MockProvider::new("a", Behavior::Success(json!(1)))).build();
    let app = app_for(&harness);

    let (status, body) =
        post_rpc(&app, r#"{"jsonrpc":"1.0","method":"getSlot","id":5}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!(-32600));
    assert_eq!(body["id"], json!(5), "error envelope echoes the request id");
}

#[tokio::test]
async fn missing_method_yields_invalid_request() {
    let harness =
        HarnessBuilder::new().provider(MockProvider::new("a", Behavior::Success(json!(1)))).build();
    let app = app_for(&harness);

    let (status, body) = post_rpc(&app, r#"{"jsonrpc":"2.0","id":1}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!(-32600));

    let (status, body) = post_rpc(&app, r#"{"jsonrpc":"2.0","method":"","id":1}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!(-32600));
}

#[tokio::test]
async fn successful_dispatch_returns_result_with_id() {
    let harness = HarnessBuilder::new()
        .provider(MockProvider::new("a", Behavior::Success(json!("0xdeadbeef"))))
        .build();
    let app = app_for(&harness);

    let (status, body) =
        post_rpc(&app, r#"{"jsonrpc":"2.0","method":"getLatestBlockhash","id":9}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], json!("0xdeadbeef"));
    assert_eq!(body["id"], json!(9));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn exhaustion_yields_internal_error_with_last_transport_error() {
    let harness = HarnessBuilder::new()
        .provider(MockProvider::new("a", Behavior::TransportFail))
        .build();
    let app = app_for(&harness);

    let (status, body) = post_rpc(&app, r#"{"jsonrpc":"2.0","method":"getSlot","id":1}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], json!(-32603));
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("500"), "last transport error embedded: {message}");
}

#[tokio::test]
async fn upstream_rpc_error_passes_through_as_200() {
    let harness = HarnessBuilder::new()
        .provider(MockProvider::new("a", Behavior::RpcError(-32601, "Method not found".into())))
        .build();
    let app = app_for(&harness);

    let (status, body) = post_rpc(&app, r#"{"jsonrpc":"2.0","method":"nope","id":3}"#).await;

    assert_eq!(status, StatusCode::OK, "application errors are not transport errors");
    assert_eq!(body["error"]["code"], json!(-32601));
    assert_eq!(body["id"], json!(3));
}

#[tokio::test]
async fn health_endpoint_reports_provider_count() {
    let harness = HarnessBuilder::new()
        .provider(MockProvider::new("a", Behavior::Success(json!(1))))
        .provider(MockProvider::new("b", Behavior::Success(json!(1))))
        .build();
    let app = app_for(&harness);

    let (status, bytes) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["providers"], json!(2));
    assert!(body["timestamp"].is_i64());
}

#[tokio::test]
async fn status_endpoint_reports_per_provider_details() {
    let harness = HarnessBuilder::new()
        .provider(MockProvider::new("a", Behavior::Success(json!(1))))
        .provider(MockProvider::new("b", Behavior::Success(json!(1))))
        .build();
    harness.prime_health("a", true).await;
    harness.prime_latency("a", 120).await;
    let app = app_for(&harness);

    let (status, bytes) = get(&app, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 2);

    let a = providers.iter().find(|p| p["name"] == json!("a")).unwrap();
    assert_eq!(a["healthy"], json!(true));
    assert_eq!(a["latency_ms"], json!(120));
    assert_eq!(a["breaker_state"], json!("Closed"));
    assert!(a["cost_per_req"].is_number());

    // No snapshot written for "b": the status view reports it unhealthy,
    // unlike selection which fails open.
    let b = providers.iter().find(|p| p["name"] == json!("b")).unwrap();
    assert_eq!(b["healthy"], json!(false));
}

#[tokio::test]
async fn chaos_endpoints_set_and_clear_overrides() {
    let a = MockProvider::new("a", Behavior::Success(json!(1)));
    let b = MockProvider::new("b", Behavior::Success(json!(1)));
    let harness = HarnessBuilder::new().provider(a.clone()).provider(b.clone()).build();
    let app = app_for(&harness);

    // Missing provider parameter is a client error
    let request =
        Request::builder().uri("/api/v1/chaos/trip").method("POST").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .uri("/api/v1/chaos/trip?provider=a")
        .method("POST")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // With "a" forced open, dispatches land on "b"
    let (_, body) = post_rpc(&app, r#"{"jsonrpc":"2.0","method":"getSlot","id":1}"#).await;
    assert_eq!(body["result"], json!(1));
    assert_eq!(a.calls(), 0);

    // Status surfaces the override
    let (_, bytes) = get(&app, "/api/v1/status").await;
    let status_body: Value = serde_json::from_slice(&bytes).unwrap();
    let a_status = status_body["providers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == json!("a"))
        .unwrap()
        .clone();
    assert_eq!(a_status["breaker_state"], json!("ForcedOpen"));

    let request =
        Request::builder().uri("/api/v1/chaos/reset").method("POST").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!harness.breakers.is_forced_open("a"));
}

#[tokio::test]
async fn test_rpc_endpoint_dispatches_canned_request() {
    let harness = HarnessBuilder::new()
        .provider(MockProvider::new("a", Behavior::Success(json!(31_337))))
        .build();
    let app = app_for(&harness);

    let request =
        Request::builder().uri("/api/v1/test-rpc").method("POST").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["provider"], json!("a"));
    assert_eq!(body["response"]["result"], json!(31_337));
    assert!(body["latency"].is_u64());
}

#[tokio::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let harness = HarnessBuilder::new()
        .provider(MockProvider::new("a", Behavior::Success(json!(1))))
        .build();
    let app = app_for(&harness);

    // Drive one request so the counters exist
    let _ = post_rpc(&app, r#"{"jsonrpc":"2.0","method":"getSlot","id":1}"#).await;

    let (status, bytes) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("rpc_requests_total"), "metrics exposition: {text}");
}
