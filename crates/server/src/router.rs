//! Ingress routes: the JSON-RPC endpoint, liveness, and metrics exposition.

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

use solstice_core::{
    proxy::DispatchError,
    types::{JsonRpcRequest, JsonRpcResponse},
};

use crate::{admin, AppState};

/// Maximum accepted request body, in bytes.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Assembles the full application router with cross-cutting layers.
pub fn build_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/api/v1/status", get(admin::handle_status))
        .route("/api/v1/chaos/trip", post(admin::handle_chaos_trip))
        .route("/api/v1/chaos/reset", post(admin::handle_chaos_reset))
        .route("/api/v1/test-rpc", post(admin::handle_test_rpc))
        .layer(middleware::from_fn(log_requests))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// One structured log line per HTTP request.
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "http request"
    );
    response
}

fn rpc_error(status: StatusCode, code: i32, message: String, id: Value) -> Response {
    let body = JsonRpcResponse::error(code, message, Arc::new(id));
    (status, Json(body)).into_response()
}

/// Handles a JSON-RPC request.
///
/// The body is parsed by hand rather than through the `Json` extractor so
/// malformed payloads produce a JSON-RPC error envelope (`-32700`) instead of
/// the framework's plain-text rejection.
pub async fn handle_rpc(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                -32700,
                format!("Parse error: {e}"),
                Value::Null,
            );
        }
    };

    // Keep the id for error envelopes even if the rest of the shape is wrong.
    let id = payload.get("id").cloned().unwrap_or(Value::Null);

    let request: JsonRpcRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(e) => {
            return rpc_error(StatusCode::BAD_REQUEST, -32600, format!("Invalid Request: {e}"), id);
        }
    };

    match state.engine.dispatch(request).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome.response)).into_response(),
        Err(e) => {
            let status = match e {
                DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
                DispatchError::NoProviders | DispatchError::Exhausted { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let message = match e {
                DispatchError::Validation(ref v) => v.to_string(),
                ref other => format!("Internal error: {other}"),
            };
            rpc_error(status, e.jsonrpc_code(), message, id)
        }
    }
}

/// Liveness endpoint for load balancers and the dashboard.
pub async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "providers": state.engine.pool().len(),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
    .into_response()
}

/// Prometheus text exposition.
pub async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics_handle.render(),
    )
        .into_response()
}
