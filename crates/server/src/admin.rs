//! Operational API: per-provider status, chaos-drill overrides, and a
//! self-test dispatch.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};

use crate::AppState;

/// Per-provider status for the dashboard.
///
/// Health and latency come from the shared state store (what selection
/// actually sees), breaker state from the process-local registry.
pub async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    let pool = state.engine.pool();
    let breakers = state.engine.breakers();

    let mut labels: HashMap<String, String> = HashMap::new();
    for status in breakers.statuses().await {
        labels.insert(status.provider.to_string(), status.label());
    }

    let mut providers = Vec::with_capacity(pool.len());
    for provider in pool.providers() {
        let name = provider.name();
        let healthy = pool.health_of(name).await.is_some_and(|s| s.healthy);
        let latency_ms = pool.latency_of(name).await.unwrap_or(0);

        providers.push(json!({
            "name": name,
            "healthy": healthy,
            "latency_ms": latency_ms,
            "breaker_state": labels.get(name).cloned().unwrap_or_else(|| "Closed".to_string()),
            "cost_per_req": provider.cost_per_request(),
        }));
    }

    Json(json!({
        "providers": providers,
        "timestamp": chrono::Utc::now().timestamp(),
    }))
    .into_response()
}

/// Forces a provider open for a live fault-injection drill.
pub async fn handle_chaos_trip(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(provider) = params.get("provider").filter(|p| !p.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "provider name is required"})))
            .into_response();
    };

    state.engine.breakers().trip(provider);
    Json(json!({"status": "tripped", "provider": provider})).into_response()
}

/// Clears every operator override.
pub async fn handle_chaos_reset(State(state): State<Arc<AppState>>) -> Response {
    state.engine.breakers().reset_overrides();
    Json(json!({"status": "reset"})).into_response()
}

/// Synthesizes a `getSlot` request and dispatches it through the full engine,
/// reporting which provider served it and how long it took.
pub async fn handle_test_rpc(State(state): State<Arc<AppState>>) -> Response {
    let request = solstice_core::types::JsonRpcRequest::new(
        "getSlot",
        None,
        json!(chrono::Utc::now().timestamp()),
    );

    let start = std::time::Instant::now();
    match state.engine.dispatch(request).await {
        Ok(outcome) => Json(json!({
            "provider": outcome.provider.as_deref().unwrap_or("cache"),
            "latency": u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "response": outcome.response,
        }))
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()})))
            .into_response(),
    }
}
