//! Core type definitions for JSON-RPC and provider state.
//!
//! # Type Categories
//!
//! ## JSON-RPC Protocol Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: Protocol conformance
//!
//! ## Provider Types
//! - [`ProviderConfig`]: Immutable descriptor created at startup from configuration
//! - [`HealthSnapshot`]: Prober verdict persisted to the shared state store
//!
//! # Performance Notes
//!
//! - `jsonrpc`: Uses `Cow<'static, str>` to avoid allocation when constructing with the
//!   static version string "2.0". Use `JSONRPC_VERSION_COW` for zero-cost construction.
//! - `id`: Uses `Arc<serde_json::Value>` to enable cheap cloning when the request ID
//!   needs to be copied to responses (error responses, cache rewrites).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::Arc};

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for JSON-RPC version - zero allocation for static usage.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// JSON-RPC 2.0 request structure.
///
/// Represents an incoming RPC request conforming to the JSON-RPC 2.0 specification.
/// The proxy treats `method` and `params` as opaque: no Solana-specific interpretation
/// happens anywhere in the dispatch path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Missing ids deserialize as JSON null, mirroring upstream behavior.
    #[serde(default)]
    pub id: Arc<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with zero allocation for the version string.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        params: Option<serde_json::Value>,
        id: serde_json::Value,
    ) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, method: method.into(), params, id: Arc::new(id) }
    }
}

/// JSON-RPC 2.0 response structure.
///
/// A response carries either a `result` (success) or an `error` (failure), never both.
/// Responses with a populated `error` field are still well-formed upstream replies;
/// the dispatch engine forwards them to the client without retrying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Arc<serde_json::Value>,
}

impl JsonRpcResponse {
    /// Creates a successful JSON-RPC response.
    #[must_use]
    pub fn success(result: serde_json::Value, id: Arc<serde_json::Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: Some(result), error: None, id }
    }

    /// Creates an error JSON-RPC response.
    #[must_use]
    pub fn error(code: i32, message: String, id: Arc<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
///
/// Standard error codes follow the JSON-RPC 2.0 convention:
///
/// - `-32700`: Parse error (invalid JSON)
/// - `-32600`: Invalid request (malformed JSON-RPC)
/// - `-32601`: Method not found
/// - `-32602`: Invalid params
/// - `-32603`: Internal error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Immutable descriptor for one upstream RPC provider.
///
/// Created at startup from configuration; `name` is unique within the pool and is
/// the key under which health snapshots, latency samples, and breaker state are
/// tracked.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: Arc<str>,
    pub url: String,
    /// Reserved for operator-side ordering in dashboards; selection is latency-driven.
    pub priority: u32,
    /// Unit cost in USD, accumulated into the per-provider cost counter.
    pub cost_per_request: f64,
}

/// Health verdict for one provider, produced by the background prober.
///
/// Persisted to the shared state store under `health:<name>` with a TTL of six
/// probe intervals, so a stalled prober fails open rather than pinning stale
/// verdicts forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub last_check: DateTime<Utc>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthSnapshot {
    /// Snapshot for a successful probe.
    #[must_use]
    pub fn healthy(latency_ms: u64) -> Self {
        Self { healthy: true, last_check: Utc::now(), latency_ms, error: None }
    }

    /// Snapshot for a failed probe with the observed error message.
    #[must_use]
    pub fn unhealthy(latency_ms: u64, error: impl Into<String>) -> Self {
        Self { healthy: false, last_check: Utc::now(), latency_ms, error: Some(error.into()) }
    }
}
