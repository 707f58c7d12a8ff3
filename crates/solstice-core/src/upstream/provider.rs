//! Provider adapter: the only polymorphic boundary in the dispatch path.
//!
//! A provider exposes a small capability set (`name`, `url`, `cost_per_request`,
//! `forward`, `probe`). The production implementation is [`HttpProvider`];
//! variants for specific vendors differ only in name, so one adapter covers
//! them all. Tests implement the trait directly to drive the engine without a
//! network.

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

use crate::{
    types::{HealthSnapshot, JsonRpcRequest, JsonRpcResponse, ProviderConfig},
    upstream::{errors::UpstreamError, http_client::HttpClient},
};

/// Hard timeout on a forwarded request.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Lightweight liveness method used by the default probe.
const PROBE_METHOD: &str = "getHealth";

/// Capability set of one upstream JSON-RPC endpoint.
///
/// Implementations are stateless apart from a pooled HTTP transport; all
/// routing state (health, latency, breaker) lives outside the adapter.
#[async_trait]
pub trait RpcProvider: Send + Sync {
    /// Unique provider name within the pool.
    fn name(&self) -> &str;

    /// Upstream endpoint URL.
    fn url(&self) -> &str;

    /// Unit cost in USD charged per forwarded request.
    fn cost_per_request(&self) -> f64;

    /// Forwards a JSON-RPC request to the upstream and returns its reply.
    ///
    /// Replies that carry an `error` field are returned as `Ok`: they are
    /// well-formed responses, not transport failures.
    ///
    /// # Errors
    ///
    /// Returns an [`UpstreamError`] for serialization, network, timeout,
    /// non-2xx, or body-parse failures.
    async fn forward(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, UpstreamError>;

    /// Probes the upstream with a liveness call and measures wall-clock latency.
    ///
    /// The default probe issues `getHealth` through [`forward`](Self::forward):
    /// a transport failure or a reply with `error` set yields an unhealthy
    /// snapshot carrying the message, anything else a healthy one.
    async fn probe(&self) -> HealthSnapshot {
        let request = JsonRpcRequest::new(PROBE_METHOD, None, serde_json::Value::from(1));
        let start = std::time::Instant::now();
        let outcome = self.forward(&request).await;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(response) => match response.error {
                Some(error) => HealthSnapshot::unhealthy(latency_ms, error.message),
                None => HealthSnapshot::healthy(latency_ms),
            },
            Err(e) => HealthSnapshot::unhealthy(latency_ms, e.to_string()),
        }
    }
}

/// Production provider adapter: serialize, POST, parse.
pub struct HttpProvider {
    config: ProviderConfig,
    http: Arc<HttpClient>,
}

impl HttpProvider {
    #[must_use]
    pub fn new(config: ProviderConfig, http: Arc<HttpClient>) -> Self {
        Self { config, http }
    }

    /// Returns the full provider descriptor.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[async_trait]
impl RpcProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn url(&self) -> &str {
        &self.config.url
    }

    fn cost_per_request(&self) -> f64 {
        self.config.cost_per_request
    }

    async fn forward(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, UpstreamError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| UpstreamError::InvalidRequest(format!("failed to serialize request: {e}")))?;

        let response_bytes = self
            .http
            .post_json(&self.config.url, bytes::Bytes::from(body), FORWARD_TIMEOUT)
            .await?;

        serde_json::from_slice(&response_bytes)
            .map_err(|e| UpstreamError::InvalidResponse(format!("invalid JSON: {e}")))
    }
}
