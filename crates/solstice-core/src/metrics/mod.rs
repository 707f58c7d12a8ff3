//! Prometheus metrics.
//!
//! Uses the `metrics` facade with the Prometheus exporter. Counters and
//! histograms are recorded on the hot path with atomic operations; the
//! rendered text exposition is served by the HTTP layer from the installed
//! [`PrometheusHandle`].

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::upstream::circuit_breaker::CircuitBreakerState;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder once per process and returns its handle.
///
/// Subsequent calls return the already-installed handle, which keeps test
/// binaries (where many independent components initialize metrics) working.
pub fn install() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("prometheus recorder can only be installed once per process")
        })
        .clone()
}

/// Returns the installed handle, if any.
pub fn handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Records one dispatched request.
pub fn record_request(provider: &str, method: &str, success: bool) {
    counter!(
        "rpc_requests_total",
        "provider" => provider.to_string(),
        "method" => method.to_string(),
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Records end-to-end request latency against the serving provider.
pub fn record_request_duration(provider: &str, seconds: f64) {
    histogram!("rpc_request_duration_seconds", "provider" => provider.to_string())
        .record(seconds);
}

/// Records a prober verdict.
pub fn record_provider_health(provider: &str, healthy: bool) {
    gauge!("rpc_provider_health_status", "provider" => provider.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

/// Accumulates the unit cost of a forwarded request.
///
/// Exposed as a monotonically increasing gauge: the `metrics` facade's
/// counters are integral, and cost is fractional USD.
pub fn record_cost(provider: &str, cost_usd: f64) {
    if cost_usd > 0.0 {
        gauge!("rpc_total_cost_usd", "provider" => provider.to_string()).increment(cost_usd);
    }
}

/// Records a cache hit for a method.
pub fn record_cache_hit(method: &str) {
    counter!("rpc_cache_hits_total", "method" => method.to_string()).increment(1);
}

/// Records the current breaker state for a provider.
pub fn record_breaker_state(provider: &str, state: CircuitBreakerState) {
    let value = match state {
        CircuitBreakerState::Closed => 0.0,
        CircuitBreakerState::HalfOpen => 0.5,
        CircuitBreakerState::Open => 1.0,
    };
    gauge!("rpc_breaker_state", "provider" => provider.to_string()).set(value);
}
