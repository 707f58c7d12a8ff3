//! Solstice HTTP layer: ingress JSON-RPC endpoint, operational API, and
//! lifecycle plumbing around the core dispatch engine.

pub mod admin;
pub mod router;

use metrics_exporter_prometheus::PrometheusHandle;
use solstice_core::proxy::DispatchEngine;
use std::sync::Arc;

/// Shared state handed to every handler.
pub struct AppState {
    pub engine: Arc<DispatchEngine>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    #[must_use]
    pub fn new(engine: Arc<DispatchEngine>, metrics_handle: PrometheusHandle) -> Self {
        Self { engine, metrics_handle }
    }
}
