//! # Solstice Core
//!
//! Core library for Solstice, a health-aware load-balancing proxy that fronts
//! several upstream Solana JSON-RPC providers behind a single endpoint.
//!
//! The dispatch path composes five subsystems over one shared TTL store:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       DispatchEngine                       │
//! │   cache lookup → pool selection → breaker-gated forward    │
//! │        → retry across providers → latency feedback         │
//! └──────┬──────────────┬───────────────┬──────────────┬───────┘
//!        │              │               │              │
//!  ┌─────▼─────┐  ┌─────▼──────┐  ┌─────▼─────┐  ┌─────▼──────┐
//!  │ Response  │  │  Provider  │  │  Breaker  │  │  Provider  │
//!  │  Cache    │  │   Pool     │  │ Registry  │  │  adapters  │
//!  └─────┬─────┘  └─────┬──────┘  └───────────┘  └────────────┘
//!        │              │  reads health + latency
//!  ┌─────▼──────────────▼─────┐       ┌──────────────────────┐
//!  │     Shared State Store   │◄──────┤    HealthMonitor     │
//!  │  (TTL map / kv server)   │ writes│  (background prober) │
//!  └──────────────────────────┘       └──────────────────────┘
//! ```
//!
//! - [`proxy`]: the dispatch engine — cache, selection, breaker-gated
//!   forwarding, cross-provider retry with exponential backoff.
//! - [`upstream`]: provider adapters, the shared HTTP transport, circuit
//!   breakers, and the health-aware least-latency pool.
//! - [`health`]: the background prober whose verdicts feed selection.
//! - [`cache`]: the fingerprint-keyed response cache for idempotent methods.
//! - [`store`]: the TTL-keyed shared state store abstraction.
//! - [`config`]: layered YAML configuration with env expansion.
//! - [`metrics`]: Prometheus counters, histograms, and gauges.

pub mod cache;
pub mod config;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod store;
pub mod types;
pub mod upstream;
