//! Shared state store: TTL-keyed ephemeral storage for health snapshots,
//! latency samples, and cached responses.
//!
//! The contract is deliberately tiny — `get`, `set` with a TTL, `ping` — so a
//! remote key-value server can stand in for the in-process map in a
//! horizontally-scaled deployment. Every caller must tolerate store
//! unavailability: a failed health read means "unknown" (fail-open), a failed
//! latency read means "no sample", and write failures are logged and dropped.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Key prefix for health snapshots.
pub const HEALTH_KEY_PREFIX: &str = "health:";
/// Key prefix for latency samples.
pub const LATENCY_KEY_PREFIX: &str = "latency:";
/// Key prefix for cached RPC responses.
pub const CACHE_KEY_PREFIX: &str = "rpc:cache:";

/// Errors surfaced by a state store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// TTL-keyed byte store shared by the prober, the pool, and the cache.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads a key. `Ok(None)` means missing or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a key with a time-to-live. `ttl` must be non-zero.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Liveness check for the backend.
    async fn ping(&self) -> Result<(), StoreError>;
}
