//! Content-addressed response cache for idempotent RPC methods.
//!
//! Cache identity is the request fingerprint: the method name plus the first
//! eight bytes of a SHA-256 over the *canonicalized* params. Canonicalization
//! recursively sorts object keys, so two requests that differ only in JSON
//! field order share one cache entry.
//!
//! Cache failures are never fatal: a lookup error is a miss, a store error is
//! logged and dropped.

use sha2::{Digest, Sha256};
use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::{
    store::{StateStore, CACHE_KEY_PREFIX},
    types::{JsonRpcRequest, JsonRpcResponse},
};

/// Per-method cache policy: which methods are cacheable and for how long.
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    pub enabled: bool,
    /// Method name -> TTL. Methods absent from the table are never cached.
    pub method_ttls: HashMap<String, Duration>,
}

/// Response cache layered over the shared state store.
pub struct ResponseCache {
    store: Arc<dyn StateStore>,
    policy: CachePolicy,
}

impl ResponseCache {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, policy: CachePolicy) -> Self {
        Self { store, policy }
    }

    fn ttl_for(&self, method: &str) -> Option<Duration> {
        if !self.policy.enabled {
            return None;
        }
        self.policy.method_ttls.get(method).copied().filter(|ttl| !ttl.is_zero())
    }

    /// Computes the cache key for a request.
    ///
    /// `rpc:cache:<method>:<hex of sha256(canonical params)[..8]>`. Collisions
    /// are tolerated only within this namespace.
    #[must_use]
    pub fn cache_key(request: &JsonRpcRequest) -> String {
        let params = request.params.clone().unwrap_or(serde_json::Value::Null);
        let mut canonical = Vec::new();
        write_canonical_json(&params, &mut canonical);

        let digest = Sha256::digest(&canonical);
        format!("{CACHE_KEY_PREFIX}{}:{}", request.method, hex::encode(&digest[..8]))
    }

    /// Looks up a cached response for the request.
    ///
    /// Returns `None` when caching is disabled, the method is not cacheable,
    /// the entry is missing or expired, or the store misbehaves. A hit has its
    /// `id` rewritten to echo the incoming request.
    pub async fn lookup(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        self.ttl_for(&request.method)?;

        let key = Self::cache_key(request);
        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(method = %request.method, error = %e, "cache lookup failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<JsonRpcResponse>(&bytes) {
            Ok(mut response) => {
                response.id = Arc::clone(&request.id);
                Some(response)
            }
            Err(e) => {
                tracing::warn!(method = %request.method, error = %e, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    /// Stores a response if the method is cacheable.
    ///
    /// Responses carrying an `error` field are never cached: only successful
    /// results are worth replaying.
    pub async fn store(&self, request: &JsonRpcRequest, response: &JsonRpcResponse) {
        let Some(ttl) = self.ttl_for(&request.method) else {
            return;
        };
        if response.error.is_some() {
            return;
        }

        let bytes = match serde_json::to_vec(response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(method = %request.method, error = %e, "failed to encode response for cache");
                return;
            }
        };

        let key = Self::cache_key(request);
        if let Err(e) = self.store.set(&key, bytes, ttl).await {
            tracing::warn!(method = %request.method, error = %e, "cache store failed");
        }
    }
}

/// Serializes a JSON value with object keys in sorted order, recursively.
///
/// Arrays keep their order: JSON-RPC params are positional.
fn write_canonical_json(value: &serde_json::Value, out: &mut Vec<u8>) {
    match value {
        serde_json::Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(
                    serde_json::to_string(key).unwrap_or_default().as_bytes(),
                );
                out.push(b':');
                write_canonical_json(&map[*key], out);
            }
            out.push(b'}');
        }
        serde_json::Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical_json(item, out);
            }
            out.push(b']');
        }
        other => {
            out.extend_from_slice(serde_json::to_string(other).unwrap_or_default().as_bytes());
        }
    }
}
