//! In-process mock providers and a harness builder for driving the dispatch
//! engine without a network.

use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use solstice_core::{
    cache::{CachePolicy, ResponseCache},
    proxy::{DispatchEngine, RetrySettings},
    store::{MemoryStore, StateStore},
    types::{JsonRpcRequest, JsonRpcResponse},
    upstream::{
        BreakerRegistry, BreakerSettings, ProviderPool, RpcProvider, SelectionStrategy,
        UpstreamError,
    },
};

/// Scripted outcome for every call to a [`MockProvider`].
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Reply with this JSON result.
    Success(Value),
    /// Fail with HTTP 500 at the transport layer.
    TransportFail,
    /// Reply with a well-formed JSON-RPC error (an application-level error).
    RpcError(i32, String),
}

/// Deterministic provider whose behavior is fixed at construction and whose
/// call count is observable.
pub struct MockProvider {
    name: Arc<str>,
    cost: f64,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockProvider {
    #[must_use]
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name),
            cost: 0.000_01,
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    /// Number of forward calls observed so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        "http://mock.invalid"
    }

    fn cost_per_request(&self) -> f64 {
        self.cost
    }

    async fn forward(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Success(result) => {
                Ok(JsonRpcResponse::success(result.clone(), Arc::clone(&request.id)))
            }
            Behavior::TransportFail => {
                Err(UpstreamError::HttpError(500, "mock transport failure".into()))
            }
            Behavior::RpcError(code, message) => {
                Ok(JsonRpcResponse::error(*code, message.clone(), Arc::clone(&request.id)))
            }
        }
    }
}

/// Fully wired dispatch stack over an in-memory store.
pub struct Harness {
    pub engine: Arc<DispatchEngine>,
    pub store: Arc<MemoryStore>,
    pub breakers: Arc<BreakerRegistry>,
    pub providers: Vec<Arc<MockProvider>>,
}

/// Builder so individual tests only override what they care about.
pub struct HarnessBuilder {
    providers: Vec<Arc<MockProvider>>,
    retry: RetrySettings,
    breaker: BreakerSettings,
    cache_methods: HashMap<String, Duration>,
}

impl HarnessBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            retry: RetrySettings { max_retries: 3, initial_backoff: Duration::from_millis(1) },
            breaker: BreakerSettings::default(),
            cache_methods: HashMap::new(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<MockProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn breaker(mut self, breaker: BreakerSettings) -> Self {
        self.breaker = breaker;
        self
    }

    #[must_use]
    pub fn cache_method(mut self, method: &str, ttl: Duration) -> Self {
        self.cache_methods.insert(method.to_string(), ttl);
        self
    }

    #[must_use]
    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn StateStore> = store.clone();

        let breakers = Arc::new(BreakerRegistry::new(
            self.providers.iter().map(|p| Arc::from(p.name())),
            self.breaker,
        ));

        let dyn_providers: Vec<Arc<dyn RpcProvider>> =
            self.providers.iter().map(|p| Arc::clone(p) as Arc<dyn RpcProvider>).collect();

        let pool = Arc::new(ProviderPool::new(
            dyn_providers,
            Arc::clone(&shared),
            Arc::clone(&breakers),
            SelectionStrategy::LeastLatency,
        ));

        let cache = Arc::new(ResponseCache::new(
            shared,
            CachePolicy { enabled: !self.cache_methods.is_empty(), method_ttls: self.cache_methods },
        ));

        let engine =
            Arc::new(DispatchEngine::new(pool, Arc::clone(&breakers), cache, self.retry));

        Harness { engine, store, breakers, providers: self.providers }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Primes a latency sample the way the engine would after a dispatch.
    pub async fn prime_latency(&self, name: &str, ms: u64) {
        self.store
            .set(&format!("latency:{name}"), ms.to_string().into_bytes(), Duration::from_secs(600))
            .await
            .expect("memory store set cannot fail");
    }

    /// Primes a health snapshot the way the prober would.
    pub async fn prime_health(&self, name: &str, healthy: bool) {
        let snapshot = if healthy {
            solstice_core::types::HealthSnapshot::healthy(10)
        } else {
            solstice_core::types::HealthSnapshot::unhealthy(10, "probe failed")
        };
        self.store
            .set(
                &format!("health:{name}"),
                serde_json::to_vec(&snapshot).expect("snapshot encodes"),
                Duration::from_secs(30),
            )
            .await
            .expect("memory store set cannot fail");
    }
}

/// A standard request used throughout the suite.
#[must_use]
pub fn rpc_request(method: &str, id: i64) -> JsonRpcRequest {
    JsonRpcRequest::new(method, None, Value::from(id))
}
