//! The dispatch engine: cache lookup, provider selection, breaker-gated
//! forwarding, cross-provider retry with exponential backoff, and latency
//! feedback.
//!
//! Invariants upheld here:
//!
//! - a provider is attempted at most once per request (retries cross
//!   providers, never repeat one);
//! - total attempts never exceed the retry budget; a breaker fast-fail
//!   (the circuit opened between selection and execution) counts as a
//!   transport failure, consuming an attempt and its backoff;
//! - backoff doubles between attempts and is skipped only for candidates
//!   rejected by an operator override, which also costs no attempt;
//! - upstream replies with a populated `error` field are successes at this
//!   layer and are never retried;
//! - after every success the measured latency is written back as the
//!   provider's sample, feeding the next selection.
//!
//! Cancellation is inherited from the async model: the caller drops or
//! deadlines the `dispatch` future, and every await point inside — forwards,
//! store I/O, backoff sleeps — stops with it.

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    cache::ResponseCache,
    metrics,
    types::{JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION},
    upstream::{breakers::BreakerRegistry, errors::UpstreamError, pool::ProviderPool},
};

use super::errors::{DispatchError, ValidationError};

/// Retry loop tunables.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Maximum forward attempts per request.
    pub max_retries: u32,
    /// First backoff delay; doubles after every failed attempt.
    pub initial_backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 3, initial_backoff: Duration::from_millis(100) }
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub response: JsonRpcResponse,
    /// Name of the provider that served the request; `None` for cache hits.
    pub provider: Option<String>,
}

impl DispatchOutcome {
    /// Whether this request was answered from cache.
    #[must_use]
    pub fn from_cache(&self) -> bool {
        self.provider.is_none()
    }
}

/// Orchestrates one request through cache, pool, breakers, and retry.
///
/// Owns no durable state: health, latency, and cache entries live in the
/// shared state store, breaker state in the registry.
pub struct DispatchEngine {
    pool: Arc<ProviderPool>,
    breakers: Arc<BreakerRegistry>,
    cache: Arc<ResponseCache>,
    retry: RetrySettings,
}

impl DispatchEngine {
    #[must_use]
    pub fn new(
        pool: Arc<ProviderPool>,
        breakers: Arc<BreakerRegistry>,
        cache: Arc<ResponseCache>,
        retry: RetrySettings,
    ) -> Self {
        Self { pool, breakers, cache, retry }
    }

    /// The provider pool backing this engine.
    #[must_use]
    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    /// The breaker registry backing this engine.
    #[must_use]
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    fn validate(request: &JsonRpcRequest) -> Result<(), ValidationError> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(ValidationError::InvalidVersion(request.jsonrpc.to_string()));
        }
        if request.method.is_empty() {
            return Err(ValidationError::MissingMethod);
        }
        Ok(())
    }

    /// Dispatches one validated request, consulting the cache first.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Validation`] for malformed requests;
    /// - [`DispatchError::NoProviders`] when selection runs dry before any
    ///   forward attempt fails;
    /// - [`DispatchError::Exhausted`] when the attempt budget is spent.
    pub async fn dispatch(
        &self,
        request: JsonRpcRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        Self::validate(&request)?;

        if let Some(response) = self.cache.lookup(&request).await {
            tracing::debug!(method = %request.method, "cache hit");
            metrics::record_cache_hit(&request.method);
            return Ok(DispatchOutcome { response, provider: None });
        }

        self.dispatch_uncached(request).await
    }

    async fn dispatch_uncached(
        &self,
        request: JsonRpcRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut tried: HashSet<String> = HashSet::new();
        let mut backoff = self.retry.initial_backoff;
        let mut attempts: u32 = 0;
        let mut last_error: Option<UpstreamError> = None;

        while attempts < self.retry.max_retries {
            let provider = match self.pool.next_excluding(&tried).await {
                Ok(provider) => provider,
                Err(_) => {
                    return Err(match last_error {
                        Some(err) => DispatchError::Exhausted { last_error: err.to_string() },
                        None => DispatchError::NoProviders,
                    });
                }
            };
            let name = provider.name().to_string();
            tried.insert(name.clone());

            // Belt-and-suspenders: selection already filters overrides, but an
            // operator can trip a provider between selection and here. Skips
            // consume neither backoff nor the attempt budget.
            if self.breakers.is_forced_open(&name) {
                tracing::info!(provider = %name, "skipping provider under operator override");
                continue;
            }

            let breaker = self.breakers.breaker(&name);
            if let Some(ref breaker) = breaker {
                if !breaker.acquire().await {
                    // The breaker opened between selection and execution. A
                    // breaker fast-fail is a transport-class failure: it
                    // consumes an attempt and backs off like one.
                    tracing::debug!(provider = %name, "breaker refused execution after selection");
                    attempts += 1;
                    last_error = Some(UpstreamError::CircuitBreakerOpen);
                    if attempts < self.retry.max_retries {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                    continue;
                }
            }

            attempts += 1;
            let start = Instant::now();
            match provider.forward(&request).await {
                Ok(response) => {
                    let latency = start.elapsed();
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

                    if let Some(breaker) = breaker {
                        breaker.on_success().await;
                    }
                    self.pool.record_latency(&name, latency_ms).await;

                    metrics::record_request(&name, &request.method, true);
                    metrics::record_request_duration(&name, latency.as_secs_f64());
                    metrics::record_cost(&name, provider.cost_per_request());

                    tracing::info!(
                        method = %request.method,
                        provider = %name,
                        latency_ms,
                        attempt = attempts,
                        "request dispatched"
                    );

                    self.cache.store(&request, &response).await;
                    return Ok(DispatchOutcome { response, provider: Some(name) });
                }
                Err(err) => {
                    if let Some(breaker) = breaker {
                        if err.counts_as_breaker_failure() {
                            breaker.on_failure().await;
                        } else {
                            breaker.release().await;
                        }
                    }

                    metrics::record_request(&name, &request.method, false);
                    tracing::warn!(
                        method = %request.method,
                        provider = %name,
                        attempt = attempts,
                        error = %err,
                        "forward attempt failed"
                    );
                    last_error = Some(err);

                    if attempts < self.retry.max_retries {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(DispatchError::Exhausted {
            last_error: last_error
                .map_or_else(|| "no providers available".to_string(), |e| e.to_string()),
        })
    }
}
