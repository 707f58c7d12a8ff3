//! Health-aware provider selection.
//!
//! Selection runs in two phases. The *discovery* phase routes traffic to
//! candidates that have no latency sample yet, advancing a round-robin cursor
//! so every unmeasured provider gets benchmarked before least-latency routing
//! takes over — otherwise the first provider seen would monopolize traffic.
//! The *exploitation* phase picks the candidate with the smallest latency
//! sample, ties broken by cursor order.
//!
//! All state-store reads happen before the cursor mutex is taken; the lock
//! only guards the CPU-only selection step.

use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::{
    store::{StateStore, HEALTH_KEY_PREFIX, LATENCY_KEY_PREFIX},
    types::HealthSnapshot,
    upstream::{breakers::BreakerRegistry, errors::UpstreamError, provider::RpcProvider},
};

/// TTL on latency samples written after successful dispatches.
pub const LATENCY_SAMPLE_TTL: Duration = Duration::from_secs(600);

/// Routing strategy from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Discovery then least-latency (the default).
    LeastLatency,
    /// Plain cursor rotation; latency samples are still recorded but ignored.
    RoundRobin,
}

struct Candidate {
    index: usize,
    latency_ms: Option<u64>,
}

/// Pool of upstream providers with health-aware least-latency selection.
pub struct ProviderPool {
    providers: Vec<Arc<dyn RpcProvider>>,
    store: Arc<dyn StateStore>,
    breakers: Arc<BreakerRegistry>,
    strategy: SelectionStrategy,
    /// Round-robin cursor; guarded by a mutex held only during selection.
    cursor: Mutex<usize>,
}

impl ProviderPool {
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn RpcProvider>>,
        store: Arc<dyn StateStore>,
        breakers: Arc<BreakerRegistry>,
        strategy: SelectionStrategy,
    ) -> Self {
        Self { providers, store, breakers, strategy, cursor: Mutex::new(0) }
    }

    /// All providers, in configuration order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn RpcProvider>] {
        &self.providers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Returns a provider by name.
    #[must_use]
    pub fn provider_by_name(&self, name: &str) -> Option<Arc<dyn RpcProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Reads the most recent health snapshot for a provider.
    ///
    /// Missing keys, store errors, and undecodable payloads all return `None`:
    /// an unknown verdict must never exclude a provider (fail-open on probe
    /// lag).
    pub async fn health_of(&self, name: &str) -> Option<HealthSnapshot> {
        let key = format!("{HEALTH_KEY_PREFIX}{name}");
        match self.store.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "undecodable health snapshot");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(provider = %name, error = %e, "health read failed, treating as unknown");
                None
            }
        }
    }

    /// Reads the last latency sample for a provider, in milliseconds.
    pub async fn latency_of(&self, name: &str) -> Option<u64> {
        let key = format!("{LATENCY_KEY_PREFIX}{name}");
        match self.store.get(&key).await {
            Ok(Some(bytes)) => std::str::from_utf8(&bytes).ok()?.trim().parse().ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(provider = %name, error = %e, "latency read failed, treating as unsampled");
                None
            }
        }
    }

    /// Records a latency sample after a successful dispatch.
    ///
    /// Last-writer-wins, no smoothing. Write failures are logged and dropped;
    /// losing a sample only costs routing quality, never a request.
    pub async fn record_latency(&self, name: &str, latency_ms: u64) {
        let key = format!("{LATENCY_KEY_PREFIX}{name}");
        if let Err(e) = self
            .store
            .set(&key, latency_ms.to_string().into_bytes(), LATENCY_SAMPLE_TTL)
            .await
        {
            tracing::warn!(provider = %name, error = %e, "failed to record latency sample");
        }
    }

    /// Returns the next provider to try, skipping those in the exclusion set.
    ///
    /// A candidate must be outside the exclusion set, not forced open by an
    /// operator override, admitted by its circuit breaker, and either healthy
    /// or lacking a live health verdict.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::NoProvidersAvailable`] when no candidate
    /// remains.
    pub async fn next_excluding(
        &self,
        exclude: &HashSet<String>,
    ) -> Result<Arc<dyn RpcProvider>, UpstreamError> {
        if self.providers.is_empty() {
            return Err(UpstreamError::NoProvidersAvailable);
        }

        // Gather candidates and their latency samples before touching the
        // cursor: selection under the lock must stay I/O-free.
        let mut candidates: Vec<Candidate> = Vec::with_capacity(self.providers.len());
        for (index, provider) in self.providers.iter().enumerate() {
            let name = provider.name();
            if exclude.contains(name) {
                continue;
            }
            if self.breakers.is_forced_open(name) {
                tracing::debug!(provider = %name, "selection skipping forced-open provider");
                continue;
            }
            if let Some(breaker) = self.breakers.breaker(name) {
                if !breaker.allows().await {
                    tracing::debug!(provider = %name, "selection skipping provider with open breaker");
                    continue;
                }
            }
            if let Some(snapshot) = self.health_of(name).await {
                if !snapshot.healthy {
                    tracing::debug!(provider = %name, "selection skipping unhealthy provider");
                    continue;
                }
            }
            candidates.push(Candidate { index, latency_ms: self.latency_of(name).await });
        }

        if candidates.is_empty() {
            return Err(UpstreamError::NoProvidersAvailable);
        }

        let selected = self.select(&candidates);
        Ok(Arc::clone(&self.providers[selected]))
    }

    /// CPU-only selection over the candidate list. Holds the cursor lock.
    ///
    /// The cursor is taken modulo the candidate-set size, not the pool size,
    /// and advances after every selection path so progress stays eventually
    /// fair.
    fn select(&self, candidates: &[Candidate]) -> usize {
        let n = candidates.len();
        let mut cursor = self.cursor.lock();

        if self.strategy == SelectionStrategy::LeastLatency {
            // Discovery: route to unmeasured candidates first, in cursor order.
            for offset in 0..n {
                let idx = (*cursor + offset) % n;
                if candidates[idx].latency_ms.is_none() {
                    *cursor = (idx + 1) % n;
                    return candidates[idx].index;
                }
            }

            // Exploitation: smallest sample wins, ties broken by cursor order.
            let mut best: Option<(usize, u64)> = None;
            for offset in 0..n {
                let idx = (*cursor + offset) % n;
                if let Some(latency) = candidates[idx].latency_ms {
                    if best.is_none_or(|(_, current)| latency < current) {
                        best = Some((idx, latency));
                    }
                }
            }
            if let Some((idx, _)) = best {
                *cursor = (idx + 1) % n;
                return candidates[idx].index;
            }
        }

        // Fallback (and the whole of round-robin): plain cursor rotation.
        let idx = *cursor % n;
        *cursor = (idx + 1) % n;
        candidates[idx].index
    }
}
