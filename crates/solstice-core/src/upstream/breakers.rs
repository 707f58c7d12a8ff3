//! Per-provider circuit breaker registry and operator overrides.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::{collections::HashSet, sync::Arc};

use crate::upstream::circuit_breaker::{BreakerSettings, CircuitBreaker, CircuitBreakerState};

/// Reported state of one provider's breaker, including any operator override.
#[derive(Debug, Clone)]
pub struct BreakerStatus {
    pub provider: Arc<str>,
    pub state: CircuitBreakerState,
    pub consecutive_failures: u32,
    pub forced_open: bool,
}

impl BreakerStatus {
    /// Human-readable state label; an operator override shadows the FSM state.
    #[must_use]
    pub fn label(&self) -> String {
        if self.forced_open {
            "ForcedOpen".to_string()
        } else {
            self.state.to_string()
        }
    }
}

/// Owns one circuit breaker per provider, created at startup, plus the
/// process-local forced-open override set used for live fault-injection
/// drills.
///
/// Breaker state is deliberately per-process: in a fleet each instance trips
/// and recovers independently.
pub struct BreakerRegistry {
    breakers: DashMap<Arc<str>, Arc<CircuitBreaker>>,
    overrides: RwLock<HashSet<String>>,
}

impl BreakerRegistry {
    /// Creates a registry with one breaker per provider name.
    #[must_use]
    pub fn new(provider_names: impl IntoIterator<Item = Arc<str>>, settings: BreakerSettings) -> Self {
        let breakers = DashMap::new();
        for name in provider_names {
            breakers
                .insert(Arc::clone(&name), Arc::new(CircuitBreaker::new(name, settings.clone())));
        }
        Self { breakers, overrides: RwLock::new(HashSet::new()) }
    }

    /// Returns the breaker for a provider, if registered.
    #[must_use]
    pub fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether the operator has forced this provider open.
    #[must_use]
    pub fn is_forced_open(&self, name: &str) -> bool {
        self.overrides.read().contains(name)
    }

    /// Sets the forced-open override for a provider.
    pub fn trip(&self, name: &str) {
        self.overrides.write().insert(name.to_string());
        tracing::warn!(provider = %name, "operator override set: provider forced open");
    }

    /// Clears all operator overrides.
    pub fn reset_overrides(&self) {
        let mut overrides = self.overrides.write();
        if !overrides.is_empty() {
            tracing::warn!(count = overrides.len(), "operator overrides cleared");
        }
        overrides.clear();
    }

    /// Reports the state of every registered breaker.
    pub async fn statuses(&self) -> Vec<BreakerStatus> {
        // Snapshot the map before awaiting: dashmap iteration holds shard
        // locks, which must not live across suspension points.
        let breakers: Vec<(Arc<str>, Arc<CircuitBreaker>)> = self
            .breakers
            .iter()
            .map(|entry| (Arc::clone(entry.key()), Arc::clone(entry.value())))
            .collect();

        let mut out = Vec::with_capacity(breakers.len());
        for (provider, breaker) in breakers {
            out.push(BreakerStatus {
                forced_open: self.is_forced_open(&provider),
                state: breaker.state().await,
                consecutive_failures: breaker.failure_count().await,
                provider,
            });
        }
        out
    }
}
