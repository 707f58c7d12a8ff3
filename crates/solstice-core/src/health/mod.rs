//! Background health prober.
//!
//! Probes every provider at a fixed interval and writes the verdicts into the
//! shared state store, where the pool's selection filter reads them. The
//! verdict TTL is six probe intervals: if the prober stalls, stale verdicts
//! age out and selection fails open rather than trusting old data.

use futures::future::join_all;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    metrics,
    store::{StateStore, HEALTH_KEY_PREFIX},
    types::HealthSnapshot,
    upstream::provider::RpcProvider,
};

/// Snapshot TTL as a multiple of the probe interval.
const SNAPSHOT_TTL_INTERVALS: u32 = 6;

/// Periodically probes all providers and persists their health snapshots.
pub struct HealthMonitor {
    providers: Vec<Arc<dyn RpcProvider>>,
    store: Arc<dyn StateStore>,
    probe_interval: Duration,
    probe_timeout: Duration,
    /// Consecutive probe failures before a provider is written unhealthy.
    unhealthy_threshold: u32,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn RpcProvider>>,
        store: Arc<dyn StateStore>,
        probe_interval: Duration,
        probe_timeout: Duration,
        unhealthy_threshold: u32,
    ) -> Self {
        Self {
            providers,
            store,
            probe_interval,
            probe_timeout,
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    /// Starts the background probe loop.
    ///
    /// The first cycle runs immediately, not after one interval. On shutdown
    /// the task stops within one probe interval.
    #[must_use]
    pub fn start_with_shutdown(
        &self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let providers = self.providers.clone();
        let store = Arc::clone(&self.store);
        let probe_interval = self.probe_interval;
        let probe_timeout = self.probe_timeout;
        let unhealthy_threshold = self.unhealthy_threshold;

        tokio::spawn(async move {
            info!(
                interval_ms = probe_interval.as_millis() as u64,
                providers = providers.len(),
                "health monitor started"
            );

            let snapshot_ttl = probe_interval * SNAPSHOT_TTL_INTERVALS;
            let mut failure_streaks: HashMap<String, u32> = HashMap::new();
            let mut ticker = tokio::time::interval(probe_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::probe_all(
                            &providers,
                            &store,
                            probe_timeout,
                            snapshot_ttl,
                            unhealthy_threshold,
                            &mut failure_streaks,
                        )
                        .await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("health monitor shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Runs one probe cycle, fanning out across providers concurrently.
    ///
    /// Each probe has its own deadline, so a slow provider cannot delay the
    /// others; the cycle as a whole is bounded by the probe timeout.
    async fn probe_all(
        providers: &[Arc<dyn RpcProvider>],
        store: &Arc<dyn StateStore>,
        probe_timeout: Duration,
        snapshot_ttl: Duration,
        unhealthy_threshold: u32,
        failure_streaks: &mut HashMap<String, u32>,
    ) {
        let probes = providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let verdict = match tokio::time::timeout(probe_timeout, provider.probe()).await {
                    Ok(snapshot) => snapshot,
                    Err(_) => HealthSnapshot::unhealthy(
                        u64::try_from(probe_timeout.as_millis()).unwrap_or(u64::MAX),
                        "probe timed out",
                    ),
                };
                (provider.name().to_string(), verdict)
            }
        });

        for (name, raw_verdict) in join_all(probes).await {
            let streak = failure_streaks.entry(name.clone()).or_insert(0);
            let snapshot = if raw_verdict.healthy {
                *streak = 0;
                raw_verdict
            } else {
                *streak += 1;
                if *streak >= unhealthy_threshold {
                    raw_verdict
                } else {
                    // Below the threshold the provider keeps its benefit of
                    // the doubt, but the error is still recorded.
                    HealthSnapshot { healthy: true, ..raw_verdict }
                }
            };

            if snapshot.healthy {
                info!(
                    provider = %name,
                    latency_ms = snapshot.latency_ms,
                    "probe passed"
                );
            } else {
                warn!(
                    provider = %name,
                    latency_ms = snapshot.latency_ms,
                    error = snapshot.error.as_deref().unwrap_or("unknown"),
                    "probe failed, provider marked unhealthy"
                );
            }

            metrics::record_provider_health(&name, snapshot.healthy);

            match serde_json::to_vec(&snapshot) {
                Ok(bytes) => {
                    let key = format!("{HEALTH_KEY_PREFIX}{name}");
                    if let Err(e) = store.set(&key, bytes, snapshot_ttl).await {
                        warn!(provider = %name, error = %e, "failed to persist health snapshot");
                    }
                }
                Err(e) => warn!(provider = %name, error = %e, "failed to encode health snapshot"),
            }
        }
    }
}
