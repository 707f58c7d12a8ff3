use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

/// Circuit breaker state machine.
///
/// Transitions:
/// - `Closed` -> `Open`: consecutive failures reach the trip threshold
/// - `Open` -> `HalfOpen`: the open timeout expires
/// - `HalfOpen` -> `Closed`: the full probe budget succeeds
/// - `HalfOpen` -> `Open`: any probe fails (deadline refreshed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    /// Normal operation, requests are allowed through.
    Closed,
    /// Failures exceeded threshold, requests are blocked until the deadline.
    Open,
    /// Recovery mode, a bounded number of probe requests are admitted.
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerState::Closed => write!(f, "Closed"),
            CircuitBreakerState::Open => write!(f, "Open"),
            CircuitBreakerState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Tunables for one breaker.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Consecutive failures before the circuit opens.
    pub trip_threshold: u32,
    /// How long the circuit stays open before admitting probes.
    pub open_timeout: Duration,
    /// Probe budget in half-open state; all must succeed to close.
    pub max_requests: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self { trip_threshold: 5, open_timeout: Duration::from_secs(60), max_requests: 5 }
    }
}

/// Internal mutable state protected by a single lock.
///
/// Consolidating the counters with the state prevents races during
/// transitions: every transition reads and writes under one acquisition.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_successes: u32,
    half_open_in_flight: u32,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_successes: 0,
            half_open_in_flight: 0,
        }
    }
}

/// Circuit breaker protecting one upstream provider.
///
/// State changes are linearizable per provider: all mutation happens under a
/// single `RwLock` acquisition. The pool consults [`allows`](Self::allows)
/// when filtering candidates (read-mostly, performs the timed Open -> HalfOpen
/// transition); the engine calls [`acquire`](Self::acquire) for the provider
/// it actually dispatches to, which consumes half-open probe budget.
pub struct CircuitBreaker {
    name: Arc<str>,
    inner: Arc<RwLock<BreakerInner>>,
    settings: BreakerSettings,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: Arc<str>, settings: BreakerSettings) -> Self {
        Self { name, inner: Arc::new(RwLock::new(BreakerInner::new())), settings }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitBreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        tracing::warn!(
            provider = %self.name,
            from = %from,
            to = %to,
            "circuit breaker state changed"
        );
        crate::metrics::record_breaker_state(&self.name, to);
    }

    /// Whether this provider is currently selectable.
    ///
    /// Performs the Open -> HalfOpen transition once the open timeout elapses,
    /// using the double-checked pattern: read lock for the common case, write
    /// lock only when a transition is due. Does not consume probe budget.
    pub async fn allows(&self) -> bool {
        {
            let inner = self.inner.read().await;
            match inner.state {
                CircuitBreakerState::Closed => return true,
                CircuitBreakerState::HalfOpen => {
                    return inner.half_open_in_flight + inner.half_open_successes <
                        self.settings.max_requests;
                }
                CircuitBreakerState::Open => {
                    match inner.opened_at {
                        Some(at) if at.elapsed() >= self.settings.open_timeout => {
                            // Deadline passed; fall through to the write path.
                        }
                        _ => return false,
                    }
                }
            }
        }

        let mut inner = self.inner.write().await;
        // Re-check after acquiring the write lock; another task may have
        // transitioned already.
        match inner.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::HalfOpen => {
                inner.half_open_in_flight + inner.half_open_successes < self.settings.max_requests
            }
            CircuitBreakerState::Open => {
                match inner.opened_at {
                    Some(at) if at.elapsed() >= self.settings.open_timeout => {
                        inner.half_open_successes = 0;
                        inner.half_open_in_flight = 0;
                        self.transition(&mut inner, CircuitBreakerState::HalfOpen);
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    /// Reserves the right to execute one request through this breaker.
    ///
    /// Returns `false` when the circuit is open or the half-open probe budget
    /// is exhausted. A `true` return must be balanced by exactly one
    /// [`on_success`](Self::on_success) or [`on_failure`](Self::on_failure).
    pub async fn acquire(&self) -> bool {
        if !self.allows().await {
            return false;
        }

        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::HalfOpen => {
                if inner.half_open_in_flight + inner.half_open_successes <
                    self.settings.max_requests
                {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
            CircuitBreakerState::Open => false,
        }
    }

    /// Records a successful request execution.
    pub async fn on_success(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitBreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitBreakerState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.settings.max_requests {
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                    inner.half_open_successes = 0;
                    self.transition(&mut inner, CircuitBreakerState::Closed);
                }
            }
            CircuitBreakerState::Open => {
                // A success observed while nominally open (race with a trip):
                // treat it as recovery.
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                self.transition(&mut inner, CircuitBreakerState::Closed);
            }
        }
    }

    /// Records a failed request execution.
    pub async fn on_failure(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitBreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.settings.trip_threshold {
                    inner.opened_at = Some(Instant::now());
                    self.transition(&mut inner, CircuitBreakerState::Open);
                }
            }
            CircuitBreakerState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes = 0;
                inner.opened_at = Some(Instant::now());
                self.transition(&mut inner, CircuitBreakerState::Open);
            }
            CircuitBreakerState::Open => {
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    /// Releases an acquired slot without recording an outcome.
    ///
    /// Used when a forward attempt failed for reasons that say nothing about
    /// the upstream (e.g. the request could not be serialized), so the breaker
    /// should neither advance toward closing nor toward opening.
    pub async fn release(&self) {
        let mut inner = self.inner.write().await;
        if inner.state == CircuitBreakerState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Forces the breaker back to closed, clearing all counters.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.half_open_successes = 0;
        inner.half_open_in_flight = 0;
        self.transition(&mut inner, CircuitBreakerState::Closed);
    }

    /// Returns the current state.
    pub async fn state(&self) -> CircuitBreakerState {
        self.inner.read().await.state
    }

    /// Returns the current consecutive-failure count.
    pub async fn failure_count(&self) -> u32 {
        self.inner.read().await.consecutive_failures
    }
}
