//! End-to-end scenarios over the dispatch stack.

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use serde_json::json;
use solstice_core::{proxy::RetrySettings, upstream::CircuitBreakerState};

use crate::mock_provider::{rpc_request, Behavior, HarnessBuilder, MockProvider};

/// S1: with no latency samples and no health snapshots, three requests spread
/// across all three providers (round-robin discovery).
#[tokio::test]
async fn s1_round_robin_discovery() {
    let a = MockProvider::new("a", Behavior::Success(json!("ok")));
    let b = MockProvider::new("b", Behavior::Success(json!("ok")));
    let c = MockProvider::new("c", Behavior::Success(json!("ok")));
    let harness =
        HarnessBuilder::new().provider(a.clone()).provider(b.clone()).provider(c.clone()).build();

    let mut selected = HashSet::new();
    for id in 1..=3 {
        let outcome = harness.engine.dispatch(rpc_request("getSlot", id)).await.unwrap();
        assert_eq!(outcome.response.result, Some(json!("ok")));
        assert_eq!(*outcome.response.id, json!(id), "response must echo the request id");
        selected.insert(outcome.provider.expect("served by a provider"));
    }

    assert_eq!(selected.len(), 3, "each provider selected exactly once during discovery");
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
    assert_eq!(c.calls(), 1);
}

/// S2: with primed samples A=150, B=50, C=200, one request selects B.
#[tokio::test]
async fn s2_least_latency_selection() {
    let a = MockProvider::new("a", Behavior::Success(json!("ok")));
    let b = MockProvider::new("b", Behavior::Success(json!("ok")));
    let c = MockProvider::new("c", Behavior::Success(json!("ok")));
    let harness =
        HarnessBuilder::new().provider(a.clone()).provider(b.clone()).provider(c.clone()).build();

    harness.prime_latency("a", 150).await;
    harness.prime_latency("b", 50).await;
    harness.prime_latency("c", 200).await;

    let outcome = harness.engine.dispatch(rpc_request("getSlot", 42)).await.unwrap();
    assert_eq!(outcome.provider.as_deref(), Some("b"));
    assert_eq!(*outcome.response.id, json!(42));
}

/// S3: A always fails at the transport layer, B succeeds; one request fails
/// over from A to B, and A's consecutive-failure counter increments by one.
#[tokio::test]
async fn s3_failover() {
    let a = MockProvider::new("a", Behavior::TransportFail);
    let b = MockProvider::new("b", Behavior::Success(json!(42)));
    let harness = HarnessBuilder::new()
        .provider(a.clone())
        .provider(b.clone())
        .retry(RetrySettings { max_retries: 3, initial_backoff: Duration::from_millis(1) })
        .build();

    let outcome = harness.engine.dispatch(rpc_request("getSlot", 1)).await.unwrap();

    assert_eq!(a.calls(), 1, "attempt 1 hits A");
    assert_eq!(b.calls(), 1, "attempt 2 hits B");
    assert_eq!(outcome.provider.as_deref(), Some("b"));
    assert_eq!(outcome.response.result, Some(json!(42)));
    assert_eq!(*outcome.response.id, json!(1));

    let breaker = harness.breakers.breaker("a").unwrap();
    assert_eq!(breaker.failure_count().await, 1);
}

/// S4: after five consecutive failures A's breaker is open; the next request
/// never touches A and is served by B.
#[tokio::test]
async fn s4_breaker_open_skips_provider() {
    let a = MockProvider::new("a", Behavior::TransportFail);
    let b = MockProvider::new("b", Behavior::Success(json!("ok")));
    let harness = HarnessBuilder::new().provider(a.clone()).provider(b.clone()).build();

    let breaker = harness.breakers.breaker("a").unwrap();
    for _ in 0..5 {
        breaker.on_failure().await;
    }
    assert_eq!(breaker.state().await, CircuitBreakerState::Open);

    let outcome = harness.engine.dispatch(rpc_request("getSlot", 1)).await.unwrap();
    assert_eq!(outcome.provider.as_deref(), Some("b"));
    assert_eq!(a.calls(), 0, "open breaker: A is not attempted at all");

    let status = harness
        .breakers
        .statuses()
        .await
        .into_iter()
        .find(|s| s.provider.as_ref() == "a")
        .unwrap();
    assert_eq!(status.label(), "Open");
}

/// S5: an operator override forces A out of rotation until reset.
#[tokio::test]
async fn s5_operator_override() {
    let a = MockProvider::new("a", Behavior::Success(json!("ok")));
    let b = MockProvider::new("b", Behavior::Success(json!("ok")));
    let harness = HarnessBuilder::new().provider(a.clone()).provider(b.clone()).build();

    harness.breakers.trip("a");

    for _ in 0..3 {
        let outcome = harness.engine.dispatch(rpc_request("getSlot", 1)).await.unwrap();
        assert_eq!(outcome.provider.as_deref(), Some("b"));
    }
    assert_eq!(a.calls(), 0);

    harness.breakers.reset_overrides();

    // After reset A is selectable again: it is the only unmeasured provider,
    // so discovery must route to it.
    let outcome = harness.engine.dispatch(rpc_request("getSlot", 1)).await.unwrap();
    assert_eq!(outcome.provider.as_deref(), Some("a"));
}

/// S6: a cacheable method is served from cache within its TTL, without
/// touching any provider or its request counter.
#[tokio::test]
async fn s6_cache_hit() {
    let provider = MockProvider::new("a", Behavior::Success(json!(100)));
    let harness = HarnessBuilder::new()
        .provider(provider.clone())
        .cache_method("getSlot", Duration::from_secs(2))
        .build();

    let first = harness.engine.dispatch(rpc_request("getSlot", 1)).await.unwrap();
    assert_eq!(first.response.result, Some(json!(100)));
    assert_eq!(first.provider.as_deref(), Some("a"));
    assert_eq!(provider.calls(), 1);

    let start = Instant::now();
    let second = harness.engine.dispatch(rpc_request("getSlot", 1)).await.unwrap();
    let elapsed = start.elapsed();

    assert!(second.from_cache());
    assert_eq!(second.response.result, Some(json!(100)));
    assert_eq!(provider.calls(), 1, "cache hit contacts no provider");
    assert!(elapsed < Duration::from_millis(5), "cache hit took {elapsed:?}");
}

/// S6 continued: after the TTL the entry is gone and dispatch goes upstream
/// again.
#[tokio::test]
async fn s6_cache_expiry() {
    let provider = MockProvider::new("a", Behavior::Success(json!(100)));
    let harness = HarnessBuilder::new()
        .provider(provider.clone())
        .cache_method("getSlot", Duration::from_millis(50))
        .build();

    harness.engine.dispatch(rpc_request("getSlot", 1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(90)).await;

    let outcome = harness.engine.dispatch(rpc_request("getSlot", 1)).await.unwrap();
    assert!(!outcome.from_cache());
    assert_eq!(provider.calls(), 2, "expired entry forces a fresh dispatch");
}

/// Transport-level failover against real HTTP upstreams: a mockito server
/// answering 500 and one answering a result.
#[tokio::test]
async fn failover_over_real_http() {
    use solstice_core::{
        types::ProviderConfig,
        upstream::{HttpClient, HttpProvider, RpcProvider},
    };
    use std::sync::Arc;

    let mut failing = mockito::Server::new_async().await;
    failing.mock("POST", "/").with_status(500).with_body("boom").create_async().await;

    let mut healthy = mockito::Server::new_async().await;
    healthy
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":42}"#)
        .create_async()
        .await;

    let http = Arc::new(HttpClient::new().unwrap());
    let make = |name: &str, url: String| {
        Arc::new(HttpProvider::new(
            ProviderConfig {
                name: Arc::from(name),
                url,
                priority: 1,
                cost_per_request: 0.0,
            },
            Arc::clone(&http),
        )) as Arc<dyn RpcProvider>
    };

    let store = Arc::new(solstice_core::store::MemoryStore::new());
    let breakers = Arc::new(solstice_core::upstream::BreakerRegistry::new(
        [Arc::from("failing"), Arc::from("healthy")],
        solstice_core::upstream::BreakerSettings::default(),
    ));
    let pool = Arc::new(solstice_core::upstream::ProviderPool::new(
        vec![make("failing", failing.url()), make("healthy", healthy.url())],
        store.clone() as Arc<dyn solstice_core::store::StateStore>,
        breakers.clone(),
        solstice_core::upstream::SelectionStrategy::LeastLatency,
    ));
    let cache = Arc::new(solstice_core::cache::ResponseCache::new(
        store as Arc<dyn solstice_core::store::StateStore>,
        solstice_core::cache::CachePolicy::default(),
    ));
    let engine = solstice_core::proxy::DispatchEngine::new(
        pool,
        breakers,
        cache,
        RetrySettings { max_retries: 3, initial_backoff: Duration::from_millis(1) },
    );

    let outcome = engine.dispatch(rpc_request("getSlot", 1)).await.unwrap();
    assert_eq!(outcome.provider.as_deref(), Some("healthy"));
    assert_eq!(outcome.response.result, Some(json!(42)));
}
