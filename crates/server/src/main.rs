use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::{signal, sync::broadcast};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use server::{router, AppState};
use solstice_core::{
    cache::ResponseCache,
    config::AppConfig,
    health::HealthMonitor,
    metrics,
    proxy::DispatchEngine,
    store::{MemoryStore, StateStore},
    upstream::{
        BreakerRegistry, HttpClient, HttpProvider, ProviderPool, RpcProvider,
    },
};

/// Background tasks get this long to drain after the listener closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,solstice_core={level},server={level}",
            level = config.logging.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(false)).init();
    }
}

/// Everything wired at startup from one validated configuration.
struct CoreServices {
    engine: Arc<DispatchEngine>,
    monitor: HealthMonitor,
    store: Arc<MemoryStore>,
}

fn init_core_services(config: &AppConfig) -> Result<CoreServices> {
    let store = Arc::new(MemoryStore::new());
    let shared_store: Arc<dyn StateStore> = store.clone();

    let http_client =
        Arc::new(HttpClient::new().map_err(|e| anyhow::anyhow!("http client init failed: {e}"))?);

    let provider_configs = config.provider_configs();
    let breakers = Arc::new(BreakerRegistry::new(
        provider_configs.iter().map(|p| Arc::clone(&p.name)),
        config.breaker_settings(),
    ));

    let providers: Vec<Arc<dyn RpcProvider>> = provider_configs
        .into_iter()
        .map(|descriptor| {
            info!(
                provider = %descriptor.name,
                cost_per_request = descriptor.cost_per_request,
                "provider initialized"
            );
            Arc::new(HttpProvider::new(descriptor, Arc::clone(&http_client)))
                as Arc<dyn RpcProvider>
        })
        .collect();

    let strategy = config
        .selection_strategy()
        .map_err(|e| anyhow::anyhow!("invalid routing strategy: {e}"))?;
    let pool = Arc::new(ProviderPool::new(
        providers.clone(),
        Arc::clone(&shared_store),
        Arc::clone(&breakers),
        strategy,
    ));

    let cache = Arc::new(ResponseCache::new(Arc::clone(&shared_store), config.cache_policy()));

    let engine = Arc::new(DispatchEngine::new(
        Arc::clone(&pool),
        breakers,
        cache,
        config.retry_settings(),
    ));

    let monitor = HealthMonitor::new(
        providers,
        shared_store,
        config.probe_interval(),
        config.probe_timeout(),
        config.health.unhealthy_threshold,
    );

    Ok(CoreServices { engine, monitor, store })
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    init_logging(&config);
    info!(
        providers = config.providers.len(),
        port = config.server.port,
        caching = config.caching.enabled,
        "starting solstice"
    );

    let metrics_handle = metrics::install();
    let services = init_core_services(&config)?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let monitor_handle = services.monitor.start_with_shutdown(shutdown_tx.subscribe());
    let sweeper_handle =
        services.store.start_sweeper(config.sweep_interval(), shutdown_tx.subscribe());

    let state = Arc::new(AppState::new(services.engine, metrics_handle));
    let app = router::build_router(state, config.read_timeout());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "listening for rpc requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Listener is closed; stop background tasks and give them a bounded drain.
    let _ = shutdown_tx.send(());
    for handle in [monitor_handle, sweeper_handle] {
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            error!("background task did not stop within the shutdown grace period");
        }
    }

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, draining");
}
