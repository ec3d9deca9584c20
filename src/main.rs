//! Threatcore server
//!
//! Serves the metadata, threat model and cache endpoints on top of either a
//! Redis backend (with the `redis` feature and `REDIS_URL` set) or the
//! in-process cache.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use threatcore::cache::{CacheClient, MemoryCache};
use threatcore::{create_router, spawn_cleanup_task, AppState, Config};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect the cache backend, starting the TTL sweep for the in-process one
/// 4. Build stores, cache service and router
/// 5. Serve until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threatcore=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting threatcore server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, cache_max_entries={}, cleanup_interval={}s, redis={}",
        config.server_port,
        config.cache_max_entries,
        config.cleanup_interval,
        config.redis_url.is_some()
    );

    let (client, cleanup_handle) = connect_cache(&config).await?;
    let state = AppState::new(client, config.ttls.clone());
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Picks the cache backend. Only the in-process backend needs a sweep task.
async fn connect_cache(
    config: &Config,
) -> anyhow::Result<(Arc<dyn CacheClient>, Option<JoinHandle<()>>)> {
    if let Some(url) = &config.redis_url {
        if let Some(client) = connect_redis(url).await? {
            return Ok((client, None));
        }
    }

    let cache = Arc::new(MemoryCache::new(config.cache_max_entries));
    let handle = spawn_cleanup_task(cache.clone(), config.cleanup_interval);
    info!("In-process cache initialized with TTL sweep");
    let client: Arc<dyn CacheClient> = cache;
    Ok((client, Some(handle)))
}

#[cfg(feature = "redis")]
async fn connect_redis(url: &str) -> anyhow::Result<Option<Arc<dyn CacheClient>>> {
    let redis = threatcore::cache::RedisCache::connect(url)
        .await
        .context("failed to connect to Redis")?;
    Ok(Some(Arc::new(redis)))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_url: &str) -> anyhow::Result<Option<Arc<dyn CacheClient>>> {
    warn!("REDIS_URL is set but the redis feature is disabled, using the in-process cache");
    Ok(None)
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the sweep task.
async fn shutdown_signal(cleanup_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = cleanup_handle {
        handle.abort();
        warn!("Cache TTL sweep aborted");
    }
}
