//! Memo Cache - HTTP front of the client-resident result cache
//!
//! Hosts one [`CacheCore`] behind a small REST API, with background
//! maintenance and an optional file-backed durable tier.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memo_cache::api::{create_router, AppState};
use memo_cache::cache::CacheCore;
use memo_cache::config::Config;
use memo_cache::durable::{self, FileStore};
use memo_cache::tasks::{spawn_maintenance, Maintenance};

/// Longest wait for queued durable writes at shutdown.
const DURABLE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Main entry point for the Memo Cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the durable tier, if configured, and rehydrate the cache
/// 4. Start background maintenance
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. On SIGINT/SIGTERM: stop maintenance and flush durable writes
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memo_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Memo Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, max_memory={}B, default_ttl={:?}, port={}",
        config.cache.max_entries,
        config.cache.max_memory_bytes,
        config.cache.default_ttl,
        config.server_port
    );

    let mut cache = CacheCore::new(config.cache.clone());
    let writer_handle = match &config.durable_dir {
        Some(dir) => {
            let store = FileStore::open(dir)
                .with_context(|| format!("opening durable directory {}", dir.display()))?;
            let (tier, writer) = durable::channel(Arc::new(store), &config.cache.durable_namespace);
            cache = cache.with_durable(tier);
            info!("Durable tier enabled at {}", dir.display());
            Some(writer.spawn())
        }
        None => {
            info!("Durable tier disabled");
            None
        }
    };
    info!("Cache initialized with {} entries", cache.len());

    let state = AppState::new(cache);

    let maintenance = spawn_maintenance(
        state.cache.clone(),
        Maintenance::from_config(&config.cache),
    );
    info!("Background maintenance started");

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    maintenance.stop().await;

    if writer_handle.is_some() {
        let barrier = state.cache.read().await.durable_barrier();
        if let Some(barrier) = barrier {
            match tokio::time::timeout(DURABLE_FLUSH_TIMEOUT, barrier).await {
                Ok(Ok(())) => info!("Durable writes flushed"),
                Ok(Err(_)) => warn!("Durable writer stopped before flushing"),
                Err(_) => warn!("Timed out flushing durable writes"),
            }
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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
}
