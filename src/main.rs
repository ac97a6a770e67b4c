//! Integration Gateway - admin server
//!
//! Runs the gateway's maintenance task and operator admin API. Downstream
//! invokers are registered by the host application embedding the library.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use integration_gateway::gateway::TracingAuditSink;
use integration_gateway::{create_router, spawn_cleanup_task, AppState, Config, Gateway};

/// Main entry point for the admin server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the gateway (cache, limiter, breakers, audit sink)
/// 4. Start background expiry sweep
/// 5. Create Axum router with the admin endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "integration_gateway=info,audit=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Integration Gateway");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, default_ttl={}s, eviction={}, rate_limit={}, port={}, cleanup_interval={}s",
        config.max_entries,
        config.default_ttl,
        config.eviction_policy,
        config.default_rate_limit(),
        config.server_port,
        config.cleanup_interval
    );

    let gateway = Arc::new(Gateway::from_config(&config, Arc::new(TracingAuditSink)));
    info!("Gateway initialized");

    let cleanup_handle = spawn_cleanup_task(
        gateway.cache().clone(),
        gateway.limiter().clone(),
        config.cleanup_interval,
    );
    info!("Background expiry sweep started");

    let app = create_router(AppState::new(gateway));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Admin API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("admin server failed")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the sweep task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
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

    cleanup_handle.abort();
    warn!("Expiry sweep aborted");
}
