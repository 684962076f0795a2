//! Freshness demo daemon
//!
//! Runs the cache, XP queue and scheduler behind the admin HTTP API, with an
//! in-memory ledger standing in for the remote experience store.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use freshness::api::create_router;
use freshness::{AppContext, Config, LedgerSink};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the application context (starts XP auto-flush)
/// 4. Register the XP snapshot task
/// 5. Serve the admin API until SIGINT/SIGTERM
/// 6. Shut the context down, flushing queued XP once more
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "freshness=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting freshness daemon");

    let config = Config::from_env();
    info!(
        "Configuration loaded: ttl={:?}, batch={}, flush={:?}, snapshot={:?}, port={}",
        config.default_ttl,
        config.max_batch_size,
        config.flush_interval,
        config.snapshot_interval,
        config.server_port
    );

    let ledger = Arc::new(LedgerSink::new());
    let ctx = AppContext::new(&config, ledger.clone());
    ctx.register_xp_snapshot(&config, ledger);

    let app = create_router(ctx.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Admin API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Admin API server failed")?;

    let report = ctx.shutdown().await;
    if report.groups_failed > 0 {
        warn!("{} XP groups could not be written before exit", report.groups_failed);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
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
}
