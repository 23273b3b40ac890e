mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod router;
mod services;

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use db::Store;
use services::PortPanelSync;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub sync: Arc<PortPanelSync>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (reads .env before the log filter is decided)
    let cfg = Config::load();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rack_sync=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting rack-sync");
    tracing::info!("Database: {}", cfg.db_path);
    tracing::info!("Listen: {}", cfg.listen_addr);

    // Initialize database
    let store = Store::with_options(&cfg.db_path, cfg.db_max_connections, cfg.busy_timeout()).await?;
    tracing::info!(
        "Database initialized at {} (pool_size={}, busy_timeout_ms={})",
        store.db_path().display(),
        cfg.db_max_connections,
        cfg.db_busy_timeout_ms
    );

    let policy = cfg.retry_policy();
    tracing::info!(
        "Sync retry policy: max_attempts={}, initial_delay_ms={}",
        policy.max_attempts,
        cfg.sync_retry_delay_ms
    );
    let sync = PortPanelSync::new(store.clone(), policy, cfg.default_actor.clone());

    // Create app state
    let state = Arc::new(AppState {
        store,
        config: cfg.clone(),
        sync,
    });

    // Build router
    let app = router::build(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;
    tracing::info!("rack-sync listening on {}", cfg.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("rack-sync shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
