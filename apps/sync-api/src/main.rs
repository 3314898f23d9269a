//! # Meridian Sync API Server
//!
//! Binary entry point: loads configuration, opens the database, starts the
//! periodic queue sweep, and serves the HTTP API until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use meridian_db::{Database, DbConfig};
use meridian_sync_api::{router, ApiConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Meridian sync API server");

    // Load configuration
    let config = ApiConfig::load()?;
    info!(
        addr = %config.bind_address(),
        db = %config.database_path,
        "Configuration loaded"
    );

    // Open database (runs migrations)
    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    info!("Database ready");

    let state = Arc::new(AppState::new(db, config.clone()));

    // Periodic queue sweep: records blocked on dependencies retry without
    // waiting for an operator to call /sync/queue/process.
    if config.queue_sweep_interval_secs > 0 {
        let sweep_state = state.clone();
        let period = Duration::from_secs(config.queue_sweep_interval_secs);
        let limit = config.queue_sweep_limit;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match sweep_state.coordinator.process_queue(limit).await {
                    Ok(summary) if summary.processed > 0 => {
                        info!(
                            applied = summary.applied,
                            requeued = summary.requeued,
                            exhausted = summary.exhausted,
                            "Automatic queue sweep"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Automatic queue sweep failed"),
                }
            }
        });
    }

    // Serve until interrupted
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(addr = %config.bind_address(), "Sync API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    info!("Sync API stopped");
    Ok(())
}
