//! BehaviorSentry -- behavioral anomaly detection and alerting engine.
//!
//! This crate builds per-entity behavior baselines (users, autonomous
//! worker agents, and the system as a whole), scores incoming activity
//! against those baselines, raises and correlates security alerts,
//! escalates unacknowledged high-severity alerts, and applies automated,
//! time-boxed mitigations.

pub mod alerts;
pub mod api;
pub mod config;
pub mod detect;
pub mod engine;
pub mod ingress;
pub mod mitigate;
pub mod monitor;
pub mod notify;
pub mod profile;
pub mod score;
pub mod storage;
pub mod ttlstore;

use anyhow::Result;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::BehaviorEngine;
use crate::mitigate::LoggingResponseBackend;
use crate::notify::TracingNotifier;
use crate::ttlstore::MemoryTtlStore;

/// Start the BehaviorSentry daemon: API server plus the three monitoring
/// loops.
pub async fn serve(bind: &str, db_path: &str, config_path: &str) -> Result<()> {
    let config = EngineConfig::load(config_path)?;

    // Durable storage is best-effort: run detection-only when unavailable
    let pool = match storage::open_pool(db_path) {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!(%db_path, "Database unavailable, running degraded: {}", e);
            None
        }
    };

    let engine = BehaviorEngine::new(
        config,
        Arc::new(MemoryTtlStore::new()),
        Arc::new(TracingNotifier),
        Arc::new(LoggingResponseBackend),
        pool,
    );

    // The three independent loops run for the lifetime of the process
    tokio::spawn(monitor::run_monitoring_loop(engine.clone()));
    tokio::spawn(monitor::run_refresh_loop(engine.clone()));
    tokio::spawn(monitor::run_lifecycle_loop(engine.clone()));

    let addr: std::net::SocketAddr = bind.parse()?;
    let app = api::router(api::state::AppState { engine });

    tracing::info!(%addr, "BehaviorSentry listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown requested, draining");
}
