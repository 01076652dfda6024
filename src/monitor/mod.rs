//! Monitoring scheduler -- the three independent periodic loops that
//! drive the engine. The only driver of time in this crate.

pub mod metrics;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::engine::BehaviorEngine;

/// Behavioral monitoring loop: detectors across all recently active
/// entities, every `monitoring_interval_secs`.
pub async fn run_monitoring_loop(engine: Arc<BehaviorEngine>) {
    info!(
        interval_secs = engine.config.monitoring_interval_secs,
        "Behavioral monitoring loop started"
    );
    let mut interval =
        tokio::time::interval(Duration::from_secs(engine.config.monitoring_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let raised = engine.run_detection_cycle().await;
        debug!(raised, "Monitoring cycle finished");
    }
}

/// Profile refresh loop, every `refresh_interval_secs`.
pub async fn run_refresh_loop(engine: Arc<BehaviorEngine>) {
    info!(
        interval_secs = engine.config.refresh_interval_secs,
        "Profile refresh loop started"
    );
    let mut interval =
        tokio::time::interval(Duration::from_secs(engine.config.refresh_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        engine.run_profile_refresh().await;
        debug!("Profile refresh cycle finished");
    }
}

/// Alert lifecycle loop: escalation, retention cleanup, and the
/// coordinated/persistent sweeps, every `lifecycle_interval_secs`.
pub async fn run_lifecycle_loop(engine: Arc<BehaviorEngine>) {
    info!(
        interval_secs = engine.config.lifecycle_interval_secs,
        "Alert lifecycle loop started"
    );
    let mut interval =
        tokio::time::interval(Duration::from_secs(engine.config.lifecycle_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        engine.run_alert_lifecycle().await;
        debug!("Alert lifecycle cycle finished");
    }
}
