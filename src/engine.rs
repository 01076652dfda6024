//! The behavior engine -- wires ingress, profiles, detection, alerting,
//! and mitigation together and drives the periodic cycles.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::alerts::manager::AlertPolicy;
use crate::alerts::{
    AlertManager, SecurityAlert, ALERT_AGENT_BEHAVIOR, ALERT_FAILED_LOGIN, ALERT_SYSTEM_BEHAVIOR,
    ALERT_USER_BEHAVIOR,
};
use crate::alerts::store::AlertStore;
use crate::config::EngineConfig;
use crate::detect::{self, AnomalyFinding, Severity};
use crate::ingress::{Activity, ActivityAttributes, ActivityStore, EntityKey, EntityType};
use crate::mitigate::{MitigationController, ResponseBackend};
use crate::monitor::metrics::EngineMetrics;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::profile::ProfileStore;
use crate::storage::{self, Pool};
use crate::ttlstore::TtlStore;

pub struct BehaviorEngine {
    pub config: EngineConfig,
    pub activities: Arc<ActivityStore>,
    pub profiles: Arc<ProfileStore>,
    pub alerts: Arc<AlertManager>,
    pub mitigations: Arc<MitigationController>,
    pub metrics: Arc<EngineMetrics>,
    pool: Option<Pool>,
}

impl BehaviorEngine {
    pub fn new(
        config: EngineConfig,
        ttl: Arc<dyn TtlStore>,
        notifier: Arc<dyn Notifier>,
        backend: Arc<dyn ResponseBackend>,
        pool: Option<Pool>,
    ) -> Arc<Self> {
        let metrics = Arc::new(EngineMetrics::default());
        let dispatcher = NotificationDispatcher::new(notifier, ttl.clone());

        let policy = AlertPolicy {
            alert_threshold: config.alert_threshold,
            history_capacity: config.history_capacity,
            escalation_after: Duration::seconds(config.escalation_after_secs),
            retention: Duration::seconds(config.retention_secs),
        };
        let alerts = Arc::new(AlertManager::new(
            dispatcher.clone(),
            pool.clone().map(AlertStore::new),
            metrics.clone(),
            policy,
        ));
        let mitigations = Arc::new(MitigationController::new(
            ttl.clone(),
            backend,
            dispatcher,
            metrics.clone(),
        ));

        Arc::new(Self {
            activities: Arc::new(ActivityStore::new(config.buffer_capacity)),
            profiles: Arc::new(ProfileStore::new(ttl)),
            alerts,
            mitigations,
            metrics,
            pool,
            config,
        })
    }

    /// Record an activity: fire-and-forget buffer append plus best-effort
    /// durable persistence. Malformed payloads are dropped and logged.
    pub async fn record_activity(&self, activity: Activity) {
        if let Err(reason) = validate(&activity) {
            warn!(
                entity = %activity.entity_id,
                activity_type = %activity.activity_type,
                "Dropping malformed activity: {}",
                reason
            );
            return;
        }

        // Exactly one profile exists per entity once observed
        self.profiles
            .get_or_create(activity.entity_type, &activity.entity_id)
            .await;

        if let Some(pool) = &self.pool {
            if let Err(e) = storage::save_activity(pool, &activity) {
                debug!("Activity not persisted durably: {}", e);
            }
        }

        self.activities.record(activity).await;
    }

    /// One behavioral monitoring pass over all entities with recent
    /// activity. Entity failures are isolated; returns alerts raised.
    pub async fn run_detection_cycle(&self) -> usize {
        let cutoff = Utc::now() - Duration::seconds(self.config.monitoring_interval_secs as i64);
        let entities = self.activities.entities_active_since(cutoff).await;

        let mut raised = 0;
        for key in entities {
            EngineMetrics::incr(&self.metrics.entities_monitored);
            if let Some(alert) = self.detect_entity(&key, cutoff).await {
                self.mitigations.respond(&alert).await;
                raised += 1;
            }
        }
        raised
    }

    async fn detect_entity(
        &self,
        (entity_type, entity_id): &EntityKey,
        cutoff: chrono::DateTime<Utc>,
    ) -> Option<SecurityAlert> {
        let recent = self.activities.snapshot(*entity_type, entity_id).await;
        let profile = self.profiles.get_or_create(*entity_type, entity_id).await;
        let sensitivity = self.mitigations.sensitivity_for(*entity_type, entity_id);

        let mut findings: Vec<AnomalyFinding> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for activity in recent.iter().filter(|a| a.timestamp >= cutoff) {
            for finding in detect::run(&profile, activity, &recent, sensitivity) {
                if seen.insert(finding.reason.clone()) {
                    findings.push(finding);
                }
            }
        }

        if findings.is_empty() {
            return None;
        }
        EngineMetrics::add(&self.metrics.anomalies_detected, findings.len() as u64);

        let alert_type = alert_type_for(*entity_type, &findings);
        let mature = profile.sample_size > 0;
        self.alerts
            .raise(
                *entity_type,
                entity_id,
                alert_type,
                findings,
                mature.then_some(&profile),
                recent.len(),
            )
            .await
    }

    /// Refresh every entity's profile from its buffered activity.
    /// Failure for one entity does not abort the rest.
    pub async fn run_profile_refresh(&self) {
        for (entity_type, entity_id) in self.activities.entities().await {
            let activities = self.activities.snapshot(entity_type, &entity_id).await;
            let before = self
                .profiles
                .get_or_create(entity_type, &entity_id)
                .await
                .last_updated;
            let after = self
                .profiles
                .refresh(entity_type, &entity_id, &activities)
                .await;
            if after.last_updated > before {
                EngineMetrics::incr(&self.metrics.profiles_updated);
            }
        }
    }

    /// Escalation, retention cleanup, and the periodic sweeps.
    pub async fn run_alert_lifecycle(&self) {
        let escalated = self.alerts.escalate_due().await;
        if escalated > 0 {
            debug!(escalated, "Escalated unacknowledged alerts");
        }

        let purged = self.alerts.purge_expired().await;
        if purged > 0 {
            debug!(purged, "Purged terminal alerts past retention");
        }

        for alert in self.alerts.sweep_coordinated().await {
            self.mitigations.respond(&alert).await;
        }
        for alert in self.alerts.sweep_persistent().await {
            self.mitigations.respond(&alert).await;
        }
    }

    /// Operator dashboard summary.
    pub async fn dashboard_summary(&self) -> DashboardSummary {
        let counts = self.alerts.active_counts_by_severity().await;
        let by_severity = SeverityCounts {
            low: counts.get(&Severity::Low).copied().unwrap_or(0),
            medium: counts.get(&Severity::Medium).copied().unwrap_or(0),
            high: counts.get(&Severity::High).copied().unwrap_or(0),
            critical: counts.get(&Severity::Critical).copied().unwrap_or(0),
        };

        DashboardSummary {
            monitored_entities: self.activities.entity_count().await,
            active_alerts_total: by_severity.low
                + by_severity.medium
                + by_severity.high
                + by_severity.critical,
            active_alerts_by_severity: by_severity,
            alerts_last_24h: self.alerts.raised_last_24h().await,
            top_risk_entities: self
                .alerts
                .top_risk_entities(5)
                .await
                .into_iter()
                .map(|(entity_type, entity_id, score)| RiskEntry {
                    entity_type: entity_type.to_string(),
                    entity_id,
                    cumulative_score: score,
                })
                .collect(),
        }
    }
}

/// Reject payloads whose numbers make no sense before they reach the
/// buffer.
fn validate(activity: &Activity) -> Result<(), String> {
    let finite_nonneg = |name: &str, v: f64| -> Result<(), String> {
        if !v.is_finite() || v < 0.0 {
            Err(format!("{} must be finite and non-negative, got {}", name, v))
        } else {
            Ok(())
        }
    };

    match &activity.attributes {
        ActivityAttributes::Chat { duration_secs, .. } => {
            finite_nonneg("duration_secs", *duration_secs)
        }
        ActivityAttributes::Booking { cost, .. } => finite_nonneg("cost", *cost),
        ActivityAttributes::AgentOperation {
            error_rate,
            processing_time_ms,
            memory_mb,
            log_volume,
        } => {
            finite_nonneg("error_rate", *error_rate)?;
            if *error_rate > 1.0 {
                return Err(format!("error_rate must be <= 1.0, got {}", error_rate));
            }
            finite_nonneg("processing_time_ms", *processing_time_ms)?;
            finite_nonneg("memory_mb", *memory_mb)?;
            finite_nonneg("log_volume", *log_volume)
        }
        ActivityAttributes::SystemMetric { metric, value } => {
            if metric.is_empty() {
                return Err("metric name must not be empty".to_string());
            }
            if !value.is_finite() {
                return Err(format!("metric value must be finite, got {}", value));
            }
            Ok(())
        }
    }
}

fn alert_type_for(entity_type: EntityType, findings: &[AnomalyFinding]) -> &'static str {
    if findings.iter().any(|f| f.reason.contains("failed login")) {
        return ALERT_FAILED_LOGIN;
    }
    match entity_type {
        EntityType::User => ALERT_USER_BEHAVIOR,
        EntityType::Agent => ALERT_AGENT_BEHAVIOR,
        EntityType::System => ALERT_SYSTEM_BEHAVIOR,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeverityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub cumulative_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub monitored_entities: usize,
    pub active_alerts_total: usize,
    pub active_alerts_by_severity: SeverityCounts,
    pub alerts_last_24h: usize,
    pub top_risk_entities: Vec<RiskEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mitigate::LoggingResponseBackend;
    use crate::notify::TracingNotifier;
    use crate::ttlstore::MemoryTtlStore;

    fn engine() -> Arc<BehaviorEngine> {
        BehaviorEngine::new(
            EngineConfig::default(),
            Arc::new(MemoryTtlStore::new()),
            Arc::new(TracingNotifier),
            Arc::new(LoggingResponseBackend),
            None,
        )
    }

    fn chat(entity: &str, duration: f64, secs_ago: i64) -> Activity {
        Activity {
            entity_id: entity.to_string(),
            entity_type: EntityType::User,
            activity_type: "chat_session".to_string(),
            timestamp: Utc::now() - Duration::seconds(secs_ago),
            attributes: ActivityAttributes::Chat {
                duration_secs: duration,
                message_count: 10,
                failed_login: false,
            },
        }
    }

    #[tokio::test]
    async fn test_record_creates_profile() {
        let engine = engine();
        engine.record_activity(chat("u1", 300.0, 0)).await;

        assert_eq!(engine.profiles.len().await, 1);
        assert_eq!(engine.activities.len(EntityType::User, "u1").await, 1);
    }

    #[tokio::test]
    async fn test_malformed_activity_dropped() {
        let engine = engine();
        engine.record_activity(chat("u1", -5.0, 0)).await;
        engine.record_activity(chat("u1", f64::NAN, 0)).await;

        assert_eq!(engine.activities.len(EntityType::User, "u1").await, 0);
        // Subsequent valid activity still ingested
        engine.record_activity(chat("u1", 300.0, 0)).await;
        assert_eq!(engine.activities.len(EntityType::User, "u1").await, 1);
    }

    #[tokio::test]
    async fn test_detection_cycle_raises_alert() {
        let engine = engine();
        // Build a baseline of normal 600s sessions (hourly), then refresh
        for i in 0..20 {
            engine.record_activity(chat("u1", 600.0, 7200 + i * 3600)).await;
        }
        engine.run_profile_refresh().await;

        // An hour-long outlier session just now
        engine.record_activity(chat("u1", 3600.0, 0)).await;

        let raised = engine.run_detection_cycle().await;
        assert_eq!(raised, 1);

        let active = engine.alerts.active_alerts().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].alert_type, ALERT_USER_BEHAVIOR);
        assert!(active[0]
            .indicators
            .iter()
            .any(|i| i.contains("Unusually long session")));

        let snapshot = engine.metrics.snapshot();
        assert_eq!(snapshot.alerts_generated, 1);
        assert!(snapshot.anomalies_detected >= 1);
    }

    #[tokio::test]
    async fn test_quiet_entity_raises_nothing() {
        let engine = engine();
        for i in 0..20 {
            engine.record_activity(chat("u1", 600.0, 7200 + i * 3600)).await;
        }
        engine.run_profile_refresh().await;
        engine.record_activity(chat("u1", 620.0, 0)).await;

        assert_eq!(engine.run_detection_cycle().await, 0);
    }

    #[tokio::test]
    async fn test_dashboard_summary_counts() {
        let engine = engine();
        for i in 0..20 {
            engine.record_activity(chat("u1", 600.0, 7200 + i * 3600)).await;
        }
        engine.run_profile_refresh().await;
        engine.record_activity(chat("u1", 3600.0, 0)).await;
        engine.run_detection_cycle().await;

        let summary = engine.dashboard_summary().await;
        assert_eq!(summary.monitored_entities, 1);
        assert_eq!(summary.active_alerts_total, 1);
        assert_eq!(summary.alerts_last_24h, 1);
        assert_eq!(summary.top_risk_entities.len(), 1);
        assert_eq!(summary.top_risk_entities[0].entity_id, "u1");
    }

    #[tokio::test]
    async fn test_profile_refresh_updates_metrics() {
        let engine = engine();
        for i in 0..15 {
            engine.record_activity(chat("u1", 600.0, i * 60)).await;
        }
        engine.run_profile_refresh().await;

        assert_eq!(engine.metrics.snapshot().profiles_updated, 1);
        let profile = engine.profiles.get_or_create(EntityType::User, "u1").await;
        assert_eq!(profile.sample_size, 15);
    }
}
