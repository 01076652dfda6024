//! Mitigation controller -- maps alert types to automated, time-boxed
//! response actions enforced as TTL-scoped facts in the external store.

pub mod backend;

pub use backend::{LoggingResponseBackend, ResponseBackend};

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

use crate::alerts::{
    SecurityAlert, ALERT_AGENT_BEHAVIOR, ALERT_COORDINATED_PREFIX, ALERT_FAILED_LOGIN,
    ALERT_PERSISTENT, ALERT_SYSTEM_BEHAVIOR,
};
use crate::ingress::EntityType;
use crate::monitor::metrics::EngineMetrics;
use crate::notify::{NotificationDispatcher, NotificationRequest};
use crate::ttlstore::TtlStore;

/// TTLs for each mitigation fact, in seconds.
const RATE_LIMIT_TTL: i64 = 3600;
const STEP_UP_AUTH_TTL: i64 = 24 * 3600;
const AGENT_ISOLATION_TTL: i64 = 30 * 60;
const TEMPORARY_BLOCK_TTL: i64 = 2 * 3600;
const ENHANCED_MONITORING_TTL: i64 = 24 * 3600;

/// Detector-threshold multiplier while enhanced monitoring is active.
const ENHANCED_SENSITIVITY: f64 = 0.7;

/// Bound on a single backend call.
const ACTION_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// A currently enforced mitigation, reconstructed from its TTL fact.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveMitigation {
    pub mitigation_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub expires_in_secs: i64,
}

pub struct MitigationController {
    ttl: Arc<dyn TtlStore>,
    backend: Arc<dyn ResponseBackend>,
    dispatcher: NotificationDispatcher,
    metrics: Arc<EngineMetrics>,
}

impl MitigationController {
    pub fn new(
        ttl: Arc<dyn TtlStore>,
        backend: Arc<dyn ResponseBackend>,
        dispatcher: NotificationDispatcher,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            ttl,
            backend,
            dispatcher,
            metrics,
        }
    }

    fn fact_key(mitigation_type: &str, entity_type: EntityType, entity_id: &str) -> String {
        format!("mitigation:{}:{}:{}", mitigation_type, entity_type, entity_id)
    }

    /// Execute the automated response actions for an alert. Actions are
    /// independent and best-effort; returns the names of those executed.
    pub async fn respond(&self, alert: &SecurityAlert) -> Vec<String> {
        let actions = actions_for(&alert.alert_type);
        let mut executed = Vec::new();

        for action in actions {
            match self.execute(&action, alert).await {
                Ok(()) => {
                    EngineMetrics::incr(&self.metrics.mitigations_applied);
                    info!(
                        alert_id = %alert.alert_id,
                        entity = %alert.entity_id,
                        action = action.name(),
                        "Mitigation applied"
                    );
                    executed.push(action.name().to_string());
                }
                Err(e) => {
                    warn!(
                        alert_id = %alert.alert_id,
                        action = action.name(),
                        "Mitigation failed: {}",
                        e
                    );
                }
            }
        }
        executed
    }

    async fn execute(&self, action: &ResponseAction, alert: &SecurityAlert) -> anyhow::Result<()> {
        let entity_type = alert.entity_type;
        let entity_id = alert.entity_id.as_str();

        match action {
            ResponseAction::RateLimit => {
                self.call(self.backend.apply_rate_limit(entity_type, entity_id, RATE_LIMIT_TTL))
                    .await?;
                self.write_fact("rate_limit", entity_type, entity_id, alert, RATE_LIMIT_TTL)
            }
            ResponseAction::StepUpAuth => {
                self.call(self.backend.require_step_up_auth(entity_id, STEP_UP_AUTH_TTL))
                    .await?;
                self.write_fact("step_up_auth", entity_type, entity_id, alert, STEP_UP_AUTH_TTL)
            }
            ResponseAction::IsolateAgent => {
                self.call(self.backend.isolate_agent(entity_id, AGENT_ISOLATION_TTL))
                    .await?;
                self.write_fact(
                    "agent_isolation",
                    entity_type,
                    entity_id,
                    alert,
                    AGENT_ISOLATION_TTL,
                )
            }
            ResponseAction::RestartAgent => {
                self.call(self.backend.restart_agent(entity_id)).await
            }
            ResponseAction::TemporaryBlock => {
                self.call(self.backend.temporary_block(entity_type, entity_id, TEMPORARY_BLOCK_TTL))
                    .await?;
                self.write_fact(
                    "temporary_block",
                    entity_type,
                    entity_id,
                    alert,
                    TEMPORARY_BLOCK_TTL,
                )
            }
            ResponseAction::EnhancedMonitoring => self.write_fact(
                "enhanced_monitoring",
                entity_type,
                entity_id,
                alert,
                ENHANCED_MONITORING_TTL,
            ),
            ResponseAction::ScaleResources => {
                self.call(self.backend.scale_resources(1.5, RATE_LIMIT_TTL)).await
            }
            ResponseAction::HealthCheck => self.call(self.backend.request_health_check()).await,
            ResponseAction::Notify(channel) => {
                self.dispatcher
                    .dispatch(&NotificationRequest {
                        channel: channel.to_string(),
                        alert_id: alert.alert_id,
                        entity_id: alert.entity_id.clone(),
                        severity: alert.severity,
                        title: alert.title.clone(),
                        description: alert.description.clone(),
                        indicators: alert.indicators.clone(),
                        timestamp: alert.detected_at,
                        priority: true,
                    })
                    .await;
                Ok(())
            }
        }
    }

    async fn call(
        &self,
        fut: impl std::future::Future<Output = anyhow::Result<()>>,
    ) -> anyhow::Result<()> {
        tokio::time::timeout(ACTION_TIMEOUT, fut)
            .await
            .map_err(|_| anyhow::anyhow!("backend call timed out"))?
    }

    fn write_fact(
        &self,
        mitigation_type: &str,
        entity_type: EntityType,
        entity_id: &str,
        alert: &SecurityAlert,
        ttl_secs: i64,
    ) -> anyhow::Result<()> {
        let key = Self::fact_key(mitigation_type, entity_type, entity_id);
        let value = serde_json::json!({
            "alert_id": alert.alert_id,
            "applied_at": Utc::now().to_rfc3339(),
        })
        .to_string();
        self.ttl
            .set(&key, &value, ttl_secs)
            .map_err(|e| anyhow::anyhow!("ttl store write failed: {}", e))
    }

    /// The detector sensitivity factor for an entity: lowered while
    /// enhanced monitoring is active.
    pub fn sensitivity_for(&self, entity_type: EntityType, entity_id: &str) -> f64 {
        let key = Self::fact_key("enhanced_monitoring", entity_type, entity_id);
        match self.ttl.get(&key) {
            Ok(Some(_)) => ENHANCED_SENSITIVITY,
            Ok(None) => 1.0,
            Err(e) => {
                warn!("TTL store unavailable for sensitivity lookup: {}", e);
                1.0
            }
        }
    }

    /// All currently enforced mitigations.
    pub fn active_mitigations(&self) -> Vec<ActiveMitigation> {
        let keys = match self.ttl.keys("mitigation:") {
            Ok(keys) => keys,
            Err(e) => {
                warn!("TTL store unavailable for mitigation listing: {}", e);
                return Vec::new();
            }
        };

        let mut mitigations = Vec::new();
        for key in keys {
            let mut parts = key.splitn(4, ':');
            let (Some(_), Some(mtype), Some(etype), Some(id)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let expires_in_secs = match self.ttl.ttl(&key) {
                Ok(Some(secs)) => secs,
                _ => continue,
            };
            mitigations.push(ActiveMitigation {
                mitigation_type: mtype.to_string(),
                entity_type: etype.to_string(),
                entity_id: id.to_string(),
                expires_in_secs,
            });
        }
        mitigations
    }

    /// Remove a mitigation early. Deletes exactly the keys matching the
    /// given type and entity id; returns how many were removed.
    pub fn remove(&self, mitigation_type: &str, entity_id: &str) -> usize {
        let prefix = format!("mitigation:{}:", mitigation_type);
        let keys = match self.ttl.keys(&prefix) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("TTL store unavailable for mitigation removal: {}", e);
                return 0;
            }
        };

        let suffix = format!(":{}", entity_id);
        let mut removed = 0;
        for key in keys.iter().filter(|k| k.ends_with(&suffix)) {
            if let Err(e) = self.ttl.delete(key) {
                warn!(key = %key, "Failed to delete mitigation: {}", e);
                continue;
            }
            info!(key = %key, "Mitigation removed");
            removed += 1;
        }
        removed
    }
}

/// One automated response step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResponseAction {
    RateLimit,
    StepUpAuth,
    IsolateAgent,
    RestartAgent,
    TemporaryBlock,
    EnhancedMonitoring,
    ScaleResources,
    HealthCheck,
    Notify(&'static str),
}

impl ResponseAction {
    fn name(&self) -> &'static str {
        match self {
            ResponseAction::RateLimit => "rate_limit",
            ResponseAction::StepUpAuth => "step_up_auth",
            ResponseAction::IsolateAgent => "agent_isolation",
            ResponseAction::RestartAgent => "agent_restart",
            ResponseAction::TemporaryBlock => "temporary_block",
            ResponseAction::EnhancedMonitoring => "enhanced_monitoring",
            ResponseAction::ScaleResources => "scale_resources",
            ResponseAction::HealthCheck => "health_check",
            ResponseAction::Notify(_) => "notify",
        }
    }
}

/// Fixed action lookup by alert type.
fn actions_for(alert_type: &str) -> Vec<ResponseAction> {
    if alert_type == ALERT_FAILED_LOGIN || alert_type == "security_unauthorized_access" {
        return vec![
            ResponseAction::RateLimit,
            ResponseAction::StepUpAuth,
            ResponseAction::Notify("security_team"),
        ];
    }
    if alert_type == ALERT_AGENT_BEHAVIOR || alert_type == "agent_health_issue" {
        return vec![
            ResponseAction::IsolateAgent,
            ResponseAction::RestartAgent,
            ResponseAction::Notify("admin"),
        ];
    }
    if alert_type.starts_with(ALERT_COORDINATED_PREFIX) || alert_type == ALERT_PERSISTENT {
        return vec![
            ResponseAction::TemporaryBlock,
            ResponseAction::EnhancedMonitoring,
            ResponseAction::Notify("security_team"),
        ];
    }
    if alert_type == ALERT_SYSTEM_BEHAVIOR {
        return vec![
            ResponseAction::ScaleResources,
            ResponseAction::HealthCheck,
            ResponseAction::Notify("operations"),
        ];
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertContext, AlertStatus, ALERT_USER_BEHAVIOR};
    use crate::detect::Severity;
    use crate::notify::TracingNotifier;
    use crate::ttlstore::{ManualClock, MemoryTtlStore};
    use chrono::Duration;
    use uuid::Uuid;

    fn alert(entity_type: EntityType, entity_id: &str, alert_type: &str) -> SecurityAlert {
        SecurityAlert {
            alert_id: Uuid::new_v4(),
            entity_id: entity_id.to_string(),
            entity_type,
            alert_type: alert_type.to_string(),
            severity: Severity::High,
            title: "test".to_string(),
            description: "test".to_string(),
            anomaly_score: 0.8,
            confidence: 0.8,
            indicators: vec![],
            context: AlertContext::default(),
            detected_at: Utc::now(),
            status: AlertStatus::New,
            status_changed_at: Utc::now(),
            resolution_notes: None,
        }
    }

    fn controller(ttl: Arc<MemoryTtlStore>) -> MitigationController {
        MitigationController::new(
            ttl.clone(),
            Arc::new(LoggingResponseBackend),
            NotificationDispatcher::new(Arc::new(TracingNotifier), ttl),
            Arc::new(EngineMetrics::default()),
        )
    }

    #[tokio::test]
    async fn test_failed_login_actions() {
        let ttl = Arc::new(MemoryTtlStore::new());
        let ctrl = controller(ttl.clone());

        let executed = ctrl
            .respond(&alert(EntityType::User, "u1", ALERT_FAILED_LOGIN))
            .await;

        assert_eq!(executed, vec!["rate_limit", "step_up_auth", "notify"]);
        assert!(ttl.get("mitigation:rate_limit:user:u1").unwrap().is_some());
        assert!(ttl.get("mitigation:step_up_auth:user:u1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_agent_anomaly_actions() {
        let ttl = Arc::new(MemoryTtlStore::new());
        let ctrl = controller(ttl.clone());

        let executed = ctrl
            .respond(&alert(EntityType::Agent, "scheduler", ALERT_AGENT_BEHAVIOR))
            .await;

        assert_eq!(executed, vec!["agent_isolation", "agent_restart", "notify"]);
        assert!(ttl
            .get("mitigation:agent_isolation:agent:scheduler")
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_persistent_anomaly_boosts_sensitivity() {
        let ttl = Arc::new(MemoryTtlStore::new());
        let ctrl = controller(ttl.clone());

        assert_eq!(ctrl.sensitivity_for(EntityType::User, "u1"), 1.0);
        ctrl.respond(&alert(EntityType::User, "u1", ALERT_PERSISTENT))
            .await;
        assert_eq!(ctrl.sensitivity_for(EntityType::User, "u1"), 0.7);
    }

    #[tokio::test]
    async fn test_unmapped_type_has_no_actions() {
        let ttl = Arc::new(MemoryTtlStore::new());
        let ctrl = controller(ttl.clone());

        let executed = ctrl
            .respond(&alert(EntityType::User, "u1", ALERT_USER_BEHAVIOR))
            .await;
        assert!(executed.is_empty());
        assert!(ctrl.active_mitigations().is_empty());
    }

    #[tokio::test]
    async fn test_mitigation_expires_with_clock() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ttl = Arc::new(MemoryTtlStore::with_clock(clock.clone()));
        let ctrl = controller(ttl.clone());

        ctrl.respond(&alert(EntityType::User, "u1", ALERT_FAILED_LOGIN))
            .await;
        assert!(!ctrl.active_mitigations().is_empty());

        // Rate limit (1h) expires; step-up auth (24h) survives
        clock.advance(Duration::seconds(3601));
        let remaining = ctrl.active_mitigations();
        assert!(remaining
            .iter()
            .all(|m| m.mitigation_type != "rate_limit"));
        assert!(remaining
            .iter()
            .any(|m| m.mitigation_type == "step_up_auth"));

        clock.advance(Duration::hours(24));
        assert!(ctrl.active_mitigations().is_empty());
    }

    #[tokio::test]
    async fn test_remove_deletes_only_matching_keys() {
        let ttl = Arc::new(MemoryTtlStore::new());
        let ctrl = controller(ttl.clone());

        ctrl.respond(&alert(EntityType::User, "u1", ALERT_FAILED_LOGIN))
            .await;
        ctrl.respond(&alert(EntityType::User, "u2", ALERT_FAILED_LOGIN))
            .await;

        let removed = ctrl.remove("rate_limit", "u1");
        assert_eq!(removed, 1);

        assert!(ttl.get("mitigation:rate_limit:user:u1").unwrap().is_none());
        // u2's rate limit and u1's step-up auth are untouched
        assert!(ttl.get("mitigation:rate_limit:user:u2").unwrap().is_some());
        assert!(ttl.get("mitigation:step_up_auth:user:u1").unwrap().is_some());
    }
}
