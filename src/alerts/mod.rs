//! Security alerts -- the stateful records raised when aggregated findings
//! cross the alert threshold.

pub mod manager;
pub mod store;

pub use manager::AlertManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detect::Severity;
use crate::ingress::EntityType;

/// Alert raised for anomalous user activity.
pub const ALERT_USER_BEHAVIOR: &str = "user_behavior_anomaly";
/// Alert raised for anomalous agent operations.
pub const ALERT_AGENT_BEHAVIOR: &str = "agent_behavior_anomaly";
/// Alert raised for anomalous system metrics.
pub const ALERT_SYSTEM_BEHAVIOR: &str = "system_behavior_anomaly";
/// Alert raised on a burst of failed logins.
pub const ALERT_FAILED_LOGIN: &str = "security_failed_login";
/// Synthesized when several related alerts correlate.
pub const ALERT_CORRELATED: &str = "correlated_security_events";
/// Synthesized when one entity keeps alerting over days.
pub const ALERT_PERSISTENT: &str = "persistent_anomaly";
/// Prefix for synthesized coordinated-anomaly alerts.
pub const ALERT_COORDINATED_PREFIX: &str = "coordinated_";

/// Alert lifecycle states. Transitions only move forward; terminal states
/// are never revived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Investigating,
    Resolved,
    FalsePositive,
    Escalated,
}

impl AlertStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::FalsePositive)
    }

    /// Whether moving to `next` is a legal forward transition.
    pub fn can_transition_to(self, next: AlertStatus) -> bool {
        match self {
            AlertStatus::New => matches!(
                next,
                AlertStatus::Investigating
                    | AlertStatus::Resolved
                    | AlertStatus::FalsePositive
                    | AlertStatus::Escalated
            ),
            AlertStatus::Investigating | AlertStatus::Escalated => {
                matches!(next, AlertStatus::Resolved | AlertStatus::FalsePositive)
            }
            AlertStatus::Resolved | AlertStatus::FalsePositive => false,
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::New => write!(f, "new"),
            AlertStatus::Investigating => write!(f, "investigating"),
            AlertStatus::Resolved => write!(f, "resolved"),
            AlertStatus::FalsePositive => write!(f, "false_positive"),
            AlertStatus::Escalated => write!(f, "escalated"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(AlertStatus::New),
            "investigating" => Ok(AlertStatus::Investigating),
            "resolved" => Ok(AlertStatus::Resolved),
            "false_positive" => Ok(AlertStatus::FalsePositive),
            "escalated" => Ok(AlertStatus::Escalated),
            other => anyhow::bail!("unknown alert status '{}'", other),
        }
    }
}

/// Structured snapshot captured when the alert is raised.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertContext {
    /// Summary of the entity's profile at detection time.
    pub profile_summary: Option<ProfileSummary>,
    /// Activities buffered for the entity at detection time.
    pub recent_activity_count: usize,
    /// Historical alerts for the entity (trailing week).
    pub historical_alert_count: usize,
    /// Derived risk factors, e.g. "High alert frequency".
    pub risk_factors: Vec<String>,
    /// Ids of alerts this one was correlated with.
    #[serde(default)]
    pub related_alert_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub sample_size: u64,
    pub confidence_score: f64,
    pub typical_hours: Vec<u32>,
}

/// A raised security alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub alert_id: Uuid,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub alert_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub anomaly_score: f64,
    pub confidence: f64,
    /// Ordered finding reasons.
    pub indicators: Vec<String>,
    pub context: AlertContext,
    pub detected_at: DateTime<Utc>,
    pub status: AlertStatus,
    /// When the status last changed; drives retention of terminal alerts.
    pub status_changed_at: DateTime<Utc>,
    pub resolution_notes: Option<String>,
}

impl SecurityAlert {
    /// Apply a forward-only status transition.
    pub fn transition(&mut self, next: AlertStatus, now: DateTime<Utc>) -> anyhow::Result<()> {
        if !self.status.can_transition_to(next) {
            anyhow::bail!(
                "illegal alert transition {} -> {} for {}",
                self.status,
                next,
                self.alert_id
            );
        }
        self.status = next;
        self.status_changed_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> SecurityAlert {
        SecurityAlert {
            alert_id: Uuid::new_v4(),
            entity_id: "u1".to_string(),
            entity_type: EntityType::User,
            alert_type: ALERT_USER_BEHAVIOR.to_string(),
            severity: Severity::High,
            title: "test".to_string(),
            description: "test".to_string(),
            anomaly_score: 0.6,
            confidence: 0.7,
            indicators: vec![],
            context: AlertContext::default(),
            detected_at: Utc::now(),
            status: AlertStatus::New,
            status_changed_at: Utc::now(),
            resolution_notes: None,
        }
    }

    #[test]
    fn test_forward_transitions_allowed() {
        let mut a = alert();
        a.transition(AlertStatus::Investigating, Utc::now()).unwrap();
        a.transition(AlertStatus::Resolved, Utc::now()).unwrap();
        assert!(a.status.is_terminal());
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut a = alert();
        a.transition(AlertStatus::Resolved, Utc::now()).unwrap();
        assert!(a.transition(AlertStatus::Investigating, Utc::now()).is_err());
        assert!(a.transition(AlertStatus::Escalated, Utc::now()).is_err());
    }

    #[test]
    fn test_escalated_can_still_resolve() {
        let mut a = alert();
        a.transition(AlertStatus::Escalated, Utc::now()).unwrap();
        a.transition(AlertStatus::Resolved, Utc::now()).unwrap();
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut a = alert();
        a.transition(AlertStatus::Investigating, Utc::now()).unwrap();
        assert!(a.transition(AlertStatus::Escalated, Utc::now()).is_err());
    }
}
