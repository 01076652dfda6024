//! Anomaly detection -- one detector per activity domain, each comparing a
//! new activity against the owning entity's behavior profile.

pub mod agent_op;
pub mod anomaly;
pub mod booking;
pub mod chat;
pub mod system;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingress::{Activity, ActivityAttributes};
use crate::profile::BehaviorProfile;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("insufficient baseline data: need {needed} samples, have {have}")]
    InsufficientBaseline { needed: usize, have: usize },
}

/// Severity levels for alerts, lowest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// One tier up, saturating at critical.
    pub fn escalated(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High => Severity::Critical,
            Severity::Critical => Severity::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => anyhow::bail!("unknown severity '{}'", other),
        }
    }
}

/// A single anomaly observation. The reason text carries the severity
/// keywords the scorer weighs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFinding {
    pub reason: String,
}

impl AnomalyFinding {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Run the detector matching the activity's domain.
///
/// `recent` is the entity's buffered history, oldest first; `sensitivity`
/// scales the upper trigger thresholds (0.7 while enhanced monitoring is
/// active, 1.0 otherwise). Checks that cannot compute a ratio against an
/// immature profile are skipped, never errors.
pub fn run(
    profile: &BehaviorProfile,
    activity: &Activity,
    recent: &[Activity],
    sensitivity: f64,
) -> Vec<AnomalyFinding> {
    match &activity.attributes {
        ActivityAttributes::Chat { .. } => chat::detect(profile, activity, recent, sensitivity),
        ActivityAttributes::Booking { .. } => {
            booking::detect(profile, activity, recent, sensitivity)
        }
        ActivityAttributes::AgentOperation { .. } => {
            agent_op::detect(profile, activity, recent, sensitivity)
        }
        ActivityAttributes::SystemMetric { .. } => {
            system::detect(profile, activity, recent, sensitivity)
        }
    }
}
