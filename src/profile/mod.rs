//! Behavior profiles -- rolling statistical baselines of normal behavior,
//! one per (entity type, entity id).

pub mod store;

pub use store::ProfileStore;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::ingress::EntityType;

/// Rolling mean / standard deviation for one behavioral dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollingStat {
    pub mean: f64,
    pub std_dev: f64,
}

impl RollingStat {
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std_dev: std_dev(values),
        }
    }

    /// True once the baseline carries signal a detector can divide by.
    pub fn has_baseline(&self) -> bool {
        self.mean > 0.0
    }
}

/// Rolling baseline for a named system metric.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricBaseline {
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
}

/// Per-dimension anomaly-sensitivity thresholds. Each is the ratio (or
/// z-score) at which the corresponding detector check fires; independently
/// tunable per entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityThresholds {
    pub session_duration_ratio: f64,
    pub message_volume_ratio: f64,
    pub error_rate_ratio: f64,
    pub processing_time_ratio: f64,
    pub memory_ratio: f64,
    pub z_score: f64,
}

impl Default for SensitivityThresholds {
    fn default() -> Self {
        Self {
            session_duration_ratio: 3.0,
            message_volume_ratio: 2.5,
            error_rate_ratio: 3.0,
            processing_time_ratio: 2.0,
            memory_ratio: 1.5,
            z_score: 3.0,
        }
    }
}

/// Statistical baseline of one entity's normal behavior.
///
/// Created lazily on first activity, mutated only by the profile-refresh
/// loop, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub entity_type: EntityType,
    pub entity_id: String,

    /// Hours of day (0-23) the entity is normally active.
    pub typical_hours: BTreeSet<u32>,
    /// Weekdays (0 = Monday) the entity is normally active.
    pub typical_weekdays: BTreeSet<u32>,

    pub session_duration: RollingStat,
    pub actions_per_session: RollingStat,
    pub error_rate: RollingStat,
    pub processing_time: RollingStat,
    pub memory_usage: RollingStat,
    pub api_call_rate: RollingStat,

    /// Per-metric baselines for system entities.
    pub metric_baselines: BTreeMap<String, MetricBaseline>,

    pub thresholds: SensitivityThresholds,

    pub sample_size: u64,
    /// 0-1, grows with sample size up to a cap.
    pub confidence_score: f64,

    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl BehaviorProfile {
    /// Empty baseline for a newly observed entity.
    pub fn new(entity_type: EntityType, entity_id: &str) -> Self {
        let now = Utc::now();
        Self {
            entity_type,
            entity_id: entity_id.to_string(),
            typical_hours: BTreeSet::new(),
            typical_weekdays: BTreeSet::new(),
            session_duration: RollingStat::default(),
            actions_per_session: RollingStat::default(),
            error_rate: RollingStat::default(),
            processing_time: RollingStat::default(),
            memory_usage: RollingStat::default(),
            api_call_rate: RollingStat::default(),
            metric_baselines: BTreeMap::new(),
            thresholds: SensitivityThresholds::default(),
            sample_size: 0,
            confidence_score: 0.0,
            created_at: now,
            last_updated: now,
        }
    }

    /// Minimum circular distance in hours from `hour` to any typical hour.
    /// `None` when no typical hours have been learned yet.
    pub fn hour_distance(&self, hour: u32) -> Option<u32> {
        self.typical_hours
            .iter()
            .map(|&h| {
                let d = (h as i32 - hour as i32).unsigned_abs();
                d.min(24 - d)
            })
            .min()
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n-1 denominator).
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance_sum: f64 = values
        .iter()
        .map(|v| {
            let diff = m - *v;
            diff * diff
        })
        .sum();
    (variance_sum / (values.len() - 1) as f64).sqrt()
}

/// Observed (hour, weekday) pair for a timestamp, weekday 0 = Monday.
pub(crate) fn hour_and_weekday(ts: DateTime<Utc>) -> (u32, u32) {
    (ts.hour(), ts.weekday().num_days_from_monday())
}
