//! Profile store -- owns one profile per entity, refreshes baselines from
//! buffered activity, and caches refreshed profiles in the TTL store.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::ingress::{Activity, ActivityAttributes, EntityKey, EntityType};
use crate::profile::{
    hour_and_weekday, mean, std_dev, BehaviorProfile, MetricBaseline, RollingStat,
};
use crate::ttlstore::TtlStore;

/// Minimum buffered activities before a refresh updates the baseline.
const MIN_REFRESH_SAMPLES: usize = 10;

/// Cached profile expiry in the TTL store.
const PROFILE_CACHE_TTL_SECS: i64 = 24 * 3600;

pub struct ProfileStore {
    profiles: RwLock<HashMap<EntityKey, BehaviorProfile>>,
    ttl: Arc<dyn TtlStore>,
}

impl ProfileStore {
    pub fn new(ttl: Arc<dyn TtlStore>) -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn cache_key(entity_type: EntityType, entity_id: &str) -> String {
        format!("profile:{}:{}", entity_type, entity_id)
    }

    /// Get the entity's profile, creating an empty baseline on first call.
    pub async fn get_or_create(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> BehaviorProfile {
        {
            let profiles = self.profiles.read().await;
            if let Some(profile) = profiles.get(&(entity_type, entity_id.to_string())) {
                return profile.clone();
            }
        }

        let mut profiles = self.profiles.write().await;
        profiles
            .entry((entity_type, entity_id.to_string()))
            .or_insert_with(|| BehaviorProfile::new(entity_type, entity_id))
            .clone()
    }

    /// Number of known profiles.
    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    /// Recompute the rolling baseline from buffered activities.
    ///
    /// A no-op below [`MIN_REFRESH_SAMPLES`]. The refreshed profile is
    /// cached in the TTL store with a 24h expiry, best-effort.
    pub async fn refresh(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        activities: &[Activity],
    ) -> BehaviorProfile {
        let mut profile = self.get_or_create(entity_type, entity_id).await;

        if activities.len() < MIN_REFRESH_SAMPLES {
            debug!(
                entity = %entity_id,
                samples = activities.len(),
                "Skipping profile refresh, insufficient samples"
            );
            return profile;
        }

        for activity in activities {
            let (hour, weekday) = hour_and_weekday(activity.timestamp);
            profile.typical_hours.insert(hour);
            profile.typical_weekdays.insert(weekday);
        }

        match entity_type {
            EntityType::User => refresh_user(&mut profile, activities),
            EntityType::Agent => refresh_agent(&mut profile, activities),
            EntityType::System => refresh_system(&mut profile, activities),
        }

        profile.api_call_rate = api_call_rate(activities);
        profile.sample_size = activities.len() as u64;
        profile.confidence_score = (profile.sample_size as f64 / 100.0).min(1.0);
        profile.last_updated = Utc::now();

        {
            let mut profiles = self.profiles.write().await;
            profiles.insert((entity_type, entity_id.to_string()), profile.clone());
        }

        self.persist(&profile);
        profile
    }

    /// Cache the profile in the TTL store. Failures are logged and ignored;
    /// the in-memory profile stays authoritative.
    fn persist(&self, profile: &BehaviorProfile) {
        let key = Self::cache_key(profile.entity_type, &profile.entity_id);
        let json = match serde_json::to_string(profile) {
            Ok(json) => json,
            Err(e) => {
                warn!(entity = %profile.entity_id, "Failed to serialize profile: {}", e);
                return;
            }
        };
        if let Err(e) = self.ttl.set(&key, &json, PROFILE_CACHE_TTL_SECS) {
            warn!(entity = %profile.entity_id, "Failed to cache profile: {}", e);
        }
    }

    /// Load a cached profile from the TTL store, if present.
    pub fn load_cached(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Option<BehaviorProfile> {
        let key = Self::cache_key(entity_type, entity_id);
        match self.ttl.get(&key) {
            Ok(Some(json)) => serde_json::from_str(&json)
                .map_err(|e| warn!(entity = %entity_id, "Corrupt cached profile: {}", e))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(entity = %entity_id, "TTL store unavailable: {}", e);
                None
            }
        }
    }
}

/// User baselines: session duration and actions per session.
fn refresh_user(profile: &mut BehaviorProfile, activities: &[Activity]) {
    let mut durations = Vec::new();
    let mut actions = Vec::new();
    for activity in activities {
        if let ActivityAttributes::Chat {
            duration_secs,
            message_count,
            ..
        } = &activity.attributes
        {
            durations.push(*duration_secs);
            actions.push(*message_count as f64);
        }
    }
    if !durations.is_empty() {
        profile.session_duration = RollingStat::from_values(&durations);
        profile.actions_per_session = RollingStat::from_values(&actions);
    }
}

/// Agent baselines: error rate, processing time, memory usage.
fn refresh_agent(profile: &mut BehaviorProfile, activities: &[Activity]) {
    let mut error_rates = Vec::new();
    let mut processing = Vec::new();
    let mut memory = Vec::new();
    for activity in activities {
        if let ActivityAttributes::AgentOperation {
            error_rate,
            processing_time_ms,
            memory_mb,
            ..
        } = &activity.attributes
        {
            error_rates.push(*error_rate);
            processing.push(*processing_time_ms);
            memory.push(*memory_mb);
        }
    }
    if !error_rates.is_empty() {
        profile.error_rate = RollingStat::from_values(&error_rates);
        profile.processing_time = RollingStat::from_values(&processing);
        profile.memory_usage = RollingStat::from_values(&memory);
    }
}

/// System baselines: per-metric mean/stddev/max.
fn refresh_system(profile: &mut BehaviorProfile, activities: &[Activity]) {
    let mut by_metric: HashMap<&str, Vec<f64>> = HashMap::new();
    for activity in activities {
        if let ActivityAttributes::SystemMetric { metric, value } = &activity.attributes {
            by_metric.entry(metric.as_str()).or_default().push(*value);
        }
    }
    for (metric, values) in by_metric {
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        profile.metric_baselines.insert(
            metric.to_string(),
            MetricBaseline {
                mean: mean(&values),
                std_dev: std_dev(&values),
                max,
            },
        );
    }
}

/// Activities per hour over the buffer's time span.
fn api_call_rate(activities: &[Activity]) -> RollingStat {
    let first = match activities.first() {
        Some(a) => a.timestamp,
        None => return RollingStat::default(),
    };
    let last = match activities.last() {
        Some(a) => a.timestamp,
        None => return RollingStat::default(),
    };
    let span_hours = (last - first).num_seconds().max(1) as f64 / 3600.0;
    RollingStat {
        mean: activities.len() as f64 / span_hours.max(1.0 / 60.0),
        std_dev: 0.0,
    }
}
