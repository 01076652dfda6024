//! Alert manager -- owns the alert lifecycle: creation, suppression,
//! correlation, coordinated/persistent sweeps, escalation, and retention.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::store::AlertStore;
use crate::alerts::{
    AlertContext, AlertStatus, ProfileSummary, SecurityAlert, ALERT_COORDINATED_PREFIX,
    ALERT_CORRELATED, ALERT_FAILED_LOGIN, ALERT_PERSISTENT,
};
use crate::detect::{AnomalyFinding, Severity};
use crate::ingress::EntityType;
use crate::monitor::metrics::EngineMetrics;
use crate::notify::{NotificationDispatcher, NotificationRequest};
use crate::profile::BehaviorProfile;
use crate::score::{self, ScoreContext};

/// Alert-lifecycle tunables.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    /// Minimum anomaly score before an alert is stored.
    pub alert_threshold: f64,
    /// Bounded history log capacity.
    pub history_capacity: usize,
    /// Unacknowledged high/critical alerts escalate after this long.
    pub escalation_after: Duration,
    /// Terminal alerts leave the active set after this long.
    pub retention: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            alert_threshold: 0.4,
            history_capacity: 1000,
            escalation_after: Duration::minutes(15),
            retention: Duration::hours(24),
        }
    }
}

/// Correlation scoring weights. These encode alerting behavior; treat
/// them as data, not tunables.
const CORRELATION_SAME_TYPE: f64 = 0.4;
const CORRELATION_CLOSE_IN_TIME: f64 = 0.3;
const CORRELATION_SHARED_INDICATOR: f64 = 0.2;
const CORRELATION_SAME_ENTITY_TYPE: f64 = 0.1;
const CORRELATION_RELATED_CUTOFF: f64 = 0.5;

/// Alerts of one type within an hour before a coordinated sweep fires.
const COORDINATED_GROUP_SIZE: usize = 3;
/// Alerts per entity over a week before a persistent sweep fires.
const PERSISTENT_ALERT_COUNT: usize = 5;

pub struct AlertManager {
    active: RwLock<HashMap<Uuid, SecurityAlert>>,
    history: RwLock<VecDeque<SecurityAlert>>,
    store: Option<AlertStore>,
    dispatcher: NotificationDispatcher,
    metrics: Arc<EngineMetrics>,
    policy: AlertPolicy,
}

impl AlertManager {
    pub fn new(
        dispatcher: NotificationDispatcher,
        store: Option<AlertStore>,
        metrics: Arc<EngineMetrics>,
        policy: AlertPolicy,
    ) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            store,
            dispatcher,
            metrics,
            policy,
        }
    }

    /// Score findings and raise an alert unless the threshold or a
    /// suppression rule says otherwise. Returns the stored alert.
    pub async fn raise(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        alert_type: &str,
        findings: Vec<AnomalyFinding>,
        profile: Option<&BehaviorProfile>,
        buffered_activities: usize,
    ) -> Option<SecurityAlert> {
        if findings.is_empty() {
            return None;
        }
        let now = Utc::now();

        let ctx = self.score_context(entity_type, entity_id, alert_type, buffered_activities, now).await;
        let outcome = score::score(&findings, profile, &ctx);

        if outcome.anomaly_score < self.policy.alert_threshold {
            debug!(
                entity = %entity_id,
                score = outcome.anomaly_score,
                "Anomaly below alert threshold"
            );
            return None;
        }

        if self
            .is_suppressed(entity_type, entity_id, alert_type, outcome.confidence, now)
            .await
        {
            EngineMetrics::incr(&self.metrics.alerts_suppressed);
            debug!(entity = %entity_id, alert_type, "Alert suppressed");
            return None;
        }

        let context = self
            .build_context(entity_type, entity_id, profile, buffered_activities, now)
            .await;

        let indicators: Vec<String> = findings.into_iter().map(|f| f.reason).collect();
        let alert = SecurityAlert {
            alert_id: Uuid::new_v4(),
            entity_id: entity_id.to_string(),
            entity_type,
            alert_type: alert_type.to_string(),
            severity: outcome.severity,
            title: format!(
                "{} for {} {}",
                humanize(alert_type),
                entity_type,
                entity_id
            ),
            description: indicators.join("; "),
            anomaly_score: outcome.anomaly_score,
            confidence: outcome.confidence,
            indicators,
            context,
            detected_at: now,
            status: AlertStatus::New,
            status_changed_at: now,
            resolution_notes: None,
        };

        self.insert(alert.clone()).await;
        EngineMetrics::incr(&self.metrics.alerts_generated);
        info!(
            alert_id = %alert.alert_id,
            entity = %entity_id,
            severity = %alert.severity,
            score = alert.anomaly_score,
            "Alert raised: {}",
            alert.title
        );

        self.dispatcher
            .dispatch(&notification_for(&alert, false))
            .await;

        self.correlate(&alert, now).await;

        Some(alert)
    }

    /// Insert an externally constructed alert (synthesized sweeps, restore
    /// from durable storage, tests). Bypasses scoring and suppression.
    pub async fn insert(&self, alert: SecurityAlert) {
        {
            let mut active = self.active.write().await;
            active.insert(alert.alert_id, alert.clone());
        }
        {
            let mut history = self.history.write().await;
            if history.len() >= self.policy.history_capacity {
                history.pop_front();
            }
            history.push_back(alert.clone());
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&alert) {
                warn!(alert_id = %alert.alert_id, "Failed to persist alert: {}", e);
            }
        }
    }

    async fn score_context(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        alert_type: &str,
        buffered_activities: usize,
        now: DateTime<Utc>,
    ) -> ScoreContext {
        let history = self.history.read().await;
        let day_ago = now - Duration::hours(24);
        let two_days_ago = now - Duration::hours(48);

        let alerts_last_24h = history
            .iter()
            .filter(|a| {
                a.entity_type == entity_type
                    && a.entity_id == entity_id
                    && a.detected_at > day_ago
            })
            .count();
        let high_or_critical_last_48h = history
            .iter()
            .filter(|a| {
                a.entity_type == entity_type
                    && a.entity_id == entity_id
                    && a.detected_at > two_days_ago
                    && a.severity >= Severity::High
            })
            .count();

        ScoreContext {
            alert_type: alert_type.to_string(),
            alerts_last_24h,
            high_or_critical_last_48h,
            buffered_activities,
        }
    }

    /// Suppress when the entity already alerted twice for this type within
    /// the hour, or when a low-confidence alert would shadow a recent
    /// high-confidence one.
    async fn is_suppressed(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        alert_type: &str,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let active = self.active.read().await;
        let hour_ago = now - Duration::minutes(60);
        let half_hour_ago = now - Duration::minutes(30);

        let same_type_last_hour = active
            .values()
            .filter(|a| {
                a.entity_type == entity_type
                    && a.entity_id == entity_id
                    && a.alert_type == alert_type
                    && a.detected_at > hour_ago
            })
            .count();
        if same_type_last_hour >= 2 {
            return true;
        }

        if confidence < 0.6 {
            let confident_recent = active.values().any(|a| {
                a.entity_type == entity_type
                    && a.entity_id == entity_id
                    && a.confidence > 0.8
                    && a.detected_at > half_hour_ago
            });
            if confident_recent {
                return true;
            }
        }

        false
    }

    async fn build_context(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        profile: Option<&BehaviorProfile>,
        buffered_activities: usize,
        now: DateTime<Utc>,
    ) -> AlertContext {
        let history = self.history.read().await;
        let week_ago = now - Duration::days(7);
        let day_ago = now - Duration::hours(24);

        let historical: Vec<&SecurityAlert> = history
            .iter()
            .filter(|a| {
                a.entity_type == entity_type
                    && a.entity_id == entity_id
                    && a.detected_at > week_ago
            })
            .collect();

        let mut risk_factors = Vec::new();
        if historical.len() > 5 {
            risk_factors.push("High alert frequency".to_string());
        }
        if entity_type == EntityType::User {
            let failed_logins_24h = historical
                .iter()
                .filter(|a| a.alert_type == ALERT_FAILED_LOGIN && a.detected_at > day_ago)
                .count();
            if failed_logins_24h > 2 {
                risk_factors.push("Multiple failed login attempts".to_string());
            }
        }

        AlertContext {
            profile_summary: profile.map(|p| ProfileSummary {
                sample_size: p.sample_size,
                confidence_score: p.confidence_score,
                typical_hours: p.typical_hours.iter().copied().collect(),
            }),
            recent_activity_count: buffered_activities,
            historical_alert_count: historical.len(),
            risk_factors,
            related_alert_ids: Vec::new(),
        }
    }

    /// Scan active alerts from the last 2 hours for alerts related to the
    /// trigger; two or more related alerts synthesize one correlated alert.
    async fn correlate(&self, trigger: &SecurityAlert, now: DateTime<Utc>) {
        let related: Vec<Uuid> = {
            let active = self.active.read().await;
            let two_hours_ago = now - Duration::hours(2);
            active
                .values()
                .filter(|a| a.alert_id != trigger.alert_id && a.detected_at > two_hours_ago)
                .filter(|a| !is_synthetic(&a.alert_type))
                .filter(|a| correlation_score(trigger, a) >= CORRELATION_RELATED_CUTOFF)
                .map(|a| a.alert_id)
                .collect()
        };

        if related.len() < 2 {
            return;
        }

        let mut related_ids = vec![trigger.alert_id];
        related_ids.extend(&related);

        let alert = SecurityAlert {
            alert_id: Uuid::new_v4(),
            entity_id: trigger.entity_id.clone(),
            entity_type: trigger.entity_type,
            alert_type: ALERT_CORRELATED.to_string(),
            severity: Severity::High,
            title: format!(
                "Correlated security events around {} {}",
                trigger.entity_type, trigger.entity_id
            ),
            description: format!(
                "{} related alerts detected within 2 hours",
                related_ids.len()
            ),
            anomaly_score: 0.9,
            confidence: 0.85,
            indicators: related_ids.iter().map(|id| id.to_string()).collect(),
            context: AlertContext {
                related_alert_ids: related_ids,
                ..AlertContext::default()
            },
            detected_at: now,
            status: AlertStatus::New,
            status_changed_at: now,
            resolution_notes: None,
        };

        info!(
            alert_id = %alert.alert_id,
            related = related.len() + 1,
            "Synthesized correlated-events alert"
        );
        self.insert(alert.clone()).await;
        EngineMetrics::incr(&self.metrics.alerts_generated);
        self.dispatcher
            .dispatch(&notification_for(&alert, false))
            .await;
    }

    /// Group alerts raised in the last hour by type; a group of three or
    /// more produces one coordinated alert. Idempotent within the window.
    /// Returns the synthesized alerts so the caller can trigger mitigation.
    pub async fn sweep_coordinated(&self) -> Vec<SecurityAlert> {
        let now = Utc::now();
        let hour_ago = now - Duration::minutes(60);

        let groups: HashMap<String, usize> = {
            let history = self.history.read().await;
            let mut groups: HashMap<String, usize> = HashMap::new();
            for alert in history.iter() {
                if alert.detected_at > hour_ago && !is_synthetic(&alert.alert_type) {
                    *groups.entry(alert.alert_type.clone()).or_default() += 1;
                }
            }
            groups
        };

        let mut created = Vec::new();
        for (alert_type, count) in groups {
            if count < COORDINATED_GROUP_SIZE {
                continue;
            }
            let coordinated_type = format!("{}{}", ALERT_COORDINATED_PREFIX, alert_type);

            let already_open = {
                let active = self.active.read().await;
                active.values().any(|a| {
                    a.alert_type == coordinated_type && a.detected_at > hour_ago
                })
            };
            if already_open {
                continue;
            }

            let alert = SecurityAlert {
                alert_id: Uuid::new_v4(),
                entity_id: "multiple".to_string(),
                entity_type: EntityType::System,
                alert_type: coordinated_type,
                severity: Severity::High,
                title: format!("Coordinated {} across entities", humanize(&alert_type)),
                description: format!(
                    "{} {} alerts within one hour suggest a coordinated pattern",
                    count, alert_type
                ),
                anomaly_score: 0.85,
                confidence: 0.8,
                indicators: vec![format!("{} alerts of type {}", count, alert_type)],
                context: AlertContext::default(),
                detected_at: now,
                status: AlertStatus::New,
                status_changed_at: now,
                resolution_notes: None,
            };
            info!(alert_type = %alert.alert_type, count, "Synthesized coordinated-anomaly alert");
            self.insert(alert.clone()).await;
            EngineMetrics::incr(&self.metrics.alerts_generated);
            self.dispatcher
                .dispatch(&notification_for(&alert, false))
                .await;
            created.push(alert);
        }
        created
    }

    /// Entities with five or more alerts over the trailing week get one
    /// persistent-anomaly alert while none is open. Returns the
    /// synthesized alerts so the caller can trigger mitigation.
    pub async fn sweep_persistent(&self) -> Vec<SecurityAlert> {
        let now = Utc::now();
        let week_ago = now - Duration::days(7);

        let counts: HashMap<(EntityType, String), usize> = {
            let history = self.history.read().await;
            let mut counts: HashMap<(EntityType, String), usize> = HashMap::new();
            for alert in history.iter() {
                if alert.detected_at > week_ago && alert.alert_type != ALERT_PERSISTENT {
                    *counts
                        .entry((alert.entity_type, alert.entity_id.clone()))
                        .or_default() += 1;
                }
            }
            counts
        };

        let mut created = Vec::new();
        for ((entity_type, entity_id), count) in counts {
            if count < PERSISTENT_ALERT_COUNT {
                continue;
            }

            let already_open = {
                let active = self.active.read().await;
                active.values().any(|a| {
                    a.alert_type == ALERT_PERSISTENT
                        && a.entity_type == entity_type
                        && a.entity_id == entity_id
                        && !a.status.is_terminal()
                })
            };
            if already_open {
                continue;
            }

            let alert = SecurityAlert {
                alert_id: Uuid::new_v4(),
                entity_id: entity_id.clone(),
                entity_type,
                alert_type: ALERT_PERSISTENT.to_string(),
                severity: Severity::High,
                title: format!("Persistent anomaly for {} {}", entity_type, entity_id),
                description: format!("{} alerts in the trailing 7 days", count),
                anomaly_score: 0.85,
                confidence: 0.9,
                indicators: vec![format!("{} alerts in 7 days", count)],
                context: AlertContext::default(),
                detected_at: now,
                status: AlertStatus::New,
                status_changed_at: now,
                resolution_notes: None,
            };
            info!(entity = %entity_id, count, "Synthesized persistent-anomaly alert");
            self.insert(alert.clone()).await;
            EngineMetrics::incr(&self.metrics.alerts_generated);
            self.dispatcher
                .dispatch(&notification_for(&alert, false))
                .await;
            created.push(alert);
        }
        created
    }

    /// Escalate unacknowledged high/critical alerts older than the policy
    /// window and request a priority notification for each.
    pub async fn escalate_due(&self) -> usize {
        let now = Utc::now();
        let mut escalated = Vec::new();
        {
            let mut active = self.active.write().await;
            for alert in active.values_mut() {
                if alert.severity >= Severity::High
                    && alert.status == AlertStatus::New
                    && now - alert.detected_at >= self.policy.escalation_after
                {
                    if let Err(e) = alert.transition(AlertStatus::Escalated, now) {
                        warn!(alert_id = %alert.alert_id, "Escalation failed: {}", e);
                        continue;
                    }
                    escalated.push(alert.clone());
                }
            }
        }

        for alert in &escalated {
            info!(alert_id = %alert.alert_id, severity = %alert.severity, "Alert escalated");
            if let Some(store) = &self.store {
                if let Err(e) = store.save(alert) {
                    warn!(alert_id = %alert.alert_id, "Failed to persist escalation: {}", e);
                }
            }
            self.dispatcher
                .dispatch(&notification_for(alert, true))
                .await;
        }
        escalated.len()
    }

    /// Drop terminal alerts from the active set once the retention window
    /// has passed. They remain in the history log.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut active = self.active.write().await;
        let before = active.len();
        active.retain(|_, a| {
            !(a.status.is_terminal() && now - a.status_changed_at >= self.policy.retention)
        });
        before - active.len()
    }

    /// Operator transition: mark an alert under investigation.
    pub async fn acknowledge(&self, alert_id: Uuid) -> anyhow::Result<SecurityAlert> {
        self.apply_transition(alert_id, AlertStatus::Investigating, None)
            .await
    }

    /// Operator transition: resolve an alert with notes.
    pub async fn resolve(&self, alert_id: Uuid, notes: &str) -> anyhow::Result<SecurityAlert> {
        self.apply_transition(alert_id, AlertStatus::Resolved, Some(notes))
            .await
    }

    /// Operator transition: close an alert as a false positive.
    pub async fn mark_false_positive(
        &self,
        alert_id: Uuid,
        notes: &str,
    ) -> anyhow::Result<SecurityAlert> {
        self.apply_transition(alert_id, AlertStatus::FalsePositive, Some(notes))
            .await
    }

    async fn apply_transition(
        &self,
        alert_id: Uuid,
        next: AlertStatus,
        notes: Option<&str>,
    ) -> anyhow::Result<SecurityAlert> {
        let now = Utc::now();
        let updated = {
            let mut active = self.active.write().await;
            let alert = active
                .get_mut(&alert_id)
                .ok_or_else(|| anyhow::anyhow!("alert {} not found", alert_id))?;
            alert.transition(next, now)?;
            if let Some(notes) = notes {
                alert.resolution_notes = Some(notes.to_string());
            }
            alert.clone()
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&updated) {
                warn!(alert_id = %alert_id, "Failed to persist transition: {}", e);
            }
        }
        Ok(updated)
    }

    /// Active alerts, newest first.
    pub async fn active_alerts(&self) -> Vec<SecurityAlert> {
        let active = self.active.read().await;
        let mut alerts: Vec<SecurityAlert> = active.values().cloned().collect();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        alerts
    }

    pub async fn get(&self, alert_id: Uuid) -> Option<SecurityAlert> {
        self.active.read().await.get(&alert_id).cloned()
    }

    /// Active (non-terminal) alert counts by severity.
    pub async fn active_counts_by_severity(&self) -> HashMap<Severity, usize> {
        let active = self.active.read().await;
        let mut counts = HashMap::new();
        for alert in active.values().filter(|a| !a.status.is_terminal()) {
            *counts.entry(alert.severity).or_default() += 1;
        }
        counts
    }

    /// Alerts raised in the trailing 24 hours.
    pub async fn raised_last_24h(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(24);
        let history = self.history.read().await;
        history.iter().filter(|a| a.detected_at > cutoff).count()
    }

    /// Top entities by cumulative anomaly score over the trailing week.
    pub async fn top_risk_entities(&self, limit: usize) -> Vec<(EntityType, String, f64)> {
        let week_ago = Utc::now() - Duration::days(7);
        let history = self.history.read().await;

        let mut scores: HashMap<(EntityType, String), f64> = HashMap::new();
        for alert in history.iter().filter(|a| a.detected_at > week_ago) {
            *scores
                .entry((alert.entity_type, alert.entity_id.clone()))
                .or_default() += alert.anomaly_score;
        }

        let mut ranked: Vec<(EntityType, String, f64)> = scores
            .into_iter()
            .map(|((t, id), s)| (t, id, s))
            .collect();
        ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        ranked
    }
}

/// Alert types the engine synthesizes itself; excluded from grouping so
/// sweeps and correlation cannot feed back on their own output.
fn is_synthetic(alert_type: &str) -> bool {
    alert_type == ALERT_CORRELATED
        || alert_type == ALERT_PERSISTENT
        || alert_type.starts_with(ALERT_COORDINATED_PREFIX)
}

fn correlation_score(a: &SecurityAlert, b: &SecurityAlert) -> f64 {
    let mut score = 0.0;
    if a.alert_type == b.alert_type {
        score += CORRELATION_SAME_TYPE;
    }
    if (a.detected_at - b.detected_at).num_seconds().abs() <= 30 * 60 {
        score += CORRELATION_CLOSE_IN_TIME;
    }
    let shared = a
        .indicators
        .iter()
        .filter(|i| b.indicators.contains(i))
        .count();
    score += CORRELATION_SHARED_INDICATOR * shared as f64;
    if a.entity_type == b.entity_type {
        score += CORRELATION_SAME_ENTITY_TYPE;
    }
    score
}

fn notification_for(alert: &SecurityAlert, priority: bool) -> NotificationRequest {
    NotificationRequest {
        channel: if alert.severity >= Severity::High {
            "security_team".to_string()
        } else {
            "operations".to_string()
        },
        alert_id: alert.alert_id,
        entity_id: alert.entity_id.clone(),
        severity: alert.severity,
        title: alert.title.clone(),
        description: alert.description.clone(),
        indicators: alert.indicators.clone(),
        timestamp: alert.detected_at,
        priority,
    }
}

fn humanize(alert_type: &str) -> String {
    let mut chars = alert_type.replace('_', " ").chars().collect::<Vec<_>>();
    if let Some(first) = chars.first_mut() {
        *first = first.to_ascii_uppercase();
    }
    chars.into_iter().collect()
}
