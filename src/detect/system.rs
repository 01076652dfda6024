//! System-metric anomaly detector -- z-score of each metric value against
//! its rolling 24h history.

use chrono::Duration;

use crate::detect::anomaly::TimeSeries;
use crate::detect::AnomalyFinding;
use crate::ingress::{Activity, ActivityAttributes};
use crate::profile::BehaviorProfile;

pub fn detect(
    profile: &BehaviorProfile,
    activity: &Activity,
    recent: &[Activity],
    sensitivity: f64,
) -> Vec<AnomalyFinding> {
    let (metric, value) = match &activity.attributes {
        ActivityAttributes::SystemMetric { metric, value } => (metric.as_str(), *value),
        _ => return Vec::new(),
    };

    let day_ago = activity.timestamp - Duration::hours(24);
    let history: Vec<f64> = recent
        .iter()
        .filter(|a| a.timestamp > day_ago && a.timestamp < activity.timestamp)
        .filter_map(|a| match &a.attributes {
            ActivityAttributes::SystemMetric { metric: m, value } if m == metric => {
                Some(*value)
            }
            _ => None,
        })
        .collect();

    let series = TimeSeries::new(history);
    match series.z_score(value) {
        Ok(z) if z.abs() > profile.thresholds.z_score * sensitivity => {
            vec![AnomalyFinding::new(format!(
                "System metric {} anomaly: z-score {:.1}",
                metric, z
            ))]
        }
        // Immature history degrades gracefully
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::EntityType;
    use chrono::Utc;

    fn metric(name: &str, value: f64, mins_ago: i64) -> Activity {
        Activity {
            entity_id: "system".to_string(),
            entity_type: EntityType::System,
            activity_type: "system_metric".to_string(),
            timestamp: Utc::now() - Duration::minutes(mins_ago),
            attributes: ActivityAttributes::SystemMetric {
                metric: name.to_string(),
                value,
            },
        }
    }

    #[test]
    fn test_metric_spike_flagged() {
        let profile = BehaviorProfile::new(EntityType::System, "system");
        let mut recent: Vec<Activity> = (1..=10)
            .map(|i| metric("cpu_percent", 40.0 + (i % 4) as f64, i * 30))
            .collect();
        let spike = metric("cpu_percent", 98.0, 0);
        recent.push(spike.clone());

        let findings = detect(&profile, &spike, &recent, 1.0);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].reason.contains("cpu_percent"));
        assert!(findings[0].reason.contains("z-score"));
    }

    #[test]
    fn test_insufficient_history_is_quiet() {
        let profile = BehaviorProfile::new(EntityType::System, "system");
        let recent: Vec<Activity> = (1..=3)
            .map(|i| metric("cpu_percent", 40.0, i * 30))
            .collect();
        let spike = metric("cpu_percent", 98.0, 0);

        let findings = detect(&profile, &spike, &recent, 1.0);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_metrics_are_independent() {
        let profile = BehaviorProfile::new(EntityType::System, "system");
        // Plenty of cpu history, none for memory
        let recent: Vec<Activity> = (1..=10)
            .map(|i| metric("cpu_percent", 40.0 + (i % 4) as f64, i * 30))
            .collect();
        let memory = metric("memory_percent", 99.0, 0);

        let findings = detect(&profile, &memory, &recent, 1.0);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_normal_value_is_quiet() {
        let profile = BehaviorProfile::new(EntityType::System, "system");
        let recent: Vec<Activity> = (1..=10)
            .map(|i| metric("cpu_percent", 40.0 + (i % 4) as f64, i * 30))
            .collect();
        let normal = metric("cpu_percent", 42.0, 0);

        let findings = detect(&profile, &normal, &recent, 1.0);
        assert!(findings.is_empty());
    }
}
