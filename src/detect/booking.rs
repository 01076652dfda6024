//! Booking anomaly detector for user entities.

use chrono::Duration;

use crate::detect::AnomalyFinding;
use crate::ingress::{Activity, ActivityAttributes};
use crate::profile::BehaviorProfile;

/// Bookings allowed within a rolling week.
const BOOKING_FREQUENCY_LIMIT: usize = 3;
/// Cost past this multiple of the recent average is flagged.
const COST_RATIO_LIMIT: f64 = 2.0;
/// How many prior bookings feed the recent cost average.
const COST_AVERAGE_WINDOW: usize = 10;

pub fn detect(
    _profile: &BehaviorProfile,
    activity: &Activity,
    recent: &[Activity],
    sensitivity: f64,
) -> Vec<AnomalyFinding> {
    let cost = match &activity.attributes {
        ActivityAttributes::Booking { cost, .. } => *cost,
        _ => return Vec::new(),
    };

    let mut findings = Vec::new();

    let week_ago = activity.timestamp - Duration::days(7);
    let bookings_last_week = recent
        .iter()
        .filter(|a| {
            matches!(a.attributes, ActivityAttributes::Booking { .. })
                && a.timestamp > week_ago
                && a.timestamp <= activity.timestamp
        })
        .count();
    if bookings_last_week > BOOKING_FREQUENCY_LIMIT {
        findings.push(AnomalyFinding::new(format!(
            "Unusual booking frequency: {} bookings in 7 days",
            bookings_last_week
        )));
    }

    let prior_costs: Vec<f64> = recent
        .iter()
        .filter(|a| a.timestamp < activity.timestamp)
        .filter_map(|a| match &a.attributes {
            ActivityAttributes::Booking { cost, .. } => Some(*cost),
            _ => None,
        })
        .rev()
        .take(COST_AVERAGE_WINDOW)
        .collect();
    if !prior_costs.is_empty() {
        let average = prior_costs.iter().sum::<f64>() / prior_costs.len() as f64;
        if average > 0.0 && cost > COST_RATIO_LIMIT * sensitivity * average {
            findings.push(AnomalyFinding::new(format!(
                "Unusually high booking cost: {:.1}x recent average",
                cost / average
            )));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::EntityType;
    use chrono::Utc;

    fn booking(cost: f64, hours_ago: i64) -> Activity {
        Activity {
            entity_id: "u1".to_string(),
            entity_type: EntityType::User,
            activity_type: "service_booking".to_string(),
            timestamp: Utc::now() - Duration::hours(hours_ago),
            attributes: ActivityAttributes::Booking {
                cost,
                service_type: "maintenance".to_string(),
            },
        }
    }

    #[test]
    fn test_booking_frequency_flagged() {
        let profile = BehaviorProfile::new(EntityType::User, "u1");
        let recent: Vec<Activity> = (0..4).map(|i| booking(100.0, i * 24)).collect();
        let activity = recent[0].clone();

        let findings = detect(&profile, &activity, &recent, 1.0);
        assert!(findings
            .iter()
            .any(|f| f.reason.contains("Unusual booking frequency")));
    }

    #[test]
    fn test_three_bookings_within_limit() {
        let profile = BehaviorProfile::new(EntityType::User, "u1");
        let recent: Vec<Activity> = (0..3).map(|i| booking(100.0, i * 24)).collect();
        let activity = recent[0].clone();

        let findings = detect(&profile, &activity, &recent, 1.0);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_cost_spike_flagged() {
        let profile = BehaviorProfile::new(EntityType::User, "u1");
        let mut recent: Vec<Activity> =
            (1..3).map(|i| booking(100.0, i * 24 * 8)).collect();
        let activity = booking(500.0, 0);
        recent.push(activity.clone());

        let findings = detect(&profile, &activity, &recent, 1.0);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].reason.contains("5.0x recent average"));
    }

    #[test]
    fn test_first_booking_has_no_cost_baseline() {
        let profile = BehaviorProfile::new(EntityType::User, "u1");
        let activity = booking(5000.0, 0);
        let findings = detect(&profile, &activity, &[activity.clone()], 1.0);
        assert!(findings.is_empty());
    }
}
