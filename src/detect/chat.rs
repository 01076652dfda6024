//! Chat/session anomaly detector for user entities.

use chrono::Duration;

use crate::detect::AnomalyFinding;
use crate::ingress::{Activity, ActivityAttributes};
use crate::profile::BehaviorProfile;

/// Sessions shorter than this fraction of the baseline are suspicious.
const SHORT_SESSION_RATIO: f64 = 0.1;
/// Message volume past this multiple of baseline reads as automation.
const AUTOMATED_VOLUME_RATIO: f64 = 5.0;
/// Max circular distance in hours from the typical-hour set.
const UNUSUAL_HOUR_DISTANCE: u32 = 3;
/// Sessions allowed within a rolling hour.
const SESSION_FREQUENCY_LIMIT: usize = 5;
/// Failed logins within an hour before flagging.
const FAILED_LOGIN_LIMIT: usize = 3;

pub fn detect(
    profile: &BehaviorProfile,
    activity: &Activity,
    recent: &[Activity],
    sensitivity: f64,
) -> Vec<AnomalyFinding> {
    let (duration_secs, message_count, failed_login) = match &activity.attributes {
        ActivityAttributes::Chat {
            duration_secs,
            message_count,
            failed_login,
        } => (*duration_secs, *message_count, *failed_login),
        _ => return Vec::new(),
    };

    let mut findings = Vec::new();

    if profile.session_duration.has_baseline() {
        let ratio = duration_secs / profile.session_duration.mean;
        if ratio > profile.thresholds.session_duration_ratio * sensitivity {
            findings.push(AnomalyFinding::new(format!(
                "Unusually long session: {:.1}x typical duration",
                ratio
            )));
        } else if ratio < SHORT_SESSION_RATIO && duration_secs > 0.0 {
            findings.push(AnomalyFinding::new(format!(
                "Suspiciously short session: {:.0}s",
                duration_secs
            )));
        }
    }

    if profile.actions_per_session.has_baseline() {
        let ratio = message_count as f64 / profile.actions_per_session.mean;
        if ratio > AUTOMATED_VOLUME_RATIO * sensitivity {
            findings.push(AnomalyFinding::new(format!(
                "Potential automated behavior: message volume {:.1}x typical",
                ratio
            )));
        } else if ratio > profile.thresholds.message_volume_ratio * sensitivity {
            findings.push(AnomalyFinding::new(format!(
                "High message volume: {:.1}x typical",
                ratio
            )));
        }
    }

    let hour = chrono::Timelike::hour(&activity.timestamp);
    if let Some(distance) = profile.hour_distance(hour) {
        if distance > UNUSUAL_HOUR_DISTANCE {
            findings.push(AnomalyFinding::new(format!(
                "Activity at unusual hour {:02}:00",
                hour
            )));
        }
    }

    let hour_ago = activity.timestamp - Duration::minutes(60);
    let sessions_last_hour = recent
        .iter()
        .filter(|a| {
            matches!(a.attributes, ActivityAttributes::Chat { .. })
                && a.timestamp > hour_ago
                && a.timestamp <= activity.timestamp
        })
        .count();
    if sessions_last_hour > SESSION_FREQUENCY_LIMIT {
        findings.push(AnomalyFinding::new(format!(
            "High session frequency: {} sessions in the last hour",
            sessions_last_hour
        )));
    }

    if failed_login {
        let failed_last_hour = recent
            .iter()
            .filter(|a| {
                matches!(
                    a.attributes,
                    ActivityAttributes::Chat {
                        failed_login: true,
                        ..
                    }
                ) && a.timestamp > hour_ago
                    && a.timestamp <= activity.timestamp
            })
            .count();
        if failed_last_hour >= FAILED_LOGIN_LIMIT {
            findings.push(AnomalyFinding::new(format!(
                "Multiple failed login attempts: {} within the last hour",
                failed_last_hour
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

    fn profile_with_baseline() -> BehaviorProfile {
        let mut profile = BehaviorProfile::new(EntityType::User, "u1");
        profile.session_duration.mean = 600.0;
        profile.actions_per_session.mean = 10.0;
        profile
    }

    fn session(duration: f64, messages: u64, mins_ago: i64, failed: bool) -> Activity {
        Activity {
            entity_id: "u1".to_string(),
            entity_type: EntityType::User,
            activity_type: "chat_session".to_string(),
            timestamp: Utc::now() - Duration::minutes(mins_ago),
            attributes: ActivityAttributes::Chat {
                duration_secs: duration,
                message_count: messages,
                failed_login: failed,
            },
        }
    }

    #[test]
    fn test_long_session_flagged() {
        let profile = profile_with_baseline();
        // 3600s against a 600s baseline: ratio 6.0
        let activity = session(3600.0, 10, 0, false);
        let findings = detect(&profile, &activity, &[activity.clone()], 1.0);

        assert_eq!(findings.len(), 1);
        assert!(findings[0].reason.contains("Unusually long session"));
        assert!(findings[0].reason.contains("6.0x"));
    }

    #[test]
    fn test_short_session_flagged() {
        let profile = profile_with_baseline();
        let activity = session(30.0, 10, 0, false);
        let findings = detect(&profile, &activity, &[activity.clone()], 1.0);

        assert_eq!(findings.len(), 1);
        assert!(findings[0].reason.contains("Suspiciously short"));
    }

    #[test]
    fn test_normal_session_clean() {
        let profile = profile_with_baseline();
        let activity = session(650.0, 11, 0, false);
        let findings = detect(&profile, &activity, &[activity.clone()], 1.0);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_no_baseline_skips_ratio_checks() {
        let profile = BehaviorProfile::new(EntityType::User, "u1");
        let activity = session(3600.0, 100, 0, false);
        let findings = detect(&profile, &activity, &[activity.clone()], 1.0);
        // No baseline: ratio checks degrade gracefully
        assert!(findings.is_empty());
    }

    #[test]
    fn test_automated_volume_flagged() {
        let profile = profile_with_baseline();
        let activity = session(600.0, 60, 0, false);
        let findings = detect(&profile, &activity, &[activity.clone()], 1.0);

        assert_eq!(findings.len(), 1);
        assert!(findings[0].reason.contains("Potential automated behavior"));
    }

    #[test]
    fn test_high_volume_below_automation_cutoff() {
        let profile = profile_with_baseline();
        let activity = session(600.0, 30, 0, false);
        let findings = detect(&profile, &activity, &[activity.clone()], 1.0);

        assert_eq!(findings.len(), 1);
        assert!(findings[0].reason.contains("High message volume"));
    }

    #[test]
    fn test_session_frequency_flagged() {
        let profile = profile_with_baseline();
        let mut recent: Vec<Activity> =
            (0..6).map(|i| session(600.0, 10, i * 5, false)).collect();
        let activity = session(600.0, 10, 0, false);
        recent.push(activity.clone());

        let findings = detect(&profile, &activity, &recent, 1.0);
        assert!(findings
            .iter()
            .any(|f| f.reason.contains("High session frequency")));
    }

    #[test]
    fn test_failed_login_burst_flagged() {
        let profile = profile_with_baseline();
        let recent: Vec<Activity> =
            (0..3).map(|i| session(600.0, 10, i * 2, true)).collect();
        let activity = recent[0].clone();

        let findings = detect(&profile, &activity, &recent, 1.0);
        assert!(findings
            .iter()
            .any(|f| f.reason.contains("Multiple failed login attempts")));
    }

    #[test]
    fn test_sensitivity_lowers_trigger() {
        let profile = profile_with_baseline();
        // Ratio 2.5: under the 3.0 default, over 3.0 * 0.7 = 2.1
        let activity = session(1500.0, 10, 0, false);

        let normal = detect(&profile, &activity, &[activity.clone()], 1.0);
        assert!(normal.is_empty());

        let boosted = detect(&profile, &activity, &[activity.clone()], 0.7);
        assert!(boosted[0].reason.contains("Unusually long session"));
    }
}
