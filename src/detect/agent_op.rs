//! Agent-operation anomaly detector -- error rates, processing time,
//! memory usage, and timing/trend pattern analysis over recent history.

use chrono::Duration;

use crate::detect::anomaly::TimeSeries;
use crate::detect::AnomalyFinding;
use crate::ingress::{Activity, ActivityAttributes};
use crate::profile::BehaviorProfile;

/// Error-rate ratio past this is critical regardless of the high tier.
const ERROR_RATE_CRITICAL_RATIO: f64 = 10.0;
/// Absolute error rate flagged when no baseline exists.
const ERROR_RATE_ABSOLUTE_FLOOR: f64 = 0.1;
/// Absolute error rate that is critical regardless of baseline.
const ERROR_RATE_ABSOLUTE_CRITICAL: f64 = 0.5;
/// Processing-time ratio past this is critical.
const PROCESSING_CRITICAL_RATIO: f64 = 5.0;
/// Processing-time ratio below this suggests work is being skipped.
const PROCESSING_BYPASS_RATIO: f64 = 0.1;
/// Memory ratio past this is critical.
const MEMORY_CRITICAL_RATIO: f64 = 3.0;
/// Memory slope (MB per sample) suggesting a leak.
const MEMORY_LEAK_SLOPE: f64 = 10.0;
/// Errors within the cluster window before flagging.
const ERROR_CLUSTER_COUNT: usize = 3;
/// Mean inter-arrival below this many minutes reads as clustering.
const ERROR_CLUSTER_MEAN_MINUTES: f64 = 5.0;
/// Interval samples needed before timing-pattern checks run.
const MIN_PATTERN_SAMPLES: usize = 5;
/// Interval samples needed before the automation check runs.
const AUTOMATION_PATTERN_SAMPLES: usize = 10;

pub fn detect(
    profile: &BehaviorProfile,
    activity: &Activity,
    recent: &[Activity],
    sensitivity: f64,
) -> Vec<AnomalyFinding> {
    let (error_rate, processing_time_ms, memory_mb, log_volume) = match &activity.attributes {
        ActivityAttributes::AgentOperation {
            error_rate,
            processing_time_ms,
            memory_mb,
            log_volume,
        } => (*error_rate, *processing_time_ms, *memory_mb, *log_volume),
        _ => return Vec::new(),
    };

    let mut findings = Vec::new();

    check_error_rate(profile, error_rate, sensitivity, &mut findings);
    check_processing_time(profile, processing_time_ms, sensitivity, &mut findings);
    check_memory(profile, memory_mb, sensitivity, &mut findings);
    check_log_volume(activity, recent, log_volume, profile, sensitivity, &mut findings);
    check_timing_pattern(activity, recent, &mut findings);
    check_memory_trend(activity, recent, &mut findings);
    check_error_clustering(profile, activity, recent, &mut findings);

    findings
}

fn check_error_rate(
    profile: &BehaviorProfile,
    error_rate: f64,
    sensitivity: f64,
    findings: &mut Vec<AnomalyFinding>,
) {
    if profile.error_rate.has_baseline() {
        let ratio = error_rate / profile.error_rate.mean;
        if ratio > ERROR_RATE_CRITICAL_RATIO * sensitivity {
            findings.push(AnomalyFinding::new(format!(
                "Critical error rate: {:.2} exceeds 10x baseline",
                error_rate
            )));
        } else if ratio > profile.thresholds.error_rate_ratio * sensitivity {
            findings.push(AnomalyFinding::new(format!(
                "High error rate: {:.2} exceeds 3x baseline",
                error_rate
            )));
        }
    } else if error_rate > ERROR_RATE_ABSOLUTE_FLOOR {
        findings.push(AnomalyFinding::new(format!(
            "Elevated error rate {:.2} with no established baseline",
            error_rate
        )));
    }

    // Absolute ceiling applies with or without a baseline
    if error_rate > ERROR_RATE_ABSOLUTE_CRITICAL
        && !findings
            .iter()
            .any(|f| f.reason.starts_with("Critical error rate"))
    {
        findings.push(AnomalyFinding::new(format!(
            "Critical error rate: {:.2}",
            error_rate
        )));
    }
}

fn check_processing_time(
    profile: &BehaviorProfile,
    processing_time_ms: f64,
    sensitivity: f64,
    findings: &mut Vec<AnomalyFinding>,
) {
    if !profile.processing_time.has_baseline() {
        return;
    }
    let ratio = processing_time_ms / profile.processing_time.mean;
    if ratio > PROCESSING_CRITICAL_RATIO * sensitivity {
        findings.push(AnomalyFinding::new(format!(
            "Critical processing delay: exceeds 5x baseline ({:.0}ms)",
            processing_time_ms
        )));
    } else if ratio > profile.thresholds.processing_time_ratio * sensitivity {
        findings.push(AnomalyFinding::new(format!(
            "Slow processing: exceeds 2x baseline ({:.0}ms)",
            processing_time_ms
        )));
    } else if ratio < PROCESSING_BYPASS_RATIO && processing_time_ms > 0.0 {
        findings.push(AnomalyFinding::new(format!(
            "Suspiciously fast processing, possible bypass ({:.0}ms)",
            processing_time_ms
        )));
    }
}

fn check_memory(
    profile: &BehaviorProfile,
    memory_mb: f64,
    sensitivity: f64,
    findings: &mut Vec<AnomalyFinding>,
) {
    if !profile.memory_usage.has_baseline() {
        return;
    }
    let ratio = memory_mb / profile.memory_usage.mean;
    if ratio > MEMORY_CRITICAL_RATIO * sensitivity {
        findings.push(AnomalyFinding::new(format!(
            "Critical memory usage, possible attack: {:.1}x baseline",
            ratio
        )));
    } else if ratio > profile.thresholds.memory_ratio * sensitivity {
        findings.push(AnomalyFinding::new(format!(
            "High memory usage: {:.1}x baseline",
            ratio
        )));
    }
}

/// Z-score of the current log volume against the rolling 1h window.
fn check_log_volume(
    activity: &Activity,
    recent: &[Activity],
    log_volume: f64,
    profile: &BehaviorProfile,
    sensitivity: f64,
    findings: &mut Vec<AnomalyFinding>,
) {
    let hour_ago = activity.timestamp - Duration::minutes(60);
    let history: Vec<f64> = recent
        .iter()
        .filter(|a| a.timestamp > hour_ago && a.timestamp < activity.timestamp)
        .filter_map(|a| match &a.attributes {
            ActivityAttributes::AgentOperation { log_volume, .. } => Some(*log_volume),
            _ => None,
        })
        .collect();

    let series = TimeSeries::new(history);
    if let Ok(z) = series.z_score(log_volume) {
        if z.abs() > profile.thresholds.z_score * sensitivity {
            findings.push(AnomalyFinding::new(format!(
                "Log volume anomaly: z-score {:.1}",
                z
            )));
        }
    }
}

/// Inter-activity interval variance over the rolling 24h window.
fn check_timing_pattern(activity: &Activity, recent: &[Activity], findings: &mut Vec<AnomalyFinding>) {
    let day_ago = activity.timestamp - Duration::hours(24);
    let mut timestamps: Vec<_> = recent
        .iter()
        .filter(|a| {
            matches!(a.attributes, ActivityAttributes::AgentOperation { .. })
                && a.timestamp > day_ago
                && a.timestamp <= activity.timestamp
        })
        .map(|a| a.timestamp)
        .collect();
    timestamps.sort();

    let intervals: Vec<f64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64)
        .collect();
    if intervals.len() < MIN_PATTERN_SAMPLES {
        return;
    }

    let series = TimeSeries::new(intervals.clone());
    let mean = series.mean();
    let std = series.std_dev();
    if mean <= 0.0 {
        return;
    }

    if std > 2.0 * mean {
        findings.push(AnomalyFinding::new(
            "Irregular timing pattern between operations".to_string(),
        ));
    } else if std < 0.1 * mean && intervals.len() > AUTOMATION_PATTERN_SAMPLES {
        findings.push(AnomalyFinding::new(
            "Highly regular operation timing suggests automation".to_string(),
        ));
    }
}

/// Linear trend of memory samples over the rolling 24h window.
fn check_memory_trend(activity: &Activity, recent: &[Activity], findings: &mut Vec<AnomalyFinding>) {
    let day_ago = activity.timestamp - Duration::hours(24);
    let memory: Vec<f64> = recent
        .iter()
        .filter(|a| a.timestamp > day_ago && a.timestamp <= activity.timestamp)
        .filter_map(|a| match &a.attributes {
            ActivityAttributes::AgentOperation { memory_mb, .. } => Some(*memory_mb),
            _ => None,
        })
        .collect();
    if memory.len() < MIN_PATTERN_SAMPLES {
        return;
    }

    let slope = TimeSeries::new(memory).linear_slope();
    if slope > MEMORY_LEAK_SLOPE {
        findings.push(AnomalyFinding::new(format!(
            "Memory growth trend suggests possible leak: {:.1} MB/sample",
            slope
        )));
    }
}

/// Clustering of elevated-error timestamps.
fn check_error_clustering(
    profile: &BehaviorProfile,
    activity: &Activity,
    recent: &[Activity],
    findings: &mut Vec<AnomalyFinding>,
) {
    let elevated_floor = if profile.error_rate.has_baseline() {
        (2.0 * profile.error_rate.mean).max(ERROR_RATE_ABSOLUTE_FLOOR)
    } else {
        ERROR_RATE_ABSOLUTE_FLOOR
    };

    let day_ago = activity.timestamp - Duration::hours(24);
    let mut error_times: Vec<_> = recent
        .iter()
        .filter(|a| a.timestamp > day_ago && a.timestamp <= activity.timestamp)
        .filter_map(|a| match &a.attributes {
            ActivityAttributes::AgentOperation { error_rate, .. }
                if *error_rate > elevated_floor =>
            {
                Some(a.timestamp)
            }
            _ => None,
        })
        .collect();
    error_times.sort();

    if error_times.len() < ERROR_CLUSTER_COUNT {
        return;
    }

    let gaps: Vec<f64> = error_times
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64 / 60.0)
        .collect();
    let mean_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if mean_gap < ERROR_CLUSTER_MEAN_MINUTES {
        findings.push(AnomalyFinding::new(format!(
            "Error clustering: {} elevated-error operations, mean gap {:.1} minutes",
            error_times.len(),
            mean_gap
        )));
    }
}
