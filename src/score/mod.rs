//! Alert scoring -- aggregates findings into an anomaly score, a severity
//! level, and a confidence value.
//!
//! The keyword tables encode the system's actual alerting behavior; treat
//! them as data, not tunables.

use crate::detect::{AnomalyFinding, Severity};
use crate::profile::BehaviorProfile;

/// Keyword-to-weight lookup, checked in order; first match wins.
const KEYWORD_WEIGHTS: &[(&str, f64)] = &[
    ("critical", 1.0),
    ("suspicious", 0.9),
    ("high", 0.9),
    ("potential", 0.8),
    ("error", 0.8),
    ("memory", 0.7),
    ("unusual", 0.6),
];

/// Weight for findings matching no keyword.
const DEFAULT_WEIGHT: f64 = 0.5;

/// Alert types that escalate the severity tier by one.
pub const CRITICAL_ALERT_TYPES: &[&str] = &[
    "security_unauthorized_access",
    "security_failed_login",
    "agent_compromise",
    "data_exfiltration",
];

/// Finding keywords that escalate the severity tier by one.
const CRITICAL_KEYWORDS: &[&str] = &["critical", "compromise", "attack", "breach"];

/// Finding keywords that add 0.1 confidence each.
const STRONG_KEYWORDS: &[&str] = &["critical", "5x", "10x", "z-score"];

/// Finding keywords that add 0.05 confidence each.
const MODERATE_KEYWORDS: &[&str] = &["2x", "3x", "unusual", "high"];

/// Score multiplier for entities with a dense recent alert history.
const REPEAT_OFFENDER_MULTIPLIER: f64 = 1.2;

/// Context the scorer needs beyond the findings themselves.
#[derive(Debug, Clone, Default)]
pub struct ScoreContext {
    pub alert_type: String,
    /// Alerts for this entity in the trailing 24 hours.
    pub alerts_last_24h: usize,
    /// High/critical alerts for this entity in the trailing 48 hours.
    pub high_or_critical_last_48h: usize,
    /// Activities currently buffered for this entity.
    pub buffered_activities: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub anomaly_score: f64,
    pub severity: Severity,
    pub confidence: f64,
}

/// Aggregate findings into (anomaly score, severity, confidence).
pub fn score(
    findings: &[AnomalyFinding],
    profile: Option<&BehaviorProfile>,
    ctx: &ScoreContext,
) -> ScoreOutcome {
    let anomaly_score = anomaly_score(findings, ctx);
    ScoreOutcome {
        anomaly_score,
        severity: severity(anomaly_score, findings, ctx),
        confidence: confidence(findings, profile, ctx),
    }
}

fn keyword_weight(reason: &str) -> f64 {
    let lower = reason.to_lowercase();
    for (keyword, weight) in KEYWORD_WEIGHTS {
        if lower.contains(keyword) {
            return *weight;
        }
    }
    DEFAULT_WEIGHT
}

fn anomaly_score(findings: &[AnomalyFinding], ctx: &ScoreContext) -> f64 {
    if findings.is_empty() {
        return 0.0;
    }

    let base = (0.3 * findings.len() as f64).min(1.0);

    let mut weighted = findings
        .iter()
        .map(|f| keyword_weight(&f.reason))
        .sum::<f64>()
        / findings.len() as f64;
    if ctx.alerts_last_24h > 2 {
        weighted *= REPEAT_OFFENDER_MULTIPLIER;
    }

    base.max(weighted).min(1.0)
}

fn severity(anomaly_score: f64, findings: &[AnomalyFinding], ctx: &ScoreContext) -> Severity {
    let mut severity = if anomaly_score >= 0.8 {
        Severity::Critical
    } else if anomaly_score >= 0.6 {
        Severity::High
    } else if anomaly_score >= 0.4 {
        Severity::Medium
    } else {
        Severity::Low
    };

    let critical_type = CRITICAL_ALERT_TYPES.contains(&ctx.alert_type.as_str());
    let critical_keyword = findings.iter().any(|f| {
        let lower = f.reason.to_lowercase();
        CRITICAL_KEYWORDS.iter().any(|k| lower.contains(k))
    });
    if critical_type || critical_keyword {
        severity = severity.escalated();
    }

    if ctx.high_or_critical_last_48h > 1 && severity < Severity::Medium {
        severity = Severity::Medium;
    }

    severity
}

fn confidence(
    findings: &[AnomalyFinding],
    profile: Option<&BehaviorProfile>,
    ctx: &ScoreContext,
) -> f64 {
    let mut confidence = match profile {
        Some(p) if p.sample_size > 0 => (p.confidence_score + 0.3).min(0.95),
        _ => 0.7,
    };

    for finding in findings {
        let lower = finding.reason.to_lowercase();
        if STRONG_KEYWORDS.iter().any(|k| lower.contains(k)) {
            confidence += 0.1;
        } else if MODERATE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            confidence += 0.05;
        }
    }

    if ctx.buffered_activities > 100 {
        confidence += 0.1;
    } else if ctx.buffered_activities < 10 {
        confidence -= 0.2;
    }

    confidence.clamp(0.3, 0.95)
}
