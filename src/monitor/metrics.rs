//! Self-health counters. Failures in this engine surface only as absent
//! alerts/mitigations, so these are the externally monitorable signal.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub entities_monitored: AtomicU64,
    pub anomalies_detected: AtomicU64,
    pub alerts_generated: AtomicU64,
    pub alerts_suppressed: AtomicU64,
    pub profiles_updated: AtomicU64,
    pub mitigations_applied: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub entities_monitored: u64,
    pub anomalies_detected: u64,
    pub alerts_generated: u64,
    pub alerts_suppressed: u64,
    pub profiles_updated: u64,
    pub mitigations_applied: u64,
}

impl EngineMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entities_monitored: self.entities_monitored.load(Ordering::Relaxed),
            anomalies_detected: self.anomalies_detected.load(Ordering::Relaxed),
            alerts_generated: self.alerts_generated.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            profiles_updated: self.profiles_updated.load(Ordering::Relaxed),
            mitigations_applied: self.mitigations_applied.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = EngineMetrics::default();
        EngineMetrics::incr(&metrics.alerts_generated);
        EngineMetrics::add(&metrics.anomalies_detected, 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.alerts_generated, 1);
        assert_eq!(snapshot.anomalies_detected, 3);
        assert_eq!(snapshot.alerts_suppressed, 0);
    }
}
