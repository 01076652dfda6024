//! End-to-end engine scenarios: ingest, detect, alert, mitigate.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use behaviorsentry::alerts::{
    AlertContext, AlertStatus, SecurityAlert, ALERT_FAILED_LOGIN, ALERT_PERSISTENT,
    ALERT_USER_BEHAVIOR,
};
use behaviorsentry::config::EngineConfig;
use behaviorsentry::detect::Severity;
use behaviorsentry::engine::BehaviorEngine;
use behaviorsentry::ingress::{Activity, ActivityAttributes, EntityType};
use behaviorsentry::mitigate::LoggingResponseBackend;
use behaviorsentry::notify::TracingNotifier;
use behaviorsentry::ttlstore::{ManualClock, MemoryTtlStore, TtlStore};

fn engine_with_store(ttl: Arc<MemoryTtlStore>) -> Arc<BehaviorEngine> {
    BehaviorEngine::new(
        EngineConfig::default(),
        ttl,
        Arc::new(TracingNotifier),
        Arc::new(LoggingResponseBackend),
        None,
    )
}

fn engine() -> Arc<BehaviorEngine> {
    engine_with_store(Arc::new(MemoryTtlStore::new()))
}

fn chat(entity: &str, duration: f64, messages: u64, secs_ago: i64) -> Activity {
    Activity {
        entity_id: entity.to_string(),
        entity_type: EntityType::User,
        activity_type: "chat_session".to_string(),
        timestamp: Utc::now() - Duration::seconds(secs_ago),
        attributes: ActivityAttributes::Chat {
            duration_secs: duration,
            message_count: messages,
            failed_login: false,
        },
    }
}

fn agent_op(entity: &str, error_rate: f64, secs_ago: i64) -> Activity {
    Activity {
        entity_id: entity.to_string(),
        entity_type: EntityType::Agent,
        activity_type: "agent_operation".to_string(),
        timestamp: Utc::now() - Duration::seconds(secs_ago),
        attributes: ActivityAttributes::AgentOperation {
            error_rate,
            processing_time_ms: 100.0,
            memory_mb: 200.0,
            log_volume: 40.0,
        },
    }
}

fn crafted_alert(
    entity_type: EntityType,
    entity: &str,
    alert_type: &str,
    severity: Severity,
    mins_ago: i64,
) -> SecurityAlert {
    let ts = Utc::now() - Duration::minutes(mins_ago);
    SecurityAlert {
        alert_id: Uuid::new_v4(),
        entity_id: entity.to_string(),
        entity_type,
        alert_type: alert_type.to_string(),
        severity,
        title: "crafted".to_string(),
        description: "crafted".to_string(),
        anomaly_score: 0.7,
        confidence: 0.75,
        indicators: vec!["indicator".to_string()],
        context: AlertContext::default(),
        detected_at: ts,
        status: AlertStatus::New,
        status_changed_at: ts,
        resolution_notes: None,
    }
}

/// Hourly baseline sessions well outside the monitoring window.
async fn seed_chat_baseline(engine: &BehaviorEngine, entity: &str, duration: f64) {
    for i in 0..20i64 {
        engine
            .record_activity(chat(entity, duration, 10, 7200 + i * 3600))
            .await;
    }
    engine.run_profile_refresh().await;
}

#[tokio::test]
async fn test_long_session_scenario() {
    let engine = engine();
    seed_chat_baseline(&engine, "u1", 600.0).await;

    // A 3600s session against the 600s baseline: ratio 6.0
    engine.record_activity(chat("u1", 3600.0, 10, 0)).await;
    assert_eq!(engine.run_detection_cycle().await, 1);

    let active = engine.alerts.active_alerts().await;
    assert_eq!(active.len(), 1);
    let alert = &active[0];
    assert_eq!(alert.alert_type, ALERT_USER_BEHAVIOR);
    assert!((alert.anomaly_score - 0.6).abs() < 1e-9);
    assert_eq!(alert.severity, Severity::High);
    assert!(alert
        .indicators
        .iter()
        .any(|i| i.contains("Unusually long session")));
    assert!(alert.anomaly_score >= 0.0 && alert.anomaly_score <= 1.0);
    assert!(alert.confidence >= 0.0 && alert.confidence <= 1.0);
}

#[tokio::test]
async fn test_agent_critical_error_rate_scenario() {
    let engine = engine();
    for i in 0..20i64 {
        engine
            .record_activity(agent_op("worker-7", 0.01, 7200 + i * 3600))
            .await;
    }
    engine.run_profile_refresh().await;

    engine.record_activity(agent_op("worker-7", 0.5, 0)).await;
    assert_eq!(engine.run_detection_cycle().await, 1);

    let active = engine.alerts.active_alerts().await;
    let alert = active
        .iter()
        .find(|a| a.alert_type == "agent_behavior_anomaly")
        .expect("agent alert should exist");
    assert!(alert
        .indicators
        .iter()
        .any(|i| i.contains("Critical error rate")));
    // Critical keyword forces at least high severity
    assert!(alert.severity >= Severity::High);

    // Agent anomalies trigger isolation
    let mitigations = engine.mitigations.active_mitigations();
    assert!(mitigations
        .iter()
        .any(|m| m.mitigation_type == "agent_isolation" && m.entity_id == "worker-7"));
}

#[tokio::test]
async fn test_repeated_alerts_suppressed() {
    let engine = engine();

    let finding = || {
        vec![behaviorsentry::detect::AnomalyFinding::new(
            "Unusually long session: 6.0x typical duration",
        )]
    };
    let raise = |f| engine.alerts.raise(EntityType::User, "u1", ALERT_USER_BEHAVIOR, f, None, 50);

    assert!(raise(finding()).await.is_some());
    assert!(raise(finding()).await.is_some());
    // Third within the hour window is suppressed
    assert!(raise(finding()).await.is_none());

    assert_eq!(engine.alerts.active_alerts().await.len(), 2);
    assert_eq!(engine.metrics.snapshot().alerts_suppressed, 1);
}

#[tokio::test]
async fn test_escalation_on_lifecycle_tick() {
    let engine = engine();
    engine
        .alerts
        .insert(crafted_alert(
            EntityType::User,
            "u1",
            ALERT_USER_BEHAVIOR,
            Severity::High,
            20,
        ))
        .await;
    engine
        .alerts
        .insert(crafted_alert(
            EntityType::User,
            "u2",
            ALERT_USER_BEHAVIOR,
            Severity::High,
            5,
        ))
        .await;

    engine.run_alert_lifecycle().await;

    let active = engine.alerts.active_alerts().await;
    let by_entity = |id: &str| {
        active
            .iter()
            .find(|a| a.entity_id == id)
            .map(|a| a.status)
            .unwrap()
    };
    assert_eq!(by_entity("u1"), AlertStatus::Escalated);
    // Not yet 15 minutes old: escalates on a later tick, not this one
    assert_eq!(by_entity("u2"), AlertStatus::New);
}

#[tokio::test]
async fn test_coordinated_sweep_applies_mitigation() {
    let engine = engine();
    for entity in ["u1", "u2", "u3"] {
        engine
            .alerts
            .insert(crafted_alert(
                EntityType::User,
                entity,
                ALERT_FAILED_LOGIN,
                Severity::Medium,
                5,
            ))
            .await;
    }

    engine.run_alert_lifecycle().await;

    let active = engine.alerts.active_alerts().await;
    let coordinated: Vec<_> = active
        .iter()
        .filter(|a| a.alert_type == "coordinated_security_failed_login")
        .collect();
    assert_eq!(coordinated.len(), 1);

    // Coordinated anomalies get temporary block + enhanced monitoring
    let mitigations = engine.mitigations.active_mitigations();
    assert!(mitigations
        .iter()
        .any(|m| m.mitigation_type == "temporary_block"));
    assert!(mitigations
        .iter()
        .any(|m| m.mitigation_type == "enhanced_monitoring"));

    // A second tick does not duplicate the coordinated alert
    engine.run_alert_lifecycle().await;
    let active = engine.alerts.active_alerts().await;
    let coordinated: Vec<_> = active
        .iter()
        .filter(|a| a.alert_type == "coordinated_security_failed_login")
        .collect();
    assert_eq!(coordinated.len(), 1);
}

#[tokio::test]
async fn test_persistent_sweep_boosts_sensitivity() {
    let engine = engine();
    for i in 0..5i64 {
        engine
            .alerts
            .insert(crafted_alert(
                EntityType::User,
                "flaky",
                ALERT_USER_BEHAVIOR,
                Severity::Medium,
                i * 60 * 12,
            ))
            .await;
    }

    assert_eq!(
        engine
            .mitigations
            .sensitivity_for(EntityType::User, "flaky"),
        1.0
    );
    engine.run_alert_lifecycle().await;

    let active = engine.alerts.active_alerts().await;
    let persistent: Vec<_> = active
        .iter()
        .filter(|a| a.alert_type == ALERT_PERSISTENT)
        .collect();
    assert_eq!(persistent.len(), 1);
    assert!((persistent[0].confidence - 0.9).abs() < 1e-9);

    // Enhanced monitoring lowers the entity's detector thresholds by 30%
    assert_eq!(
        engine
            .mitigations
            .sensitivity_for(EntityType::User, "flaky"),
        0.7
    );

    // Idempotent while the persistent alert is open
    engine.run_alert_lifecycle().await;
    let active = engine.alerts.active_alerts().await;
    assert_eq!(
        active
            .iter()
            .filter(|a| a.alert_type == ALERT_PERSISTENT)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_mitigation_ttl_and_removal() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let ttl = Arc::new(MemoryTtlStore::with_clock(clock.clone()));
    let engine = engine_with_store(ttl.clone());

    engine
        .mitigations
        .respond(&crafted_alert(
            EntityType::User,
            "u1",
            ALERT_FAILED_LOGIN,
            Severity::High,
            0,
        ))
        .await;

    let mitigations = engine.mitigations.active_mitigations();
    assert!(mitigations.iter().any(|m| m.mitigation_type == "rate_limit"));
    assert!(mitigations
        .iter()
        .any(|m| m.mitigation_type == "step_up_auth"));

    // The 3600s rate limit lapses; absence of the key is the only truth
    clock.advance(Duration::seconds(3601));
    let mitigations = engine.mitigations.active_mitigations();
    assert!(mitigations.iter().all(|m| m.mitigation_type != "rate_limit"));
    assert!(ttl.get("mitigation:rate_limit:user:u1").unwrap().is_none());

    // Early operator removal deletes exactly the matching key
    assert_eq!(engine.mitigations.remove("step_up_auth", "u1"), 1);
    assert!(engine.mitigations.active_mitigations().is_empty());
}

#[tokio::test]
async fn test_resolved_alert_stays_in_history() {
    let engine = engine();
    let alert = crafted_alert(
        EntityType::User,
        "u1",
        ALERT_USER_BEHAVIOR,
        Severity::Medium,
        10,
    );
    let id = alert.alert_id;
    engine.alerts.insert(alert).await;

    let resolved = engine.alerts.resolve(id, "confirmed benign").await.unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);

    // Still visible in 24h counts and risk rankings
    assert_eq!(engine.alerts.raised_last_24h().await, 1);
    let summary = engine.dashboard_summary().await;
    assert_eq!(summary.alerts_last_24h, 1);
    assert_eq!(summary.top_risk_entities[0].entity_id, "u1");
}

#[tokio::test]
async fn test_degraded_mode_keeps_detecting() {
    // No database pool at all: detection still works end to end
    let engine = engine();
    seed_chat_baseline(&engine, "u1", 600.0).await;
    engine.record_activity(chat("u1", 3600.0, 10, 0)).await;

    assert_eq!(engine.run_detection_cycle().await, 1);
    assert_eq!(engine.alerts.active_alerts().await.len(), 1);
}
