//! Durable alert persistence -- best-effort SQLite mirror of the alert
//! history, used by the CLI and for correlation lookups across restarts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::alerts::{AlertContext, AlertStatus, SecurityAlert};
use crate::detect::Severity;
use crate::storage::Pool;

pub struct AlertStore {
    pool: Pool,
}

impl AlertStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert or update an alert row.
    pub fn save(&self, alert: &SecurityAlert) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR REPLACE INTO alerts
             (id, entity_id, entity_type, alert_type, severity, status,
              anomaly_score, confidence, title, description,
              indicators_json, context_json, detected_at, status_changed_at,
              resolution_notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                alert.alert_id.to_string(),
                alert.entity_id,
                alert.entity_type.to_string(),
                alert.alert_type,
                alert.severity.to_string(),
                alert.status.to_string(),
                alert.anomaly_score,
                alert.confidence,
                alert.title,
                alert.description,
                serde_json::to_string(&alert.indicators)?,
                serde_json::to_string(&alert.context)?,
                alert.detected_at.to_rfc3339(),
                alert.status_changed_at.to_rfc3339(),
                alert.resolution_notes,
            ],
        )?;
        Ok(())
    }

    /// Most recent alerts, newest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<SecurityAlert>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, entity_type, alert_type, severity, status,
                    anomaly_score, confidence, title, description,
                    indicators_json, context_json, detected_at,
                    status_changed_at, resolution_notes
             FROM alerts ORDER BY detected_at DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit], row_to_alert)?;

        let mut alerts = Vec::new();
        for r in rows {
            match r {
                Ok(alert) => alerts.push(alert),
                Err(e) => tracing::warn!("Skipping unreadable alert row: {}", e),
            }
        }
        Ok(alerts)
    }
}

fn row_to_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<SecurityAlert> {
    let id_str: String = row.get(0)?;
    let entity_type_str: String = row.get(2)?;
    let severity_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let indicators_str: String = row.get(10)?;
    let context_str: String = row.get(11)?;
    let detected_str: String = row.get(12)?;
    let changed_str: String = row.get(13)?;

    Ok(SecurityAlert {
        alert_id: Uuid::parse_str(&id_str).unwrap_or_default(),
        entity_id: row.get(1)?,
        entity_type: entity_type_str.parse().unwrap_or(crate::ingress::EntityType::User),
        alert_type: row.get(3)?,
        severity: severity_str.parse().unwrap_or(Severity::Low),
        status: status_str.parse().unwrap_or(AlertStatus::New),
        anomaly_score: row.get(6)?,
        confidence: row.get(7)?,
        title: row.get(8)?,
        description: row.get(9)?,
        indicators: serde_json::from_str(&indicators_str).unwrap_or_default(),
        context: serde_json::from_str::<AlertContext>(&context_str).unwrap_or_default(),
        detected_at: parse_time(&detected_str),
        status_changed_at: parse_time(&changed_str),
        resolution_notes: row.get(14)?,
    })
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
