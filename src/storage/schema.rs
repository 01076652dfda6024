//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            entity_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            alert_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            status TEXT NOT NULL,
            anomaly_score REAL NOT NULL,
            confidence REAL NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            indicators_json TEXT NOT NULL,
            context_json TEXT NOT NULL,
            detected_at TEXT NOT NULL,
            status_changed_at TEXT NOT NULL,
            resolution_notes TEXT
        );

        CREATE TABLE IF NOT EXISTS activities (
            id INTEGER PRIMARY KEY,
            entity_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            activity_type TEXT NOT NULL,
            attributes_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_alerts_entity ON alerts(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_alerts_detected ON alerts(detected_at);
        CREATE INDEX IF NOT EXISTS idx_activities_entity ON activities(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_activities_created ON activities(created_at);",
    )?;

    Ok(())
}
