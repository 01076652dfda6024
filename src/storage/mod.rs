//! SQLite storage layer -- schema, queries, migrations.
//!
//! Durable storage is best-effort: the engine keeps detecting in memory
//! when the database is unavailable.

pub mod schema;

use anyhow::Result;
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::ingress::Activity;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Persist an activity for offline analysis. Failures do not affect
/// in-memory detection.
pub fn save_activity(pool: &Pool, activity: &Activity) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO activities (entity_id, entity_type, activity_type, attributes_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            activity.entity_id,
            activity.entity_type.to_string(),
            activity.activity_type,
            serde_json::to_string(&activity.attributes)?,
            activity.timestamp.to_rfc3339(),
        ],
    )?;
    Ok(())
}
