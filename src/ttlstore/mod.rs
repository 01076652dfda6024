//! TTL-keyed store abstraction -- cached profiles, mitigation facts,
//! recent notifications.
//!
//! Any key/value store with expiry can satisfy [`TtlStore`]. The engine
//! treats store failures as no-ops (detection keeps running in memory),
//! so implementations should surface errors rather than panic.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtlStoreError {
    #[error("ttl store unavailable: {0}")]
    Unavailable(String),
}

/// Abstract TTL-keyed store. Absence of a key is the sole source of truth
/// for "expired".
pub trait TtlStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl_secs`.
    fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<(), TtlStoreError>;

    /// Get the value for `key`, or `None` if missing or expired.
    fn get(&self, key: &str) -> Result<Option<String>, TtlStoreError>;

    /// Delete `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), TtlStoreError>;

    /// All live keys starting with `prefix`.
    fn keys(&self, prefix: &str) -> Result<Vec<String>, TtlStoreError>;

    /// Remaining TTL in seconds for `key`, or `None` if missing or expired.
    fn ttl(&self, key: &str) -> Result<Option<i64>, TtlStoreError>;
}

/// Clock source so expiry can be driven by tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually-advanced clock for tests.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }
}

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-process TTL store. Expired entries are dropped lazily on access.
pub struct MemoryTtlStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for MemoryTtlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlStore for MemoryTtlStore {
    fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<(), TtlStoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("ttl store lock poisoned");
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + Duration::seconds(ttl_secs),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, TtlStoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("ttl store lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<(), TtlStoreError> {
        let mut entries = self.entries.lock().expect("ttl store lock poisoned");
        entries.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, TtlStoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("ttl store lock poisoned");
        entries.retain(|_, e| e.expires_at > now);
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn ttl(&self, key: &str) -> Result<Option<i64>, TtlStoreError> {
        let now = self.clock.now();
        let entries = self.entries.lock().expect("ttl store lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                Ok(Some((entry.expires_at - now).num_seconds()))
            }
            _ => Ok(None),
        }
    }
}
