//! Activity ingress -- normalizes heterogeneous activity events into a
//! common record and appends them to per-entity bounded ring buffers.
//!
//! Recording is the only low-latency path in the engine: it never blocks
//! on detection, which runs on the next monitoring cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The subject of behavioral profiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Agent,
    System,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::User => write!(f, "user"),
            EntityType::Agent => write!(f, "agent"),
            EntityType::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityType::User),
            "agent" => Ok(EntityType::Agent),
            "system" => Ok(EntityType::System),
            other => anyhow::bail!("unknown entity type '{}'", other),
        }
    }
}

/// Key identifying one profiled entity.
pub type EntityKey = (EntityType, String);

/// Activity-kind-specific payload. One variant per activity domain,
/// carrying only the fields that domain's detector needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityAttributes {
    Chat {
        duration_secs: f64,
        message_count: u64,
        #[serde(default)]
        failed_login: bool,
    },
    Booking {
        cost: f64,
        service_type: String,
    },
    AgentOperation {
        error_rate: f64,
        processing_time_ms: f64,
        memory_mb: f64,
        #[serde(default)]
        log_volume: f64,
    },
    SystemMetric {
        metric: String,
        value: f64,
    },
}

/// An immutable normalized activity event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub activity_type: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: ActivityAttributes,
}

impl Activity {
    pub fn entity_key(&self) -> EntityKey {
        (self.entity_type, self.entity_id.clone())
    }
}

/// Per-entity bounded, insertion-ordered activity buffers.
///
/// The outer map is taken briefly to find the entity's buffer; each buffer
/// has its own lock so unrelated entities never serialize on each other.
pub struct ActivityStore {
    capacity: usize,
    buffers: RwLock<HashMap<EntityKey, Arc<RwLock<VecDeque<Activity>>>>>,
}

impl ActivityStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Append an activity, evicting the oldest entry at capacity.
    pub async fn record(&self, activity: Activity) {
        let key = activity.entity_key();
        let buffer = {
            let mut buffers = self.buffers.write().await;
            buffers
                .entry(key)
                .or_insert_with(|| Arc::new(RwLock::new(VecDeque::with_capacity(16))))
                .clone()
        };

        let mut buf = buffer.write().await;
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(activity);
    }

    /// Snapshot of an entity's buffered activities, oldest first.
    pub async fn snapshot(&self, entity_type: EntityType, entity_id: &str) -> Vec<Activity> {
        let buffer = {
            let buffers = self.buffers.read().await;
            buffers
                .get(&(entity_type, entity_id.to_string()))
                .cloned()
        };
        match buffer {
            Some(buf) => buf.read().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Number of buffered activities for an entity.
    pub async fn len(&self, entity_type: EntityType, entity_id: &str) -> usize {
        let buffer = {
            let buffers = self.buffers.read().await;
            buffers
                .get(&(entity_type, entity_id.to_string()))
                .cloned()
        };
        match buffer {
            Some(buf) => buf.read().await.len(),
            None => 0,
        }
    }

    /// All entities that have recorded at least one activity.
    pub async fn entities(&self) -> Vec<EntityKey> {
        self.buffers.read().await.keys().cloned().collect()
    }

    /// Entities with at least one activity at or after `cutoff`.
    pub async fn entities_active_since(&self, cutoff: DateTime<Utc>) -> Vec<EntityKey> {
        let buffers: Vec<(EntityKey, Arc<RwLock<VecDeque<Activity>>>)> = {
            let map = self.buffers.read().await;
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut active = Vec::new();
        for (key, buffer) in buffers {
            let buf = buffer.read().await;
            if buf.iter().rev().any(|a| a.timestamp >= cutoff) {
                active.push(key);
            }
        }
        active
    }

    /// Total number of entities with buffered activity.
    pub async fn entity_count(&self) -> usize {
        self.buffers.read().await.len()
    }
}
