//! Notification requests -- this engine only *requests* that a
//! notification be sent; delivery belongs to an external dispatcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detect::Severity;
use crate::ttlstore::TtlStore;

/// TTL-store key holding the bounded recent-notifications list.
const RECENT_KEY: &str = "notifications:recent";
/// Cap on the recent-notifications list.
const RECENT_LIMIT: usize = 50;
/// Recent list expiry.
const RECENT_TTL_SECS: i64 = 24 * 3600;
/// Bound on a single outbound notification request.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel error: {0}")]
    Channel(String),

    #[error("notification request timed out")]
    Timeout,
}

/// A request for the external dispatcher to deliver a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub channel: String,
    pub alert_id: uuid::Uuid,
    pub entity_id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub indicators: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Priority delivery, set by the escalation loop.
    pub priority: bool,
}

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn request_notification(&self, req: &NotificationRequest) -> Result<(), NotifyError>;

    /// Human-readable name for this channel.
    fn channel_name(&self) -> &str;
}

/// Default channel: structured log lines only.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn request_notification(&self, req: &NotificationRequest) -> Result<(), NotifyError> {
        info!(
            alert_id = %req.alert_id,
            entity = %req.entity_id,
            severity = %req.severity,
            priority = req.priority,
            "Notification requested: {}",
            req.title
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "tracing"
    }
}

/// Wraps the configured channel with a bounded timeout and keeps the
/// recent-notifications list in the TTL store. Failures are logged and
/// treated as no-ops for the cycle.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    ttl: Arc<dyn TtlStore>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, ttl: Arc<dyn TtlStore>) -> Self {
        Self { notifier, ttl }
    }

    pub async fn dispatch(&self, req: &NotificationRequest) {
        match tokio::time::timeout(DISPATCH_TIMEOUT, self.notifier.request_notification(req))
            .await
        {
            Ok(Ok(())) => {
                debug!(alert_id = %req.alert_id, channel = %self.notifier.channel_name(), "Notification dispatched");
            }
            Ok(Err(e)) => {
                warn!(alert_id = %req.alert_id, "Notification request failed: {}", e);
            }
            Err(_) => {
                warn!(alert_id = %req.alert_id, "Notification request timed out");
            }
        }

        self.record_recent(req);
    }

    /// Append to the bounded recent list, best-effort.
    fn record_recent(&self, req: &NotificationRequest) {
        let mut recent: Vec<NotificationRequest> = match self.ttl.get(RECENT_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("TTL store unavailable for recent notifications: {}", e);
                return;
            }
        };

        recent.push(req.clone());
        if recent.len() > RECENT_LIMIT {
            let excess = recent.len() - RECENT_LIMIT;
            recent.drain(..excess);
        }

        match serde_json::to_string(&recent) {
            Ok(json) => {
                if let Err(e) = self.ttl.set(RECENT_KEY, &json, RECENT_TTL_SECS) {
                    warn!("Failed to store recent notifications: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize recent notifications: {}", e),
        }
    }

    /// Recent notification requests, oldest first.
    pub fn recent(&self) -> Vec<NotificationRequest> {
        match self.ttl.get(RECENT_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}
