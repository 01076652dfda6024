//! Engine configuration, loadable from a TOML file with serde defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Behavioral monitoring loop interval.
    pub monitoring_interval_secs: u64,
    /// Profile refresh loop interval.
    pub refresh_interval_secs: u64,
    /// Alert lifecycle loop interval (escalation + retention).
    pub lifecycle_interval_secs: u64,
    /// Per-entity activity ring buffer capacity.
    pub buffer_capacity: usize,
    /// Minimum anomaly score before an alert is stored.
    pub alert_threshold: f64,
    /// Bounded alert-history log capacity.
    pub history_capacity: usize,
    /// Unacknowledged high/critical alerts escalate after this long.
    pub escalation_after_secs: i64,
    /// Terminal alerts leave the active set after this long.
    pub retention_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            monitoring_interval_secs: 300,
            refresh_interval_secs: 3600,
            lifecycle_interval_secs: 300,
            buffer_capacity: 500,
            alert_threshold: 0.4,
            history_capacity: 1000,
            escalation_after_secs: 15 * 60,
            retention_secs: 24 * 3600,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file; defaults when the file is
    /// absent.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            tracing::info!(%path, "No config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.monitoring_interval_secs, 300);
        assert_eq!(config.refresh_interval_secs, 3600);
        assert_eq!(config.escalation_after_secs, 900);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig =
            toml::from_str("monitoring_interval_secs = 60\nalert_threshold = 0.5").unwrap();
        assert_eq!(config.monitoring_interval_secs, 60);
        assert!((config.alert_threshold - 0.5).abs() < 1e-9);
        assert_eq!(config.buffer_capacity, 500);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = EngineConfig::load("/nonexistent/behaviorsentry.toml").unwrap();
        assert_eq!(config.buffer_capacity, 500);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "buffer_capacity = 64\nretention_secs = 3600").unwrap();

        let config = EngineConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.buffer_capacity, 64);
        assert_eq!(config.retention_secs, 3600);
    }
}
