//! Outbound mitigation enforcement -- calls into collaborating services.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::ingress::EntityType;

/// Collaborator interface for enforcing automated responses. Every call
/// is best-effort; the controller logs failures and moves on.
#[async_trait]
pub trait ResponseBackend: Send + Sync {
    async fn apply_rate_limit(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        duration_secs: i64,
    ) -> Result<()>;

    async fn require_step_up_auth(&self, user_id: &str, duration_secs: i64) -> Result<()>;

    async fn isolate_agent(&self, agent_name: &str, duration_secs: i64) -> Result<()>;

    async fn restart_agent(&self, agent_name: &str) -> Result<()>;

    async fn temporary_block(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        duration_secs: i64,
    ) -> Result<()>;

    async fn scale_resources(&self, factor: f64, duration_secs: i64) -> Result<()>;

    async fn request_health_check(&self) -> Result<()>;
}

/// Default backend: log the request and succeed. Deployments wire in a
/// real service client here.
pub struct LoggingResponseBackend;

#[async_trait]
impl ResponseBackend for LoggingResponseBackend {
    async fn apply_rate_limit(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        duration_secs: i64,
    ) -> Result<()> {
        info!(%entity_type, entity = %entity_id, duration_secs, "Rate limit requested");
        Ok(())
    }

    async fn require_step_up_auth(&self, user_id: &str, duration_secs: i64) -> Result<()> {
        info!(user = %user_id, duration_secs, "Step-up authentication required");
        Ok(())
    }

    async fn isolate_agent(&self, agent_name: &str, duration_secs: i64) -> Result<()> {
        info!(agent = %agent_name, duration_secs, "Agent isolation requested");
        Ok(())
    }

    async fn restart_agent(&self, agent_name: &str) -> Result<()> {
        info!(agent = %agent_name, "Agent restart requested");
        Ok(())
    }

    async fn temporary_block(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        duration_secs: i64,
    ) -> Result<()> {
        info!(%entity_type, entity = %entity_id, duration_secs, "Temporary block requested");
        Ok(())
    }

    async fn scale_resources(&self, factor: f64, duration_secs: i64) -> Result<()> {
        info!(factor, duration_secs, "Resource scaling requested");
        Ok(())
    }

    async fn request_health_check(&self) -> Result<()> {
        info!("System health check requested");
        Ok(())
    }
}
