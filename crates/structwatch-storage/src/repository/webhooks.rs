//! Webhook repository

use crate::db::DatabasePool;
use crate::models::{NewWebhook, Webhook};
use async_trait::async_trait;
use structwatch_common::types::{OwnerId, StructureId, WebhookId};
use structwatch_common::{Error, Result};

/// Webhook repository trait
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn create(&self, input: NewWebhook) -> Result<Webhook>;
    async fn get(&self, id: WebhookId) -> Result<Option<Webhook>>;
    async fn list_active(&self) -> Result<Vec<Webhook>>;
    /// Webhooks linked to an owner, active or not
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Webhook>>;
    /// Webhooks linked to a single structure, active or not
    async fn list_for_structure(&self, structure_id: StructureId) -> Result<Vec<Webhook>>;
    async fn link_owner(&self, owner_id: OwnerId, webhook_id: WebhookId) -> Result<()>;
    async fn link_structure(&self, structure_id: StructureId, webhook_id: WebhookId)
        -> Result<()>;
    async fn set_active(&self, id: WebhookId, is_active: bool) -> Result<()>;
}

/// Database webhook repository
pub struct DbWebhookRepository {
    pool: DatabasePool,
}

impl DbWebhookRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRepository for DbWebhookRepository {
    async fn create(&self, input: NewWebhook) -> Result<Webhook> {
        let types: Vec<String> = input
            .notification_types
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        sqlx::query_as::<_, Webhook>(
            r#"
            INSERT INTO webhooks (
                name, url, is_active, notification_types, ping_groups,
                has_default_pings_enabled, language_code, created_at
            )
            VALUES ($1, $2, true, $3, $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.url)
        .bind(&types)
        .bind(&input.ping_groups)
        .bind(input.has_default_pings_enabled)
        .bind(&input.language_code)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: WebhookId) -> Result<Option<Webhook>> {
        sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<Webhook>> {
        sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE is_active = true ORDER BY id")
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Webhook>> {
        sqlx::query_as::<_, Webhook>(
            r#"
            SELECT w.* FROM webhooks w
            JOIN owner_webhooks ow ON ow.webhook_id = w.id
            WHERE ow.owner_id = $1
            ORDER BY w.id
            "#,
        )
        .bind(owner_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_for_structure(&self, structure_id: StructureId) -> Result<Vec<Webhook>> {
        sqlx::query_as::<_, Webhook>(
            r#"
            SELECT w.* FROM webhooks w
            JOIN structure_webhooks sw ON sw.webhook_id = w.id
            WHERE sw.structure_id = $1
            ORDER BY w.id
            "#,
        )
        .bind(structure_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn link_owner(&self, owner_id: OwnerId, webhook_id: WebhookId) -> Result<()> {
        sqlx::query(
            "INSERT INTO owner_webhooks (owner_id, webhook_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(owner_id)
        .bind(webhook_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn link_structure(
        &self,
        structure_id: StructureId,
        webhook_id: WebhookId,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO structure_webhooks (structure_id, webhook_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(structure_id)
        .bind(webhook_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_active(&self, id: WebhookId, is_active: bool) -> Result<()> {
        sqlx::query("UPDATE webhooks SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
