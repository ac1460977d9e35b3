//! Durable webhook message queues
//!
//! Each webhook owns two FIFO lists, `main` and `error`, stored in the
//! `webhook_queue` table. Order within a list is the `position` column,
//! drawn from a global sequence, so moving an entry to the tail of a list
//! means giving it a fresh position.

use crate::db::DatabasePool;
use crate::models::{QueueEntry, QueueList};
use async_trait::async_trait;
use structwatch_common::types::WebhookId;
use structwatch_common::{Error, Result};
use uuid::Uuid;

/// Queue repository trait
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Append to the tail of a list. Returns the new length of that list.
    async fn push(
        &self,
        webhook_id: WebhookId,
        list: QueueList,
        payload: serde_json::Value,
    ) -> Result<i64>;
    /// Append one entry per webhook in a single step: either every entry is
    /// stored or none is
    async fn push_all(
        &self,
        list: QueueList,
        entries: Vec<(WebhookId, serde_json::Value)>,
    ) -> Result<()>;
    /// Oldest entry of a list without removing it
    async fn peek_front(&self, webhook_id: WebhookId, list: QueueList)
        -> Result<Option<QueueEntry>>;
    /// Delete an entry. Returns false if it was already gone.
    async fn remove(&self, id: Uuid) -> Result<bool>;
    /// Move an entry to the tail of its webhook's error list
    async fn move_to_error(&self, id: Uuid) -> Result<()>;
    /// Move the whole error list, in order, to the tail of the main list.
    /// Returns the number of entries moved.
    async fn requeue_errors(&self, webhook_id: WebhookId) -> Result<u64>;
    async fn len(&self, webhook_id: WebhookId, list: QueueList) -> Result<i64>;
    /// Delete both lists of a webhook. Returns the number of entries deleted.
    async fn clear(&self, webhook_id: WebhookId) -> Result<u64>;
    /// Webhooks that have at least one queued entry on either list
    async fn webhooks_with_entries(&self) -> Result<Vec<WebhookId>>;
}

/// Database queue repository
pub struct DbQueueRepository {
    pool: DatabasePool,
}

impl DbQueueRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueRepository for DbQueueRepository {
    async fn push(
        &self,
        webhook_id: WebhookId,
        list: QueueList,
        payload: serde_json::Value,
    ) -> Result<i64> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO webhook_queue (id, webhook_id, list, payload, position, created_at)
            VALUES ($1, $2, $3, $4, nextval('webhook_queue_position_seq'), NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(webhook_id)
        .bind(list.as_str())
        .bind(&payload)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let size: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM webhook_queue WHERE webhook_id = $1 AND list = $2",
        )
        .bind(webhook_id)
        .bind(list.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(size)
    }

    async fn push_all(
        &self,
        list: QueueList,
        entries: Vec<(WebhookId, serde_json::Value)>,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        for (webhook_id, payload) in &entries {
            sqlx::query(
                r#"
                INSERT INTO webhook_queue (id, webhook_id, list, payload, position, created_at)
                VALUES ($1, $2, $3, $4, nextval('webhook_queue_position_seq'), NOW())
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(webhook_id)
            .bind(list.as_str())
            .bind(payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn peek_front(
        &self,
        webhook_id: WebhookId,
        list: QueueList,
    ) -> Result<Option<QueueEntry>> {
        sqlx::query_as::<_, QueueEntry>(
            r#"
            SELECT * FROM webhook_queue
            WHERE webhook_id = $1 AND list = $2
            ORDER BY position ASC
            LIMIT 1
            "#,
        )
        .bind(webhook_id)
        .bind(list.as_str())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn remove(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM webhook_queue WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    async fn move_to_error(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET list = 'error', position = nextval('webhook_queue_position_seq')
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn requeue_errors(&self, webhook_id: WebhookId) -> Result<u64> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM webhook_queue
            WHERE webhook_id = $1 AND list = 'error'
            ORDER BY position ASC
            FOR UPDATE
            "#,
        )
        .bind(webhook_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        // One statement per entry keeps the sequence values in list order
        for id in &ids {
            sqlx::query(
                r#"
                UPDATE webhook_queue
                SET list = 'main', position = nextval('webhook_queue_position_seq')
                WHERE id = $1
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(ids.len() as u64)
    }

    async fn len(&self, webhook_id: WebhookId, list: QueueList) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM webhook_queue WHERE webhook_id = $1 AND list = $2")
            .bind(webhook_id)
            .bind(list.as_str())
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn clear(&self, webhook_id: WebhookId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM webhook_queue WHERE webhook_id = $1")
            .bind(webhook_id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn webhooks_with_entries(&self) -> Result<Vec<WebhookId>> {
        sqlx::query_scalar("SELECT DISTINCT webhook_id FROM webhook_queue ORDER BY webhook_id")
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
