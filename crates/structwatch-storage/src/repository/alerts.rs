//! Alert repository

use crate::db::DatabasePool;
use crate::models::{Alert, NewAlert};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use structwatch_common::types::{NotificationId, OwnerId};
use structwatch_common::{Error, Result};

/// Alert repository trait
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Store a remote event unless it is already known for this owner.
    /// Returns true when a new row was created.
    async fn insert_if_absent(&self, input: &NewAlert) -> Result<bool>;
    async fn get(&self, owner_id: OwnerId, notification_id: NotificationId)
        -> Result<Option<Alert>>;
    /// Unsent alerts of an owner not older than `since`, oldest first
    async fn list_unsent(&self, owner_id: OwnerId, since: DateTime<Utc>) -> Result<Vec<Alert>>;
    async fn mark_sent(&self, id: i64) -> Result<()>;
    /// Alerts of the given types whose timer has not been handled yet,
    /// not older than `since`, oldest first
    async fn list_timer_pending(
        &self,
        owner_id: OwnerId,
        notif_types: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<Alert>>;
    async fn mark_timer_added(&self, id: i64) -> Result<()>;
}

/// Database alert repository
pub struct DbAlertRepository {
    pool: DatabasePool,
}

impl DbAlertRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRepository for DbAlertRepository {
    async fn insert_if_absent(&self, input: &NewAlert) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (
                owner_id, notification_id, notif_type, timestamp, sender_id, sender_type,
                text, is_read, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (notification_id, owner_id) DO NOTHING
            "#,
        )
        .bind(input.owner_id)
        .bind(input.notification_id)
        .bind(&input.notif_type)
        .bind(input.timestamp)
        .bind(input.sender_id)
        .bind(&input.sender_type)
        .bind(&input.text)
        .bind(input.is_read)
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(
        &self,
        owner_id: OwnerId,
        notification_id: NotificationId,
    ) -> Result<Option<Alert>> {
        sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE owner_id = $1 AND notification_id = $2",
        )
        .bind(owner_id)
        .bind(notification_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_unsent(&self, owner_id: OwnerId, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        sqlx::query_as::<_, Alert>(
            r#"
            SELECT * FROM alerts
            WHERE owner_id = $1 AND is_sent = false AND timestamp > $2
            ORDER BY timestamp ASC, notification_id ASC
            "#,
        )
        .bind(owner_id)
        .bind(since)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE alerts SET is_sent = true WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_timer_pending(
        &self,
        owner_id: OwnerId,
        notif_types: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        sqlx::query_as::<_, Alert>(
            r#"
            SELECT * FROM alerts
            WHERE owner_id = $1 AND is_timer_added = false AND timestamp > $2
              AND notif_type = ANY($3)
            ORDER BY timestamp ASC, notification_id ASC
            "#,
        )
        .bind(owner_id)
        .bind(since)
        .bind(notif_types)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_timer_added(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE alerts SET is_timer_added = true WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
