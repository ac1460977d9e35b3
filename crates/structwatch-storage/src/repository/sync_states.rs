//! Sync state repository

use crate::db::DatabasePool;
use crate::models::SyncState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use structwatch_common::types::{OwnerId, Subsystem, SyncError};
use structwatch_common::{Error, Result};

/// Sync state repository trait
#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    /// Record the outcome of a sync run at `at`. Outcomes older than the
    /// stored one are ignored, so `last_sync` never moves backwards.
    /// Returns true when the outcome was applied.
    async fn record(
        &self,
        owner_id: OwnerId,
        subsystem: Subsystem,
        at: DateTime<Utc>,
        error: SyncError,
    ) -> Result<bool>;
    async fn get(&self, owner_id: OwnerId, subsystem: Subsystem) -> Result<Option<SyncState>>;
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<SyncState>>;
}

/// Database sync state repository
pub struct DbSyncStateRepository {
    pool: DatabasePool,
}

impl DbSyncStateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStateRepository for DbSyncStateRepository {
    async fn record(
        &self,
        owner_id: OwnerId,
        subsystem: Subsystem,
        at: DateTime<Utc>,
        error: SyncError,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_states (owner_id, subsystem, last_sync, last_error)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (owner_id, subsystem) DO UPDATE SET
                last_sync = EXCLUDED.last_sync,
                last_error = EXCLUDED.last_error
            WHERE sync_states.last_sync <= EXCLUDED.last_sync
            "#,
        )
        .bind(owner_id)
        .bind(subsystem.as_str())
        .bind(at)
        .bind(error.code())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, owner_id: OwnerId, subsystem: Subsystem) -> Result<Option<SyncState>> {
        sqlx::query_as::<_, SyncState>(
            "SELECT * FROM sync_states WHERE owner_id = $1 AND subsystem = $2",
        )
        .bind(owner_id)
        .bind(subsystem.as_str())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<SyncState>> {
        sqlx::query_as::<_, SyncState>(
            "SELECT * FROM sync_states WHERE owner_id = $1 ORDER BY subsystem",
        )
        .bind(owner_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
