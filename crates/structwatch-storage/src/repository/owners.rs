//! Owner repository

use crate::db::DatabasePool;
use crate::models::Owner;
use async_trait::async_trait;
use structwatch_common::types::OwnerId;
use structwatch_common::{Error, Result};

/// Owner repository trait
#[async_trait]
pub trait OwnerRepository: Send + Sync {
    async fn get(&self, id: OwnerId) -> Result<Option<Owner>>;
    async fn list_active(&self) -> Result<Vec<Owner>>;
    async fn upsert(&self, owner: &Owner) -> Result<()>;
    /// Store a rotated SSO refresh token
    async fn update_refresh_token(&self, id: OwnerId, refresh_token: &str) -> Result<()>;
}

/// Database owner repository
pub struct DbOwnerRepository {
    pool: DatabasePool,
}

impl DbOwnerRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnerRepository for DbOwnerRepository {
    async fn get(&self, id: OwnerId) -> Result<Option<Owner>> {
        sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE corporation_id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<Owner>> {
        sqlx::query_as::<_, Owner>(
            "SELECT * FROM owners WHERE is_active = true ORDER BY corporation_id",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn upsert(&self, owner: &Owner) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO owners (
                corporation_id, corporation_name, alliance_id, alliance_name, character_id,
                refresh_token, is_active, is_alliance_main, has_default_pings_enabled,
                ping_groups, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (corporation_id) DO UPDATE SET
                corporation_name = EXCLUDED.corporation_name,
                alliance_id = EXCLUDED.alliance_id,
                alliance_name = EXCLUDED.alliance_name,
                character_id = EXCLUDED.character_id,
                refresh_token = EXCLUDED.refresh_token,
                is_active = EXCLUDED.is_active,
                is_alliance_main = EXCLUDED.is_alliance_main,
                has_default_pings_enabled = EXCLUDED.has_default_pings_enabled,
                ping_groups = EXCLUDED.ping_groups,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(owner.corporation_id)
        .bind(&owner.corporation_name)
        .bind(owner.alliance_id)
        .bind(&owner.alliance_name)
        .bind(owner.character_id)
        .bind(&owner.refresh_token)
        .bind(owner.is_active)
        .bind(owner.is_alliance_main)
        .bind(owner.has_default_pings_enabled)
        .bind(&owner.ping_groups)
        .bind(owner.created_at)
        .bind(chrono::Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_refresh_token(&self, id: OwnerId, refresh_token: &str) -> Result<()> {
        sqlx::query(
            "UPDATE owners SET refresh_token = $2, updated_at = $3 WHERE corporation_id = $1",
        )
        .bind(id)
        .bind(refresh_token)
        .bind(chrono::Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
