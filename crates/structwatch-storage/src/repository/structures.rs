//! Structure repository

use crate::db::DatabasePool;
use crate::models::Structure;
use async_trait::async_trait;
use structwatch_common::types::{EveId, OwnerId, StructureId};
use structwatch_common::{Error, Result};

/// Structure repository trait
#[async_trait]
pub trait StructureRepository: Send + Sync {
    async fn get(&self, id: StructureId) -> Result<Option<Structure>>;
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Structure>>;
    /// Structures with a known fuel expiry, any owner
    async fn list_with_fuel_expiry(&self) -> Result<Vec<Structure>>;
    async fn list_jump_gates(&self) -> Result<Vec<Structure>>;
    async fn find_by_moon(&self, moon_id: EveId) -> Result<Option<Structure>>;
    async fn find_by_planet(&self, planet_id: EveId) -> Result<Option<Structure>>;
    /// Insert or update a structure, returning the previous row if any
    async fn upsert(&self, structure: &Structure) -> Result<Option<Structure>>;
    /// Delete an owner's structures that are not in `keep`
    async fn delete_missing(&self, owner_id: OwnerId, keep: &[StructureId]) -> Result<u64>;
}

/// Database structure repository
pub struct DbStructureRepository {
    pool: DatabasePool,
}

impl DbStructureRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StructureRepository for DbStructureRepository {
    async fn get(&self, id: StructureId) -> Result<Option<Structure>> {
        sqlx::query_as::<_, Structure>("SELECT * FROM structures WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Structure>> {
        sqlx::query_as::<_, Structure>(
            "SELECT * FROM structures WHERE owner_id = $1 ORDER BY name",
        )
        .bind(owner_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_with_fuel_expiry(&self) -> Result<Vec<Structure>> {
        sqlx::query_as::<_, Structure>(
            "SELECT * FROM structures WHERE fuel_expires_at IS NOT NULL ORDER BY id",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_jump_gates(&self) -> Result<Vec<Structure>> {
        sqlx::query_as::<_, Structure>(
            "SELECT * FROM structures WHERE kind = 'jump_gate' ORDER BY id",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_moon(&self, moon_id: EveId) -> Result<Option<Structure>> {
        sqlx::query_as::<_, Structure>(
            "SELECT * FROM structures WHERE eve_moon_id = $1 ORDER BY id LIMIT 1",
        )
        .bind(moon_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_planet(&self, planet_id: EveId) -> Result<Option<Structure>> {
        sqlx::query_as::<_, Structure>(
            "SELECT * FROM structures WHERE eve_planet_id = $1 ORDER BY id LIMIT 1",
        )
        .bind(planet_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn upsert(&self, structure: &Structure) -> Result<Option<Structure>> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let previous =
            sqlx::query_as::<_, Structure>("SELECT * FROM structures WHERE id = $1 FOR UPDATE")
                .bind(structure.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO structures (
                id, owner_id, kind, name, eve_type_id, eve_solar_system_id, eve_moon_id,
                eve_planet_id, fuel_expires_at, jump_fuel_quantity, services, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                kind = EXCLUDED.kind,
                name = EXCLUDED.name,
                eve_type_id = EXCLUDED.eve_type_id,
                eve_solar_system_id = EXCLUDED.eve_solar_system_id,
                eve_moon_id = EXCLUDED.eve_moon_id,
                eve_planet_id = EXCLUDED.eve_planet_id,
                fuel_expires_at = EXCLUDED.fuel_expires_at,
                jump_fuel_quantity = EXCLUDED.jump_fuel_quantity,
                services = EXCLUDED.services,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(structure.id)
        .bind(structure.owner_id)
        .bind(&structure.kind)
        .bind(&structure.name)
        .bind(structure.eve_type_id)
        .bind(structure.eve_solar_system_id)
        .bind(structure.eve_moon_id)
        .bind(structure.eve_planet_id)
        .bind(structure.fuel_expires_at)
        .bind(structure.jump_fuel_quantity)
        .bind(&structure.services)
        .bind(structure.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(previous)
    }

    async fn delete_missing(&self, owner_id: OwnerId, keep: &[StructureId]) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM structures WHERE owner_id = $1 AND NOT (id = ANY($2))")
                .bind(owner_id)
                .bind(keep)
                .execute(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
