//! Fuel alert dedup ledger
//!
//! A record (structure, config kind, config id, bucket) exists once the
//! corresponding alert has fired. Recording relies on the primary key so
//! that concurrent scheduler runs race on the insert, not on a lookup.

use crate::db::DatabasePool;
use crate::models::{AlertConfigKind, FuelAlertRecord};
use async_trait::async_trait;
use structwatch_common::types::{AlertConfigId, StructureId};
use structwatch_common::{Error, Result};

/// Fuel alert record repository trait
#[async_trait]
pub trait FuelAlertRepository: Send + Sync {
    /// Insert the record if absent. Returns true when this call created it.
    async fn try_record(
        &self,
        structure_id: StructureId,
        kind: AlertConfigKind,
        config_id: AlertConfigId,
        bucket: i64,
    ) -> Result<bool>;
    async fn list_for_structure(&self, structure_id: StructureId) -> Result<Vec<FuelAlertRecord>>;
    /// Delete all records of one kind for a structure
    async fn clear_for_structure(&self, structure_id: StructureId, kind: AlertConfigKind)
        -> Result<u64>;
    /// Delete jump fuel records whose threshold is now below the quantity
    async fn clear_jump_below(&self, structure_id: StructureId, quantity: i64) -> Result<u64>;
}

/// Database fuel alert record repository
pub struct DbFuelAlertRepository {
    pool: DatabasePool,
}

impl DbFuelAlertRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FuelAlertRepository for DbFuelAlertRepository {
    async fn try_record(
        &self,
        structure_id: StructureId,
        kind: AlertConfigKind,
        config_id: AlertConfigId,
        bucket: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO fuel_alert_records (structure_id, config_kind, config_id, bucket, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(structure_id)
        .bind(kind.as_str())
        .bind(config_id)
        .bind(bucket)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_for_structure(&self, structure_id: StructureId) -> Result<Vec<FuelAlertRecord>> {
        sqlx::query_as::<_, FuelAlertRecord>(
            "SELECT * FROM fuel_alert_records WHERE structure_id = $1 ORDER BY created_at",
        )
        .bind(structure_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn clear_for_structure(
        &self,
        structure_id: StructureId,
        kind: AlertConfigKind,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM fuel_alert_records WHERE structure_id = $1 AND config_kind = $2",
        )
        .bind(structure_id)
        .bind(kind.as_str())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn clear_jump_below(&self, structure_id: StructureId, quantity: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM fuel_alert_records r
            USING jump_fuel_alert_configs c
            WHERE r.structure_id = $1
              AND r.config_kind = 'jump_fuel'
              AND r.config_id = c.id
              AND c.threshold < $2
            "#,
        )
        .bind(structure_id)
        .bind(quantity)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
