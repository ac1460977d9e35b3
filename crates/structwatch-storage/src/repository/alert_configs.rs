//! Fuel alert config repository
//!
//! Updating the window of a config re-arms it: every dedup record the
//! config has produced is deleted in the same transaction.

use crate::db::DatabasePool;
use crate::models::{AlertConfigKind, FuelAlertConfig, JumpFuelAlertConfig};
use async_trait::async_trait;
use structwatch_common::types::AlertConfigId;
use structwatch_common::{Error, Result};

/// Alert config repository trait
#[async_trait]
pub trait AlertConfigRepository: Send + Sync {
    async fn list_fuel_configs(&self) -> Result<Vec<FuelAlertConfig>>;
    async fn list_jump_fuel_configs(&self) -> Result<Vec<JumpFuelAlertConfig>>;
    /// Validate and insert; the `id` of the input is ignored
    async fn create_fuel_config(&self, config: &FuelAlertConfig) -> Result<FuelAlertConfig>;
    async fn update_fuel_config(&self, config: &FuelAlertConfig) -> Result<()>;
    async fn create_jump_fuel_config(
        &self,
        config: &JumpFuelAlertConfig,
    ) -> Result<JumpFuelAlertConfig>;
    async fn update_jump_fuel_config(&self, config: &JumpFuelAlertConfig) -> Result<()>;
}

/// Reject configs whose alert windows overlap an existing one
pub fn check_no_overlap(config: &FuelAlertConfig, existing: &[FuelAlertConfig]) -> Result<()> {
    config.validate()?;
    if existing
        .iter()
        .filter(|other| other.id != config.id)
        .any(|other| config.overlaps(other))
    {
        return Err(Error::Validation(
            "This configuration may not overlap with an existing configuration".to_string(),
        ));
    }
    Ok(())
}

/// Database alert config repository
pub struct DbAlertConfigRepository {
    pool: DatabasePool,
}

impl DbAlertConfigRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn clear_records(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        kind: AlertConfigKind,
        config_id: AlertConfigId,
    ) -> Result<()> {
        sqlx::query("DELETE FROM fuel_alert_records WHERE config_kind = $1 AND config_id = $2")
            .bind(kind.as_str())
            .bind(config_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AlertConfigRepository for DbAlertConfigRepository {
    async fn list_fuel_configs(&self) -> Result<Vec<FuelAlertConfig>> {
        sqlx::query_as::<_, FuelAlertConfig>("SELECT * FROM fuel_alert_configs ORDER BY id")
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_jump_fuel_configs(&self) -> Result<Vec<JumpFuelAlertConfig>> {
        sqlx::query_as::<_, JumpFuelAlertConfig>(
            "SELECT * FROM jump_fuel_alert_configs ORDER BY id",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn create_fuel_config(&self, config: &FuelAlertConfig) -> Result<FuelAlertConfig> {
        let existing = self.list_fuel_configs().await?;
        check_no_overlap(config, &existing)?;

        sqlx::query_as::<_, FuelAlertConfig>(
            r#"
            INSERT INTO fuel_alert_configs (
                start_hours, end_hours, repeat_hours, channel_ping_type, color, is_enabled
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(config.start_hours)
        .bind(config.end_hours)
        .bind(config.repeat_hours)
        .bind(&config.channel_ping_type)
        .bind(config.color)
        .bind(config.is_enabled)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_fuel_config(&self, config: &FuelAlertConfig) -> Result<()> {
        let existing = self.list_fuel_configs().await?;
        check_no_overlap(config, &existing)?;
        let old = existing
            .iter()
            .find(|c| c.id == config.id)
            .ok_or_else(|| Error::NotFound(format!("fuel alert config {}", config.id)))?;
        let window_changed = old.start_hours != config.start_hours
            || old.end_hours != config.end_hours
            || old.repeat_hours != config.repeat_hours;

        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE fuel_alert_configs
            SET start_hours = $2, end_hours = $3, repeat_hours = $4,
                channel_ping_type = $5, color = $6, is_enabled = $7
            WHERE id = $1
            "#,
        )
        .bind(config.id)
        .bind(config.start_hours)
        .bind(config.end_hours)
        .bind(config.repeat_hours)
        .bind(&config.channel_ping_type)
        .bind(config.color)
        .bind(config.is_enabled)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if window_changed {
            Self::clear_records(&mut tx, AlertConfigKind::Fuel, config.id).await?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn create_jump_fuel_config(
        &self,
        config: &JumpFuelAlertConfig,
    ) -> Result<JumpFuelAlertConfig> {
        if config.threshold < 0 {
            return Err(Error::Validation(
                "Threshold must not be negative".to_string(),
            ));
        }

        sqlx::query_as::<_, JumpFuelAlertConfig>(
            r#"
            INSERT INTO jump_fuel_alert_configs (threshold, channel_ping_type, color, is_enabled)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(config.threshold)
        .bind(&config.channel_ping_type)
        .bind(config.color)
        .bind(config.is_enabled)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_jump_fuel_config(&self, config: &JumpFuelAlertConfig) -> Result<()> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let old_threshold: Option<i64> = sqlx::query_scalar(
            "SELECT threshold FROM jump_fuel_alert_configs WHERE id = $1 FOR UPDATE",
        )
        .bind(config.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        let old_threshold = old_threshold
            .ok_or_else(|| Error::NotFound(format!("jump fuel alert config {}", config.id)))?;

        sqlx::query(
            r#"
            UPDATE jump_fuel_alert_configs
            SET threshold = $2, channel_ping_type = $3, color = $4, is_enabled = $5
            WHERE id = $1
            "#,
        )
        .bind(config.id)
        .bind(config.threshold)
        .bind(&config.channel_ping_type)
        .bind(config.color)
        .bind(config.is_enabled)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if old_threshold != config.threshold {
            Self::clear_records(&mut tx, AlertConfigKind::JumpFuel, config.id).await?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
