//! PostgreSQL pool and schema migrations

use sqlx::postgres::{PgPool, PgPoolOptions};
use structwatch_common::config::DatabaseConfig;
use structwatch_common::{Error, Result};
use tracing::{debug, info};

/// Shared handle to the PostgreSQL pool used by every `Db*` repository
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(Error::Config("database.url is not set".to_string()));
        }

        debug!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Opening database pool"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(format!("connecting to database: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations (owners, structures, alerts, fuel
    /// alert ledger, sync states and the webhook queue)
    pub async fn migrate(&self) -> Result<()> {
        let migrator = sqlx::migrate!("./migrations");
        info!(migrations = migrator.iter().count(), "Applying schema migrations");
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("applying migrations: {}", e)))
    }
}
