//! Postgres pool backing `PgStore`

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};
use wacm_common::config::DatabaseConfig;
use wacm_common::{Error, Result};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection URL of a `postgres` backend section
fn postgres_url(config: &DatabaseConfig) -> Result<&str> {
    if config.backend != "postgres" {
        return Err(Error::Config(format!(
            "Storage backend '{}' does not use a connection pool",
            config.backend
        )));
    }
    config
        .url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| Error::Config("database.url is required for postgres".to_string()))
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    let max = config.max_connections.max(1);
    PgPoolOptions::new()
        .max_connections(max)
        .min_connections(config.min_connections.min(max))
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

/// Shared Postgres pool
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Open the pool described by `[database]`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = postgres_url(config)?;
        debug!(max_connections = config.max_connections, "Opening Postgres pool");

        let pool = pool_options(config)
            .connect(url)
            .await
            .map_err(|e| Error::Database(format!("Cannot reach Postgres: {}", e)))?;
        info!("Connected to Postgres");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Bring the schema up to date
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Schema migration failed: {}", e)))?;
        info!(migrations = MIGRATOR.iter().count(), "Schema up to date");
        Ok(())
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Postgres health check failed: {}", e)))?;
        Ok(())
    }
}
