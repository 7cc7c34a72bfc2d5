//! Database connection and pool management
//!
//! Pool settings, migrations and the readiness check query.

use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Name reported to Postgres in `pg_stat_activity`
const APPLICATION_NAME: &str = "health-butler";

/// Pool tuning beyond what the app config exposes
pub struct PoolSettings {
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// Create the PostgreSQL connection pool
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    create_pool_with(config, &PoolSettings::default()).await
}

pub async fn create_pool_with(config: &DatabaseConfig, settings: &PoolSettings) -> Result<PgPool> {
    let connect_options = PgConnectOptions::from_str(&config.url)?.application_name(APPLICATION_NAME);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(settings.min_connections.min(config.max_connections))
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .max_lifetime(settings.max_lifetime)
        .test_before_acquire(true)
        .connect_with(connect_options)
        .await?;

    info!(
        max = config.max_connections,
        min = settings.min_connections,
        "Database pool created"
    );
    Ok(pool)
}

/// Apply pending migrations from `backend/migrations`
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

/// Round trip used by the readiness check
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| {
            warn!(error = %e, "Database health check failed");
            e.into()
        })
}
