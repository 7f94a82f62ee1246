//! Explicit startup steps: pool creation and schema initialization.
//!
//! Both run once before the server accepts requests. The schema is a versioned
//! contract in `migrations/`; nothing probes columns at runtime.

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::{config::DatabaseConfig, Result};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Connect a pool with the configured bounds. Every connection gets the
/// configured `statement_timeout`.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let statement_timeout = config.statement_timeout_seconds;

    let pool = PgPoolOptions::new()
        .min_connections(config.pool_min_size)
        .max_connections(config.pool_max_size)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                if statement_timeout > 0 {
                    sqlx::query(&format!("SET statement_timeout = '{}s'", statement_timeout))
                        .execute(&mut *conn)
                        .await?;
                }
                Ok(())
            })
        })
        .connect(&config.url)
        .await?;

    tracing::info!(
        min = config.pool_min_size,
        max = config.pool_max_size,
        "Database pool connected"
    );
    Ok(pool)
}

/// Apply pending migrations. Idempotent: applied versions are skipped.
pub async fn initialize_schema(pool: &PgPool) -> Result<()> {
    MIGRATOR.run(pool).await?;
    tracing::info!("Database schema up to date");
    Ok(())
}
