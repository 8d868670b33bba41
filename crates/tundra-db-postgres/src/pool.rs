//! Connection pool management.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::Result;

pub type PgPoolOptions = PoolOptions<Postgres>;

/// Creates a connection pool from the given configuration.
///
/// # Errors
///
/// Returns an error if the settings are unusable or the first connection
/// cannot be established.
#[instrument(skip(config), fields(url = %mask_password(&config.connection_url())))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    config.check()?;

    info!(
        pool_size = config.pool_size,
        connect_timeout_ms = config.connect_timeout_ms,
        idle_timeout_ms = ?config.idle_timeout_ms,
        "Creating PostgreSQL connection pool"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections((config.pool_size / 4).max(1))
        .acquire_timeout(config.connect_timeout())
        .max_lifetime(Duration::from_secs(1800))
        .test_before_acquire(false);

    if let Some(idle_timeout) = config.idle_timeout() {
        options = options.idle_timeout(idle_timeout);
    }

    let pool = options.connect(&config.connection_url()).await?;

    debug!("PostgreSQL connection pool created");

    Ok(pool)
}

/// Runs `SELECT 1` against the pool.
#[instrument(skip(pool))]
pub async fn test_connection(pool: &PgPool) -> Result<()> {
    sqlx_core::query::query("SELECT 1").execute(pool).await?;
    debug!("Database connection test successful");
    Ok(())
}

/// Masks the password in a database URL for logging.
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@')
        && let Some(colon_pos) = url[..at_pos].rfind(':')
    {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if colon_pos > scheme_end {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}
