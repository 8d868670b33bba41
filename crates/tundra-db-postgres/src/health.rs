//! Database health reporting.

use serde::Serialize;
use sqlx_postgres::PgPool;

use crate::pool::test_connection;

/// Health of the database and its connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseHealth {
    /// `up` or `down`.
    pub status: &'static str,
    pub message: String,
    pub open_connections: u32,
    pub in_use: u32,
    pub idle: u32,
}

impl DatabaseHealth {
    pub fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// Pings the database and reports pool statistics.
pub async fn pool_health(pool: &PgPool) -> DatabaseHealth {
    let open_connections = pool.size();
    let idle = u32::try_from(pool.num_idle()).unwrap_or(u32::MAX);
    let in_use = open_connections.saturating_sub(idle);

    let (status, message) = match test_connection(pool).await {
        Ok(()) => ("up", "It's healthy".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            ("down", format!("db down: {e}"))
        }
    };

    DatabaseHealth {
        status,
        message,
        open_connections,
        in_use,
        idle,
    }
}
