//! PostgreSQL storage for the Tundra server.
//!
//! # Example
//!
//! ```ignore
//! use tundra_db_postgres::{PostgresConfig, PostgresStore};
//!
//! let store = PostgresStore::connect(&PostgresConfig::from_url(url)).await?;
//! let (products, total) = store.products().list(&query).await?;
//! let order = store.orders().place_order(user_id, &lines).await?;
//! ```
//!
//! # Modules
//!
//! - [`config`]: connection settings
//! - [`pool`]: connection pool management
//! - [`migrations`]: embedded, reversible schema migrations
//! - [`user`], [`product`], [`order`]: table storages
//! - [`health`]: ping and pool statistics

pub mod config;
pub mod error;
pub mod health;
pub mod migrations;
pub mod order;
pub mod pool;
pub mod product;
pub mod user;

use std::sync::Arc;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result, StorageError, StorageResult};
pub use health::{DatabaseHealth, pool_health};
pub use order::OrderStorage;
pub use pool::{create_pool, mask_password, test_connection};
pub use product::{ProductQuery, ProductStorage};
pub use sqlx_postgres::PgPool;
pub use user::UserStorage;

/// Shared handle on the connection pool with accessors for each storage.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Creates the pool and, if configured, applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or migrating fails.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self::new(Arc::new(pool)))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn users(&self) -> UserStorage<'_> {
        UserStorage::new(&self.pool)
    }

    #[must_use]
    pub fn products(&self) -> ProductStorage<'_> {
        ProductStorage::new(&self.pool)
    }

    #[must_use]
    pub fn orders(&self) -> OrderStorage<'_> {
        OrderStorage::new(&self.pool)
    }

    pub async fn health(&self) -> DatabaseHealth {
        pool_health(&self.pool).await
    }
}
