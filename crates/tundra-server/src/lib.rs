pub mod cache;
pub mod config;
pub mod handlers;
pub mod media;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod rate_limit;
pub mod server;

pub use cache::{CacheBackend, CachedEntry, ProductListCache};
pub use config::{AppConfig, CacheConfig, RateLimitConfig, RedisConfig, ServerConfig};
pub use media::{CloudinaryClient, CloudinaryConfig, ImageStore, MediaError};
pub use observability::init_tracing;
pub use rate_limit::{RateLimiters, RateSpec, TierLimiter};
pub use server::{AppState, ServerBuilder, TundraServer, build_app};

/// Create a cache backend based on configuration.
///
/// ## Cache Modes
///
/// - **Redis disabled**: Returns local-only cache (DashMap)
/// - **Redis enabled**: Attempts to connect to Redis, falls back to local on failure
///
/// A connected backend also starts the pub/sub listener that keeps this
/// instance's L1 in step with invalidations published by other instances.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    use std::time::Duration;

    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    tracing::info!(url = %tundra_db_postgres::mask_password(&config.url), "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let timeout = Some(Duration::from_millis(config.timeout_ms));
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = timeout;
    pool_config.timeouts.create = timeout;
    pool_config.timeouts.recycle = timeout;
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return CacheBackend::new_local();
        }
    };

    // Test connection
    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            let backend = CacheBackend::new_redis(pool);
            cache::CacheInvalidationListener {
                redis_url: config.url.clone(),
                local_cache: backend.local_cache().clone(),
            }
            .start();
            backend
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local cache."
            );
            CacheBackend::new_local()
        }
    }
}
