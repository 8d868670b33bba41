//! Two-tier caching.
//!
//! - **L1 (DashMap)**: in-memory, per instance
//! - **L2 (Redis)**: shared across instances
//! - **Pub/Sub**: cross-instance L1 invalidation
//!
//! ```text
//! GET /products → L1 (DashMap) → L2 (Redis) → PostgreSQL
//! ```
//!
//! If Redis is disabled or unreachable the backend runs L1-only.

pub mod backend;
pub mod products;
pub mod pubsub;

pub use backend::{CacheBackend, CacheStats, CachedEntry};
pub use products::{PRODUCT_LIST_PREFIX, ProductListCache};
pub use pubsub::{CacheInvalidationListener, INVALIDATION_CHANNEL, publish_invalidation};
