//! Cache backend with L1 (DashMap) and L2 (Redis) tiers.

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::pubsub::{INVALIDATION_CHANNEL, publish_invalidation};

/// A cached entry with TTL support.
///
/// The data is wrapped in `Arc` so cache hits are cheap to hand out.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Two-tier cache backend: L1 (DashMap) + L2 (Redis).
///
/// - **Local**: single instance, DashMap only
/// - **Redis**: DashMap in front of a shared Redis, kept coherent across
///   instances through the `cache:invalidate` channel
///
/// Redis failures are logged and treated as misses; no operation here fails.
#[derive(Clone)]
pub enum CacheBackend {
    Local(Arc<DashMap<String, CachedEntry>>),

    Redis {
        redis: Pool,
        local: Arc<DashMap<String, CachedEntry>>,
    },
}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("CacheBackend")
            .field("mode", &stats.mode)
            .field("l1_entries", &stats.l1_entries)
            .finish()
    }
}

impl CacheBackend {
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    pub fn new_redis(redis_pool: Pool) -> Self {
        CacheBackend::Redis {
            redis: redis_pool,
            local: Arc::new(DashMap::new()),
        }
    }

    /// Get a value from the cache.
    ///
    /// L1 is checked first, then L2. An L2 hit is promoted to L1 for the
    /// key's remaining Redis lifetime.
    pub async fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let local = self.local();
        if let Some(entry) = local.get(key) {
            if !entry.is_expired() {
                tracing::debug!(key = %key, "cache hit (L1)");
                crate::metrics::record_cache_hit("l1");
                return Some(Arc::clone(&entry.data));
            }
            drop(entry);
            local.remove(key);
        }

        let CacheBackend::Redis { redis, .. } = self else {
            crate::metrics::record_cache_miss();
            return None;
        };

        let mut conn = match redis.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get Redis connection");
                crate::metrics::record_cache_miss();
                return None;
            }
        };

        let lookup: redis::RedisResult<(Option<Vec<u8>>, i64)> = redis::pipe()
            .get(key)
            .pttl(key)
            .query_async(&mut conn)
            .await;

        match lookup {
            Ok((Some(data), pttl)) => {
                tracing::debug!(key = %key, "cache hit (L2)");
                crate::metrics::record_cache_hit("l2");
                let entry = CachedEntry::new(data, promotion_ttl(pttl));
                let data = Arc::clone(&entry.data);
                local.insert(key.to_string(), entry);
                Some(data)
            }
            Ok((None, _)) => {
                tracing::debug!(key = %key, "cache miss");
                crate::metrics::record_cache_miss();
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis GET error");
                crate::metrics::record_cache_miss();
                None
            }
        }
    }

    /// Store a value in both tiers with the given TTL.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let entry = CachedEntry::new(value, ttl);
        let data = Arc::clone(&entry.data);
        self.local().insert(key.to_string(), entry);

        if let CacheBackend::Redis { redis, .. } = self {
            let ttl_secs = ttl.as_secs().max(1);
            match redis.get().await {
                Ok(mut conn) => {
                    if let Err(e) = conn.set_ex::<_, _, ()>(key, &*data, ttl_secs).await {
                        tracing::warn!(key = %key, error = %e, "Redis SET error");
                    } else {
                        tracing::debug!(key = %key, ttl_secs, "cache set (L1+L2)");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to get Redis connection"),
            }
        }
    }

    /// Remove one key from both tiers and notify other instances.
    pub async fn invalidate(&self, key: &str) {
        self.local().remove(key);

        if let CacheBackend::Redis { redis, .. } = self {
            match redis.get().await {
                Ok(mut conn) => {
                    if let Err(e) = conn.del::<_, ()>(key).await {
                        tracing::warn!(key = %key, error = %e, "Redis DEL error");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to get Redis connection"),
            }
            if let Err(e) = publish_invalidation(redis, key).await {
                tracing::warn!(key = %key, error = %e, "Redis PUBLISH error");
            }
        }
        tracing::debug!(key = %key, "cache invalidated");
    }

    /// Remove every key starting with `prefix` from both tiers.
    ///
    /// Other instances are told to drop the prefix from their L1 by
    /// publishing `{prefix}*` on the invalidation channel.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        self.local().retain(|key, _| !key.starts_with(prefix));

        if let CacheBackend::Redis { redis, .. } = self {
            match delete_matching(redis, prefix).await {
                Ok(deleted) => tracing::debug!(prefix = %prefix, deleted, "Redis prefix cleared"),
                Err(e) => tracing::warn!(prefix = %prefix, error = %e, "Redis prefix DEL error"),
            }
            let pattern = format!("{prefix}*");
            if let Err(e) = publish_invalidation(redis, &pattern).await {
                tracing::warn!(
                    channel = INVALIDATION_CHANNEL,
                    error = %e,
                    "Redis PUBLISH error"
                );
            }
        }
        tracing::debug!(prefix = %prefix, "cache prefix invalidated");
    }

    /// Drop expired L1 entries and return how many were removed.
    ///
    /// Entries are otherwise only evicted when their own key is read again,
    /// and listing keys carry client-chosen search terms.
    pub fn purge_expired(&self) -> usize {
        let local = self.local();
        let before = local.len();
        local.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(local.len())
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval`.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "expired L1 entries removed");
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        match self {
            CacheBackend::Local(map) => CacheStats {
                l1_entries: map.len(),
                mode: "local",
            },
            CacheBackend::Redis { local, .. } => CacheStats {
                l1_entries: local.len(),
                mode: "redis",
            },
        }
    }

    /// Check if Redis is reachable (for health checks).
    pub async fn is_redis_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => false,
            CacheBackend::Redis { redis, .. } => redis.get().await.is_ok(),
        }
    }

    pub fn local_cache(&self) -> &Arc<DashMap<String, CachedEntry>> {
        self.local()
    }

    fn local(&self) -> &Arc<DashMap<String, CachedEntry>> {
        match self {
            CacheBackend::Local(map) => map,
            CacheBackend::Redis { local, .. } => local,
        }
    }
}

/// L1 lifetime for a value promoted from Redis with `pttl` milliseconds left.
fn promotion_ttl(pttl: i64) -> Duration {
    const FALLBACK: Duration = Duration::from_secs(60);
    u64::try_from(pttl)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(FALLBACK)
}

/// Escape glob metacharacters for a Redis `MATCH` pattern.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

async fn delete_matching(redis: &Pool, prefix: &str) -> Result<usize, String> {
    let mut conn = redis
        .get()
        .await
        .map_err(|e| format!("failed to get Redis connection: {e}"))?;
    let pattern = format!("{}*", escape_glob(prefix));

    let mut cursor: u64 = 0;
    let mut deleted = 0;
    loop {
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(100)
            .query_async(&mut conn)
            .await
            .map_err(|e| format!("SCAN failed: {e}"))?;

        if !keys.is_empty() {
            let removed: usize = conn
                .del(&keys)
                .await
                .map_err(|e| format!("DEL failed: {e}"))?;
            deleted += removed;
        }
        if next == 0 {
            return Ok(deleted);
        }
        cursor = next;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub l1_entries: usize,
    pub mode: &'static str,
}
