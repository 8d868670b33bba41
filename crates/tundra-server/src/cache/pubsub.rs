//! Redis Pub/Sub for cross-instance cache invalidation.

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

use super::backend::CachedEntry;

pub const INVALIDATION_CHANNEL: &str = "cache:invalidate";

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Keeps this instance's L1 in sync with invalidations published by others.
///
/// A payload is either a single key, or a prefix followed by `*`.
///
/// ```text
/// Instance 1: cache.invalidate_prefix("products:")
///   ↓
/// Redis Pub/Sub: PUBLISH cache:invalidate "products:*"
///   ↓
/// Instance 2: Listener receives "products:*" → drops matching L1 keys
/// ```
pub struct CacheInvalidationListener {
    pub redis_url: String,
    pub local_cache: Arc<DashMap<String, CachedEntry>>,
}

impl CacheInvalidationListener {
    /// Spawns the listener. Lost connections are retried with exponential
    /// backoff capped at five minutes.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            loop {
                match self.run().await {
                    Ok(()) => {
                        backoff = Duration::from_secs(1);
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "Cache invalidation listener error, reconnecting..."
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        })
    }

    async fn run(&self) -> Result<(), String> {
        use futures_util::StreamExt;

        let client = redis::Client::open(self.redis_url.clone())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;
        pubsub
            .subscribe(INVALIDATION_CHANNEL)
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;

        tracing::info!(channel = INVALIDATION_CHANNEL, "Subscribed to cache invalidations");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            match msg.get_payload::<String>() {
                Ok(payload) => {
                    tracing::debug!(payload = %payload, "received cache invalidation");
                    apply_invalidation(&self.local_cache, &payload);
                }
                Err(_) => tracing::warn!("failed to parse invalidation message payload"),
            }
        }
        Err("pub/sub connection closed".to_string())
    }
}

pub(crate) fn apply_invalidation(local: &DashMap<String, CachedEntry>, payload: &str) {
    match payload.strip_suffix('*') {
        Some(prefix) => local.retain(|key, _| !key.starts_with(prefix)),
        None => {
            local.remove(payload);
        }
    }
}

pub async fn publish_invalidation(redis: &Pool, payload: &str) -> Result<(), String> {
    let mut conn = redis
        .get()
        .await
        .map_err(|e| format!("failed to get Redis connection: {e}"))?;

    conn.publish::<_, _, ()>(INVALIDATION_CHANNEL, payload)
        .await
        .map_err(|e| format!("failed to publish invalidation: {e}"))?;

    tracing::debug!(payload = %payload, "published cache invalidation");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CachedEntry {
        CachedEntry::new(b"x".to_vec(), Duration::from_secs(60))
    }

    #[test]
    fn test_apply_key_invalidation() {
        let local = DashMap::new();
        local.insert("products:page:1".to_string(), entry());
        local.insert("products:page:2".to_string(), entry());

        apply_invalidation(&local, "products:page:1");
        assert!(!local.contains_key("products:page:1"));
        assert!(local.contains_key("products:page:2"));
    }

    #[test]
    fn test_apply_prefix_invalidation() {
        let local = DashMap::new();
        local.insert("products:page:1".to_string(), entry());
        local.insert("products:page:2".to_string(), entry());
        local.insert("sessions:1".to_string(), entry());

        apply_invalidation(&local, "products:*");
        assert_eq!(local.len(), 1);
        assert!(local.contains_key("sessions:1"));
    }
}
