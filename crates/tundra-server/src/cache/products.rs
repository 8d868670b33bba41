//! Cached product listing pages.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tundra_core::ProductPage;

use super::backend::CacheBackend;

/// Every listing key starts with this prefix.
pub const PRODUCT_LIST_PREFIX: &str = "products:";

/// Caches serialized [`ProductPage`]s keyed by page, size and search term.
///
/// A generation counter is bumped on every [`invalidate_all`](Self::invalidate_all),
/// so a page read from the database before a write can be refused by
/// [`put_if_current`](Self::put_if_current).
#[derive(Debug, Clone)]
pub struct ProductListCache {
    backend: CacheBackend,
    ttl: Duration,
    generation: Arc<AtomicU64>,
}

impl ProductListCache {
    pub fn new(backend: CacheBackend, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Read before querying the database; pass to [`put_if_current`](Self::put_if_current).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn key(page: u32, size: u32, search: Option<&str>) -> String {
        format!(
            "{PRODUCT_LIST_PREFIX}page:{page}:size:{size}:search:{}",
            search.unwrap_or_default()
        )
    }

    /// A corrupt entry is dropped and reported as a miss.
    pub async fn get(&self, page: u32, size: u32, search: Option<&str>) -> Option<ProductPage> {
        let key = Self::key(page, size, search);
        let data = self.backend.get(&key).await?;
        match serde_json::from_slice(&data) {
            Ok(page) => Some(page),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                self.backend.invalidate(&key).await;
                None
            }
        }
    }

    pub async fn put(&self, page: u32, size: u32, search: Option<&str>, value: &ProductPage) {
        let key = Self::key(page, size, search);
        match serde_json::to_vec(value) {
            Ok(bytes) => self.backend.set(&key, bytes, self.ttl).await,
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to serialize product page"),
        }
    }

    /// Store `value` only if no invalidation happened since `generation` was
    /// read. Returns whether the page was kept.
    pub async fn put_if_current(
        &self,
        generation: u64,
        page: u32,
        size: u32,
        search: Option<&str>,
        value: &ProductPage,
    ) -> bool {
        if self.generation() != generation {
            tracing::debug!(page, size, "Listing changed while loading, not caching");
            return false;
        }
        self.put(page, size, search, value).await;

        // An invalidation that landed between the check and the write may
        // have run before our entry existed.
        if self.generation() != generation {
            self.backend.invalidate(&Self::key(page, size, search)).await;
            return false;
        }
        true
    }

    /// Drop every cached listing page.
    pub async fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.backend.invalidate_prefix(PRODUCT_LIST_PREFIX).await;
    }

    pub fn backend(&self) -> &CacheBackend {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(total: u64) -> ProductPage {
        ProductPage::new(1, 10, total, Vec::new())
    }

    #[test]
    fn test_key_format() {
        assert_eq!(
            ProductListCache::key(2, 20, Some("lamp")),
            "products:page:2:size:20:search:lamp"
        );
        assert_eq!(
            ProductListCache::key(1, 10, None),
            "products:page:1:size:10:search:"
        );
    }

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let cache = ProductListCache::new(CacheBackend::new_local(), Duration::from_secs(300));
        assert!(cache.get(1, 10, None).await.is_none());

        cache.put(1, 10, None, &page(3)).await;
        cache.put(1, 10, Some("desk"), &page(1)).await;
        assert_eq!(cache.get(1, 10, None).await, Some(page(3)));
        assert_eq!(cache.get(1, 10, Some("desk")).await, Some(page(1)));

        cache.invalidate_all().await;
        assert!(cache.get(1, 10, None).await.is_none());
        assert!(cache.get(1, 10, Some("desk")).await.is_none());
    }

    #[tokio::test]
    async fn test_page_loaded_before_invalidation_is_not_cached() {
        let cache = ProductListCache::new(CacheBackend::new_local(), Duration::from_secs(300));

        let generation = cache.generation();
        // A write commits while the page is being read from the database.
        cache.invalidate_all().await;

        assert!(!cache.put_if_current(generation, 1, 10, None, &page(3)).await);
        assert!(cache.get(1, 10, None).await.is_none());

        let generation = cache.generation();
        assert!(cache.put_if_current(generation, 1, 10, None, &page(4)).await);
        assert_eq!(cache.get(1, 10, None).await, Some(page(4)));
    }

    #[tokio::test]
    async fn test_clones_share_generation() {
        let cache = ProductListCache::new(CacheBackend::new_local(), Duration::from_secs(300));
        let handle = cache.clone();
        let generation = cache.generation();
        handle.invalidate_all().await;
        assert_eq!(cache.generation(), generation + 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let backend = CacheBackend::new_local();
        let cache = ProductListCache::new(backend.clone(), Duration::from_secs(300));
        backend
            .set(&ProductListCache::key(1, 10, None), b"not json".to_vec(), Duration::from_secs(60))
            .await;
        assert!(cache.get(1, 10, None).await.is_none());
        assert_eq!(backend.stats().l1_entries, 0);
    }
}
