use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::key::{generate_cache_key, key_prefix, CACHE_VERSION};
use super::merge::append_unique;
use super::stats::CacheStats;
use crate::error::CacheError;
use crate::models::{CachedFeed, FeedCacheKey, FeedItem};
use crate::store::KeyValueStore;

/// Entries older than this warrant a background refresh but are still served.
pub const CACHE_TTL_MINUTES: i64 = 5;

/// Entries older than this are treated as absent and evicted on read.
pub const CACHE_MAX_AGE_HOURS: i64 = 24;

/// Freshness thresholds for a `FeedCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCacheOptions {
    pub ttl: Duration,
    pub max_age: Duration,
}

impl Default for FeedCacheOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(CACHE_TTL_MINUTES),
            max_age: Duration::hours(CACHE_MAX_AGE_HOURS),
        }
    }
}

/// Cache-first storage for listing feeds.
///
/// Reads go through an in-memory shadow before the persistent store. Store
/// failures are logged and never reach the caller as anything worse than a
/// miss or an `Err` that can be ignored: the memory shadow keeps every write
/// even when persisting it fails.
///
/// Writes for the same key are not serialized; the last write to reach the
/// store wins.
pub struct FeedCache {
    store: Arc<dyn KeyValueStore>,
    memory: RwLock<HashMap<String, CachedFeed>>,
    options: FeedCacheOptions,
}

impl FeedCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_options(store, FeedCacheOptions::default())
    }

    pub fn with_options(store: Arc<dyn KeyValueStore>, options: FeedCacheOptions) -> Self {
        Self {
            store,
            memory: RwLock::new(HashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> FeedCacheOptions {
        self.options
    }

    /// Drop the memory shadow. Persisted records are left untouched.
    pub fn dispose(&self) {
        let mut memory = self.memory_write();
        debug!(entries = memory.len(), "Disposing feed cache memory");
        memory.clear();
    }

    // ===== Reads =====

    /// Read a feed from the persistent store.
    ///
    /// Corrupt records, records from another schema version and records past
    /// the max age are all reported as `None`; the latter two are evicted.
    pub async fn get_cached_feed(&self, params: &FeedCacheKey) -> Option<CachedFeed> {
        let cache_key = generate_cache_key(params);
        self.read_persisted(&cache_key).await
    }

    /// Memory-only lookup, safe to call from synchronous render paths.
    pub fn get_cached_feed_sync(&self, params: &FeedCacheKey) -> Option<CachedFeed> {
        let cache_key = generate_cache_key(params);
        self.memory_lookup(&cache_key)
    }

    /// Serve from memory when possible, otherwise load from the store and
    /// keep the result in memory for subsequent synchronous reads.
    pub async fn preload_cache(&self, params: &FeedCacheKey) -> Option<CachedFeed> {
        let cache_key = generate_cache_key(params);
        if let Some(cached) = self.memory_lookup(&cache_key) {
            return Some(cached);
        }

        let cached = self.read_persisted(&cache_key).await?;
        self.memory_write().insert(cache_key, cached.clone());
        Some(cached)
    }

    // ===== Writes =====

    /// Replace the cached feed for `params`.
    ///
    /// Items are stored in the order given. The memory shadow is updated
    /// before persisting and is not rolled back if persisting fails. Items
    /// with a non-finite price are rejected before either layer is touched.
    pub async fn set_cached_feed(
        &self,
        params: &FeedCacheKey,
        items: Vec<FeedItem>,
        next_cursor: Option<String>,
        total: u64,
    ) -> Result<(), CacheError> {
        let cache_key = generate_cache_key(params);
        self.write_entry(cache_key, items, next_cursor, total).await
    }

    /// Append a further page to the cached feed.
    ///
    /// Items whose id is already cached are dropped. The existing `total` is
    /// kept since it is the origin's count, not the local one. With nothing
    /// cached this is a full write of `new_items`.
    pub async fn append_to_cached_feed(
        &self,
        params: &FeedCacheKey,
        new_items: Vec<FeedItem>,
        next_cursor: Option<String>,
    ) -> Result<(), CacheError> {
        let cache_key = generate_cache_key(params);

        match self.read_persisted(&cache_key).await {
            Some(existing) => {
                let before = existing.items.len();
                let items = append_unique(existing.items, new_items);
                debug!(
                    key = %cache_key,
                    appended = items.len() - before,
                    "Appending page to cached feed"
                );
                self.write_entry(cache_key, items, next_cursor, existing.total)
                    .await
            }
            None => {
                let items = append_unique(Vec::new(), new_items);
                let total = items.len() as u64;
                self.write_entry(cache_key, items, next_cursor, total).await
            }
        }
    }

    // ===== Freshness =====

    /// Whether the entry should be refreshed in the background.
    pub fn is_cache_stale(&self, cached: &CachedFeed) -> bool {
        cached.is_older_than(self.options.ttl)
    }

    pub fn is_cache_expired(&self, cached: &CachedFeed) -> bool {
        cached.is_older_than(self.options.max_age)
    }

    // ===== Eviction =====

    pub async fn clear_feed_cache(&self, params: &FeedCacheKey) -> Result<(), CacheError> {
        let cache_key = generate_cache_key(params);
        self.memory_write().remove(&cache_key);

        if let Err(e) = self.store.remove_item(&cache_key).await {
            warn!(key = %cache_key, error = %e, "Failed to clear cached feed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove every feed record from the store and empty the memory shadow.
    pub async fn clear_all_feed_caches(&self) -> Result<(), CacheError> {
        self.memory_write().clear();

        let keys = match self.cache_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list cached feeds for clearing");
                return Err(e);
            }
        };
        if keys.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.store.multi_remove(&keys).await {
            warn!(count = keys.len(), error = %e, "Failed to clear cached feeds");
            return Err(e.into());
        }
        debug!(count = keys.len(), "Cleared all cached feeds");
        Ok(())
    }

    // ===== Diagnostics =====

    /// Count, size and oldest timestamp of all persisted feed records.
    pub async fn get_cache_stats(&self) -> CacheStats {
        let keys = match self.cache_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list cached feeds for stats");
                return CacheStats::default();
            }
        };

        let mut stats = CacheStats::default();
        for key in keys {
            let raw = match self.store.get_item(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping unreadable cache record");
                    continue;
                }
            };
            let updated_at = serde_json::from_str::<CachedFeed>(&raw)
                .ok()
                .map(|cached| cached.updated_at);
            stats.record(raw.len(), updated_at);
        }
        stats
    }

    // ===== Internals =====

    async fn cache_keys(&self) -> Result<Vec<String>, CacheError> {
        let prefix = key_prefix();
        let keys = self.store.get_all_keys().await?;
        Ok(keys.into_iter().filter(|k| k.starts_with(&prefix)).collect())
    }

    async fn read_persisted(&self, cache_key: &str) -> Option<CachedFeed> {
        let raw = match self.store.get_item(cache_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Failed to read cached feed");
                return None;
            }
        };

        let cached: CachedFeed = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(e) => {
                debug!(key = %cache_key, error = %e, "Ignoring unparseable cached feed");
                return None;
            }
        };

        if cached.version != CACHE_VERSION {
            debug!(key = %cache_key, version = %cached.version, "Discarding cached feed from another schema version");
            self.evict_persisted(cache_key).await;
            return None;
        }

        if self.is_cache_expired(&cached) {
            debug!(key = %cache_key, age_minutes = cached.age_minutes(), "Evicting expired cached feed");
            self.evict_persisted(cache_key).await;
            return None;
        }

        Some(cached)
    }

    async fn evict_persisted(&self, cache_key: &str) {
        if let Err(e) = self.store.remove_item(cache_key).await {
            warn!(key = %cache_key, error = %e, "Failed to evict cached feed");
        }
    }

    async fn write_entry(
        &self,
        cache_key: String,
        items: Vec<FeedItem>,
        next_cursor: Option<String>,
        total: u64,
    ) -> Result<(), CacheError> {
        // JSON has no NaN or infinity; such a record would never read back
        if let Some(bad) = items.iter().find(|item| !item.price.is_finite()) {
            warn!(key = %cache_key, id = %bad.id, "Refusing to cache feed item with non-finite price");
            return Err(CacheError::InvalidPrice { id: bad.id.clone() });
        }

        let cached = CachedFeed {
            items,
            updated_at: Utc::now(),
            total,
            next_cursor,
            version: CACHE_VERSION.to_string(),
        };

        let serialized = serde_json::to_string(&cached);
        self.memory_write().insert(cache_key.clone(), cached);

        let serialized = match serialized {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Failed to serialize cached feed");
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.set_item(&cache_key, &serialized).await {
            warn!(key = %cache_key, error = %e, "Failed to persist cached feed");
            return Err(e.into());
        }
        Ok(())
    }

    fn memory_lookup(&self, cache_key: &str) -> Option<CachedFeed> {
        let cached = self.memory_read().get(cache_key).cloned()?;
        if self.is_cache_expired(&cached) {
            self.memory_write().remove(cache_key);
            return None;
        }
        Some(cached)
    }

    fn memory_read(&self) -> RwLockReadGuard<'_, HashMap<String, CachedFeed>> {
        self.memory.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn memory_write(&self) -> RwLockWriteGuard<'_, HashMap<String, CachedFeed>> {
        self.memory.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::merge::tests::item;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    /// Store whose every operation fails
    struct FailingStore;

    fn offline() -> StoreError {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "offline"))
    }

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get_item(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(offline())
        }
        async fn set_item(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(offline())
        }
        async fn remove_item(&self, _key: &str) -> Result<(), StoreError> {
            Err(offline())
        }
        async fn get_all_keys(&self) -> Result<Vec<String>, StoreError> {
            Err(offline())
        }
        async fn multi_remove(&self, _keys: &[String]) -> Result<(), StoreError> {
            Err(offline())
        }
    }

    fn setup() -> (Arc<MemoryStore>, FeedCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = FeedCache::new(store.clone());
        (store, cache)
    }

    fn berlin() -> FeedCacheKey {
        FeedCacheKey::new().country("de").city("berlin")
    }

    /// Write a record directly to the store, bypassing the memory shadow
    async fn seed(store: &MemoryStore, params: &FeedCacheKey, ago: Duration, total: u64) {
        let cached = CachedFeed {
            items: vec![item("a", "a"), item("b", "b")],
            updated_at: Utc::now() - ago,
            total,
            next_cursor: Some("cursor-1".to_string()),
            version: CACHE_VERSION.to_string(),
        };
        store
            .set_item(
                &generate_cache_key(params),
                &serde_json::to_string(&cached).unwrap(),
            )
            .await
            .unwrap();
    }

    fn ids(feed: &CachedFeed) -> Vec<&str> {
        feed.items.iter().map(|i| i.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (store, cache) = setup();
        cache
            .set_cached_feed(&berlin(), vec![item("1", "x"), item("2", "y")], Some("c2".to_string()), 40)
            .await
            .unwrap();

        let cached = cache.get_cached_feed(&berlin()).await.unwrap();
        assert_eq!(ids(&cached), vec!["1", "2"]);
        assert_eq!(cached.total, 40);
        assert_eq!(cached.next_cursor.as_deref(), Some("c2"));
        assert_eq!(cached.version, CACHE_VERSION);
        assert!(!cache.is_cache_stale(&cached));
        assert_eq!(store.len().await, 1);

        assert_eq!(cache.get_cached_feed_sync(&berlin()), Some(cached));
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let (_store, cache) = setup();
        assert!(cache.get_cached_feed(&berlin()).await.is_none());
        assert!(cache.get_cached_feed_sync(&berlin()).is_none());
        assert!(cache.preload_cache(&berlin()).await.is_none());
    }

    #[tokio::test]
    async fn test_append_dedups_and_keeps_total() {
        let (_store, cache) = setup();
        seed_via_cache(&cache, vec![item("a", "a"), item("b", "b")], 120).await;

        cache
            .append_to_cached_feed(&berlin(), vec![item("b", "b2"), item("c", "c")], Some("c3".to_string()))
            .await
            .unwrap();

        let cached = cache.get_cached_feed(&berlin()).await.unwrap();
        assert_eq!(ids(&cached), vec!["a", "b", "c"]);
        assert_eq!(cached.items[1].title, "b");
        assert_eq!(cached.total, 120);
        assert_eq!(cached.next_cursor.as_deref(), Some("c3"));
    }

    async fn seed_via_cache(cache: &FeedCache, items: Vec<FeedItem>, total: u64) {
        cache
            .set_cached_feed(&berlin(), items, Some("c2".to_string()), total)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_append_without_existing_is_full_write() {
        let (_store, cache) = setup();
        cache
            .append_to_cached_feed(&berlin(), vec![item("x", "x"), item("y", "y")], None)
            .await
            .unwrap();

        let cached = cache.get_cached_feed(&berlin()).await.unwrap();
        assert_eq!(ids(&cached), vec!["x", "y"]);
        assert_eq!(cached.total, 2);
        assert!(!cached.has_more());
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted() {
        let (store, cache) = setup();
        seed(&store, &berlin(), Duration::hours(25), 10).await;

        assert!(cache.get_cached_feed(&berlin()).await.is_none());
        assert!(store.is_empty().await);
        // Second read finds nothing and does not fail
        assert!(cache.get_cached_feed(&berlin()).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_but_not_expired() {
        let (store, cache) = setup();
        seed(&store, &berlin(), Duration::minutes(10), 10).await;

        let cached = cache.get_cached_feed(&berlin()).await.unwrap();
        assert!(cache.is_cache_stale(&cached));

        let mut recent = cached.clone();
        recent.updated_at = Utc::now() - Duration::minutes(1);
        assert!(!cache.is_cache_stale(&recent));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let (store, cache) = setup();
        store
            .set_item(&generate_cache_key(&berlin()), "{not json")
            .await
            .unwrap();

        assert!(cache.get_cached_feed(&berlin()).await.is_none());
        assert!(cache.preload_cache(&berlin()).await.is_none());
    }

    #[tokio::test]
    async fn test_other_schema_version_is_discarded() {
        let (store, cache) = setup();
        let cached = CachedFeed {
            items: vec![item("a", "a")],
            updated_at: Utc::now(),
            total: 1,
            next_cursor: None,
            version: "v0".to_string(),
        };
        store
            .set_item(
                &generate_cache_key(&berlin()),
                &serde_json::to_string(&cached).unwrap(),
            )
            .await
            .unwrap();

        assert!(cache.get_cached_feed(&berlin()).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_preload_populates_memory() {
        let (store, cache) = setup();
        seed(&store, &berlin(), Duration::minutes(2), 55).await;
        assert!(cache.get_cached_feed_sync(&berlin()).is_none());

        let preloaded = cache.preload_cache(&berlin()).await.unwrap();
        assert_eq!(cache.get_cached_feed_sync(&berlin()), Some(preloaded.clone()));

        // Memory hit no longer needs the store
        store.multi_remove(&store.get_all_keys().await.unwrap()).await.unwrap();
        assert_eq!(cache.preload_cache(&berlin()).await, Some(preloaded));
    }

    #[tokio::test]
    async fn test_sync_read_drops_expired_memory_entry() {
        let store = Arc::new(MemoryStore::new());
        let cache = FeedCache::with_options(
            store.clone(),
            FeedCacheOptions {
                ttl: Duration::minutes(5),
                max_age: Duration::milliseconds(-1),
            },
        );
        let _ = cache.set_cached_feed(&berlin(), vec![item("a", "a")], None, 1).await;
        assert!(cache.get_cached_feed_sync(&berlin()).is_none());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (store, cache) = setup();
        seed_via_cache(&cache, vec![item("a", "a")], 1).await;

        cache.clear_feed_cache(&berlin()).await.unwrap();
        cache.clear_feed_cache(&berlin()).await.unwrap();
        assert!(store.is_empty().await);
        assert!(cache.get_cached_feed_sync(&berlin()).is_none());
    }

    #[tokio::test]
    async fn test_clear_all_only_touches_feed_records() {
        let (store, cache) = setup();
        cache.clear_all_feed_caches().await.unwrap();

        store.set_item("session", "token").await.unwrap();
        seed_via_cache(&cache, vec![item("a", "a")], 1).await;
        cache
            .set_cached_feed(&FeedCacheKey::new().category("bikes"), vec![item("b", "b")], None, 1)
            .await
            .unwrap();

        cache.clear_all_feed_caches().await.unwrap();
        assert_eq!(store.get_all_keys().await.unwrap(), vec!["session".to_string()]);
        assert!(cache.get_cached_feed_sync(&berlin()).is_none());
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let (store, cache) = setup();
        assert_eq!(cache.get_cache_stats().await, CacheStats::default());

        seed(&store, &berlin(), Duration::hours(3), 10).await;
        seed(&store, &FeedCacheKey::new().city("paris"), Duration::hours(1), 10).await;
        store
            .set_item(&generate_cache_key(&FeedCacheKey::new().city("rome")), "garbage")
            .await
            .unwrap();
        store.set_item("unrelated", "ignored").await.unwrap();

        let stats = cache.get_cache_stats().await;
        assert_eq!(stats.total_entries, 3);
        assert!(stats.total_size > "garbage".len() as u64);
        let oldest = stats.oldest_entry.unwrap();
        assert!(Utc::now() - oldest >= Duration::hours(3));
        assert!(Utc::now() - oldest < Duration::hours(4));
    }

    #[tokio::test]
    async fn test_store_failures_degrade_gracefully() {
        let cache = FeedCache::new(Arc::new(FailingStore));

        assert!(cache.get_cached_feed(&berlin()).await.is_none());
        assert!(cache.preload_cache(&berlin()).await.is_none());

        let result = cache
            .set_cached_feed(&berlin(), vec![item("a", "a")], None, 1)
            .await;
        assert!(matches!(result, Err(CacheError::Store(_))));
        // Memory stays ahead of the failed write
        let cached = cache.get_cached_feed_sync(&berlin()).unwrap();
        assert_eq!(ids(&cached), vec!["a"]);

        assert!(cache.clear_feed_cache(&berlin()).await.is_err());
        assert!(cache.clear_all_feed_caches().await.is_err());
        assert_eq!(cache.get_cache_stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_refresh_flow_on_file_store() {
        use crate::cache::merge_feed_items;
        use crate::store::FileStore;

        let dir = tempfile::tempdir().unwrap();
        let first = FeedCache::new(Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap()));
        first
            .set_cached_feed(&berlin(), vec![item("1", "a"), item("2", "b")], Some("p2".to_string()), 9)
            .await
            .unwrap();
        first
            .append_to_cached_feed(&berlin(), vec![item("3", "c")], Some("p3".to_string()))
            .await
            .unwrap();

        // A new process starts with an empty memory shadow
        let second = FeedCache::new(Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap()));
        assert!(second.get_cached_feed_sync(&berlin()).is_none());
        let cached = second.preload_cache(&berlin()).await.unwrap();
        assert_eq!(ids(&cached), vec!["1", "2", "3"]);

        let merged = merge_feed_items(&cached.items, &[item("0", "new"), item("2", "b2")]);
        second
            .set_cached_feed(&berlin(), merged, Some("p2".to_string()), 10)
            .await
            .unwrap();

        let refreshed = second.get_cached_feed_sync(&berlin()).unwrap();
        assert_eq!(ids(&refreshed), vec!["0", "2", "1", "3"]);
        assert_eq!(second.get_cache_stats().await.total_entries, 1);
    }

    #[tokio::test]
    async fn test_non_finite_price_is_rejected() {
        let (store, cache) = setup();
        seed_via_cache(&cache, vec![item("a", "a")], 1).await;

        let mut broken = item("b", "b");
        broken.price = f64::NAN;
        let result = cache
            .set_cached_feed(&berlin(), vec![item("a", "a2"), broken.clone()], None, 2)
            .await;
        assert!(matches!(result, Err(CacheError::InvalidPrice { ref id }) if id == "b"));

        broken.price = f64::INFINITY;
        let result = cache.append_to_cached_feed(&berlin(), vec![broken], None).await;
        assert!(matches!(result, Err(CacheError::InvalidPrice { .. })));

        // Neither layer saw the rejected writes
        let memory = cache.get_cached_feed_sync(&berlin()).unwrap();
        let persisted = cache.get_cached_feed(&berlin()).await.unwrap();
        assert_eq!(memory, persisted);
        assert_eq!(persisted.items, vec![item("a", "a")]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_writes_leave_a_readable_record() {
        use crate::store::FileStore;

        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FeedCache::new(Arc::new(
            FileStore::new(dir.path().to_path_buf()).unwrap(),
        )));
        let many: Vec<FeedItem> = (0..400).map(|i| item(&i.to_string(), "listing")).collect();

        for _ in 0..50 {
            let (a, b) = (cache.clone(), cache.clone());
            let long = many.clone();
            let first = tokio::spawn(async move {
                a.set_cached_feed(&berlin(), long, Some("p2".to_string()), 400).await
            });
            let second = tokio::spawn(async move {
                b.set_cached_feed(&berlin(), vec![item("solo", "x")], None, 1).await
            });
            first.await.unwrap().unwrap();
            second.await.unwrap().unwrap();

            let persisted = cache.get_cached_feed(&berlin()).await.unwrap();
            assert!(persisted.items.len() == 400 || persisted.items.len() == 1);
        }
    }

    #[tokio::test]
    async fn test_dispose_keeps_persisted_records() {
        let (store, cache) = setup();
        seed_via_cache(&cache, vec![item("a", "a")], 1).await;

        cache.dispose();
        assert!(cache.get_cached_feed_sync(&berlin()).is_none());
        assert_eq!(store.len().await, 1);
        assert!(cache.preload_cache(&berlin()).await.is_some());
    }
}
