//! TTL cache using moka
//!
//! Values of any `Clone + Send + Sync` type are stored behind `Arc<dyn Any>`
//! and recovered by downcast; a lookup with the wrong type is a miss. Each
//! entry carries its own TTL. moka evicts expired entries in the background,
//! and a read that finds an expired entry removes it before reporting a miss.

use moka::future::Cache;
use moka::Expiry;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vigil_core::CacheConfig;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache with per-key expiry
#[derive(Debug, Clone)]
pub struct TtlCache {
    inner: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl TtlCache {
    /// Create cache with max capacity and the TTL used by `set_default`
    #[must_use]
    pub fn new(max_capacity: u64, default_ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
            default_ttl,
        }
    }

    /// Create cache from configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.max_capacity,
            Duration::from_millis(config.default_ttl_ms),
        )
    }

    /// TTL applied by `set_default` and `cached_default`
    #[inline]
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a live value
    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entry = self.inner.get(key).await?;
        if entry.is_expired(Instant::now()) {
            self.inner.invalidate(key).await;
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    /// Store a value for `ttl`
    pub async fn set<T>(&self, key: impl Into<String>, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        let entry = CacheEntry {
            value: Arc::new(value),
            expires_at: Instant::now() + ttl,
            ttl,
        };
        self.inner.insert(key.into(), entry).await;
    }

    /// Store a value for the default TTL
    pub async fn set_default<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.set(key, value, self.default_ttl).await;
    }

    /// Remove one key
    pub async fn delete(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Remove every key
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Return the cached value, or compute, store and return it
    pub async fn cached<T, F, Fut>(&self, key: &str, ttl: Duration, f: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return hit;
        }
        let value = f().await;
        self.set(key, value.clone(), ttl).await;
        value
    }

    /// Like [`TtlCache::cached`], but errors are returned and not stored
    ///
    /// # Errors
    /// Whatever `f` returns.
    pub async fn try_cached<T, E, F, Fut>(&self, key: &str, ttl: Duration, f: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }
        let value = f().await?;
        self.set(key, value.clone(), ttl).await;
        Ok(value)
    }

    /// Approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn set_and_get() {
        let cache = TtlCache::default();
        cache.set_default("answer", 42_u32).await;

        assert_eq!(cache.get::<u32>("answer").await, Some(42));
        assert_eq!(cache.get::<String>("answer").await, None);
        assert_eq!(cache.get::<u32>("missing").await, None);
    }

    #[tokio::test]
    async fn expired_entry_is_absent() {
        let cache = TtlCache::default();
        cache
            .set("k", "v".to_string(), Duration::from_millis(20))
            .await;
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get::<String>("k").await, None);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache = TtlCache::default();
        cache.set_default("a", 1_i32).await;
        cache.set_default("b", 2_i32).await;

        cache.delete("a").await;
        assert_eq!(cache.get::<i32>("a").await, None);
        assert_eq!(cache.get::<i32>("b").await, Some(2));

        cache.clear();
        assert_eq!(cache.get::<i32>("b").await, None);
    }

    #[tokio::test]
    async fn cached_computes_once() {
        let cache = TtlCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value = cache
                .cached("report", Duration::from_secs(30), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    "computed".to_string()
                })
                .await;
            assert_eq!(value, "computed");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn try_cached_does_not_store_errors() {
        let cache = TtlCache::default();

        let first: Result<u8, &str> = cache
            .try_cached("k", Duration::from_secs(30), || async { Err("offline") })
            .await;
        assert_eq!(first, Err("offline"));

        let second: Result<u8, &str> = cache
            .try_cached("k", Duration::from_secs(30), || async { Ok(7) })
            .await;
        assert_eq!(second, Ok(7));
        assert_eq!(cache.get::<u8>("k").await, Some(7));
    }
}
