//! In-process TTL cache for rule tables
//!
//! Rule tables are read-heavy and write-rare. Each engine holds one cache
//! and reloads from the store when the TTL elapses or when the admin
//! surface sends an explicit invalidate.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

struct CacheEntry<T> {
    loaded_at: Instant,
    value: Arc<T>,
}

/// TTL-guarded cached value with an explicit invalidate hook
pub struct TtlCache<T> {
    ttl: Duration,
    inner: RwLock<Option<CacheEntry<T>>>,
}

impl<T> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
        }
    }

    /// Return the cached value, reloading through `loader` when the entry
    /// is missing or stale. Concurrent refreshes are serialized by the
    /// write lock; losers reuse the winner's entry.
    pub async fn get_with<F, Fut>(&self, loader: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let guard = self.inner.read().await;
            if let Some(entry) = guard.as_ref() {
                if entry.loaded_at.elapsed() < self.ttl {
                    return Ok(entry.value.clone());
                }
            }
        }

        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.as_ref() {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }

        let value = Arc::new(loader().await?);
        debug!("rule cache refreshed");
        *guard = Some(CacheEntry {
            loaded_at: Instant::now(),
            value: value.clone(),
        });
        Ok(value)
    }

    /// Drop the cached entry so the next read reloads
    pub async fn invalidate(&self) {
        let mut guard = self.inner.write().await;
        *guard = None;
        debug!("rule cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_cache_reuses_within_ttl() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        let loads = AtomicU32::new(0);

        for _ in 0..3 {
            let value = cache
                .get_with(|| async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(7u32)
                })
                .await
                .unwrap();
            assert_eq!(*value, 7);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        let loads = AtomicU32::new(0);

        let load = || async {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(1u32)
        };
        cache.get_with(load).await.unwrap();
        cache.invalidate().await;
        cache
            .get_with(|| async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(2u32)
            })
            .await
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_reloads() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(0));
        let loads = AtomicU32::new(0);
        for _ in 0..2 {
            cache
                .get_with(|| async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(0u32)
                })
                .await
                .unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }
}
