//! Memoizing lookup cache that shares one in-flight load per key.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Key -> value memo with in-flight deduplication.
///
/// Concurrent callers for the same key wait on a single load. Successful values
/// are kept for the lifetime of the cache; there is no eviction, so the cache grows
/// with the number of distinct keys. A failed load is not stored: its slot is
/// dropped once no other caller is waiting on it, and the next caller runs its own
/// loader.
pub struct LookupCache<K, V> {
    entries: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        K: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(key.clone()).or_default())
        };
        match cell.get_or_try_init(loader).await {
            Ok(value) => Ok(value.clone()),
            Err(e) => {
                self.discard_failed(&key, &cell).await;
                Err(e)
            }
        }
    }

    /// Remove an empty slot unless another caller still holds it.
    async fn discard_failed(&self, key: &K, cell: &Arc<OnceCell<V>>) {
        let mut entries = self.entries.lock().await;
        let stale = entries.get(key).is_some_and(|current| {
            Arc::ptr_eq(current, cell) && !current.initialized() && Arc::strong_count(cell) == 2
        });
        if stale {
            entries.remove(key);
        }
    }

    /// Cached value for `key`, if a load has completed.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().await;
        entries.get(key).and_then(|cell| cell.get().cloned())
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.get(key).await.is_some()
    }

    /// Number of keys with a stored value.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<K, V> Default for LookupCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn second_lookup_hits_cache() {
        let cache: LookupCache<String, u32> = LookupCache::new();
        let loads = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = cache
                .get_or_fetch("de_dust2".to_string(), || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(7)
                })
                .await
                .unwrap();
            assert_eq!(v, 7);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.contains(&"de_dust2".to_string()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_lookups_share_one_load() {
        let cache: Arc<LookupCache<String, String>> = Arc::new(LookupCache::new());
        let loads = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("cs_office".to_string(), || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>("office.png".to_string())
                    })
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "office.png");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let cache: LookupCache<&'static str, u32> = LookupCache::new();
        let err = cache
            .get_or_fetch("a", || async { Err::<u32, _>("backend down") })
            .await
            .unwrap_err();
        assert_eq!(err, "backend down");
        assert!(cache.is_empty().await);
        assert_eq!(cache.get(&"a").await, None);

        let v = cache
            .get_or_fetch("a", || async { Ok::<_, &str>(3) })
            .await
            .unwrap();
        assert_eq!(v, 3);
        assert_eq!(cache.get(&"a").await, Some(3));
    }

    #[tokio::test]
    async fn failed_loads_leave_no_slots_behind() {
        let cache: LookupCache<String, u32> = LookupCache::new();
        for i in 0..50 {
            let key = format!("missing_{}", i);
            let _ = cache
                .get_or_fetch(key, || async { Err::<u32, _>("unknown map") })
                .await;
        }
        assert!(cache.entries.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_retries_after_shared_load_fails() {
        let cache: Arc<LookupCache<&'static str, u32>> = Arc::new(LookupCache::new());
        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_fetch("zm_map", || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err::<u32, _>("still computing")
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = cache
            .get_or_fetch("zm_map", || async { Ok::<_, &str>(9) })
            .await
            .unwrap();
        assert_eq!(first.await.unwrap(), Err("still computing"));
        assert_eq!(second, 9);
        assert_eq!(cache.get(&"zm_map").await, Some(9));
        assert_eq!(cache.entries.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache: LookupCache<u8, u8> = LookupCache::new();
        cache.get_or_fetch(1, || async { Ok::<_, ()>(10) }).await.unwrap();
        cache.get_or_fetch(2, || async { Ok::<_, ()>(20) }).await.unwrap();
        assert_eq!(cache.get(&1).await, Some(10));
        assert_eq!(cache.get(&2).await, Some(20));
        assert_eq!(cache.len().await, 2);
    }
}
