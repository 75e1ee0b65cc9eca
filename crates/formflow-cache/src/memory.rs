use crate::{Cache, CacheEntry, CacheKey, CacheStats};
use async_trait::async_trait;
use dashmap::DashMap;
use formflow_core::Result;
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// In-process cache with per-entry TTL.
///
/// Expired entries read as absent and are removed on access. When an insert
/// pushes the cache past `max_entries`, expired entries are purged first and
/// then the oldest entries are evicted.
pub struct MemoryCache<V> {
    entries: DashMap<CacheKey, CacheEntry<V>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> MemoryCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.entries
            .get(key)
            .map(|e| !e.is_expired())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Brings the cache back to `max_entries` after `inserted` went in, never
    /// evicting `inserted` itself. Concurrent sets may overshoot the bound until
    /// each of them has run this.
    fn enforce_bound(&self, inserted: &CacheKey) {
        if self.entries.len() <= self.max_entries {
            return;
        }

        self.entries.retain(|_, entry| !entry.is_expired());
        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| entry.key() != inserted)
                .min_by_key(|entry| entry.value().created_at)
                .map(|entry| entry.key().clone());
            let Some(key) = oldest else { break };
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                trace!("Evicted {} to make room", key);
            }
        }
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new(formflow_core::CacheConfig::default().max_entries)
    }
}

#[async_trait]
impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &CacheKey) -> Result<Option<V>> {
        let found = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone());

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("formflow_cache_hits").increment(1);
        } else {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
            self.misses.fetch_add(1, Ordering::Relaxed);
            counter!("formflow_cache_misses").increment(1);
        }
        Ok(found)
    }

    async fn set(&self, key: CacheKey, value: V, ttl: Option<Duration>) -> Result<()> {
        self.entries.insert(key.clone(), CacheEntry::new(value, ttl));
        self.enforce_bound(&key);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
