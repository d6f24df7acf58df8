//! In-memory backend (moka) with per-entry expiry
//!
//! Entries written with a TTL live in a size-bounded moka cache. Entries
//! written without one (registry lists, metadata documents) are kept in a
//! separate unbounded map and are never evicted.

use super::{KvStore, StoreError, StoreStats};
use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

const DEFAULT_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    // An overwrite restarts the clock with the new entry's TTL
    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Process-local store; contents are lost on exit
pub struct MemoryKv {
    expiring: Cache<String, Entry>,
    pinned: DashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `max_entries` bounds the TTL entries only
    pub fn with_capacity(max_entries: u64) -> Self {
        let expiring = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .build();
        Self {
            expiring,
            pinned: DashMap::new(),
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(value) = self.pinned.get(key) {
            return Ok(Some(value.clone()));
        }
        Ok(self.expiring.get(key).await.map(|e| e.value))
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        match ttl {
            Some(ttl) => {
                self.pinned.remove(key);
                self.expiring.insert(key.to_string(), Entry { value, ttl }).await;
            }
            None => {
                self.expiring.invalidate(key).await;
                self.pinned.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let pinned = self.pinned.remove(key).is_some();
        let expiring = self.expiring.remove(key).await.is_some();
        Ok(pinned || expiring)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .pinned
            .iter()
            .map(|e| e.key().clone())
            .chain(self.expiring.iter().map(|(k, _)| k.as_ref().clone()))
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let before = self.expiring.entry_count();
        self.expiring.run_pending_tasks().await;
        Ok(before.saturating_sub(self.expiring.entry_count()) as usize)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.expiring.run_pending_tasks().await;
        let mut stats = StoreStats::default();
        for entry in self.pinned.iter() {
            stats.total_entries += 1;
            stats.total_size_bytes += entry.key().len() + entry.value().len();
        }
        for (key, entry) in self.expiring.iter() {
            stats.total_entries += 1;
            stats.total_size_bytes += key.len() + entry.value.len();
        }
        Ok(stats)
    }
}
