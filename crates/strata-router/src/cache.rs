//! Bounded TTL cache for routed answers

use crate::classify::normalise;
use crate::Strategy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Cache key derived from normalised query text and strategy
pub type CacheKey = String;

/// Hash of the normalised query text plus strategy
///
/// Case and whitespace differences map to the same key.
pub fn cache_key(text: &str, strategy: Strategy) -> CacheKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalise(text).as_bytes());
    hasher.update(b"\0");
    hasher.update(strategy.as_str().as_bytes());
    hasher.finalize().to_hex().to_string()
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

/// Hit and miss counters plus current size
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently held (including expired ones not yet purged)
    pub entries: usize,
    /// Maximum entries
    pub capacity: usize,
    /// Lookups answered from cache
    pub hits: u64,
    /// Lookups that missed or found an expired entry
    pub misses: u64,
}

impl CacheStats {
    /// hits / (hits + misses), 0.0 before any lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// TTL cache with a hard capacity
///
/// Values are stored as immutable snapshots and cloned out on hit. Insertion
/// and eviction happen under one write lock, so the size never exceeds the
/// capacity after an insert returns.
pub struct QueryCache<V> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    ttl: Duration,
    capacity: usize,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> QueryCache<V> {
    /// Create a cache; a capacity of zero is raised to one
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
            next_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a live entry
    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace an entry, evicting the oldest entries beyond capacity
    ///
    /// Returns the number of entries evicted.
    pub async fn insert(&self, key: CacheKey, value: V) -> usize {
        let mut entries = self.entries.write().await;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );

        let mut evicted = 0;
        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        if evicted > 0 {
            tracing::debug!("Query cache evicted {} oldest entries", evicted);
        }
        evicted
    }

    /// Drop every entry; counters are kept
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Remove expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Current counters
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().await.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
