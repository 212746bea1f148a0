//! Per-entity query tracking for REASONING→APPLICATION promotion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strata_domain::EntityId;
use tokio::sync::{Mutex, RwLock};

/// How often an entity was served, and how often from cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTracker {
    /// Queries since `first_query_at`
    pub query_count: u64,
    /// Start of the current window
    pub first_query_at: DateTime<Utc>,
    /// Most recent query
    pub last_query_at: DateTime<Utc>,
    /// Queries answered from cache
    pub cache_hits: u64,
    /// Queries answered from the layers
    pub cache_misses: u64,
}

impl QueryTracker {
    /// Tracker anchored at `at` with no observations
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            query_count: 0,
            first_query_at: at,
            last_query_at: at,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    /// `hits / (hits + misses)`, 0 with no observations
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Count one query at `at`
    ///
    /// When the window has expired the tracker is reset instead: count 1,
    /// hit/miss counters zeroed, anchored at `at`. Returns `true` on reset.
    pub fn observe(&mut self, cache_hit: bool, at: DateTime<Utc>, window: Duration) -> bool {
        let expired = chrono::Duration::from_std(window)
            .map(|window| at - self.first_query_at > window)
            .unwrap_or(false);

        if expired {
            *self = Self::new(at);
            self.query_count = 1;
            return true;
        }

        self.query_count += 1;
        if cache_hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
        self.last_query_at = at;
        false
    }
}

/// Result of recording one query
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Tracker state after the update
    pub tracker: QueryTracker,
    /// Whether the window had expired and the tracker was reset
    pub reset: bool,
}

/// Trackers for every entity, one lock per entity
///
/// The map lock is held only to find or insert an entry; updates to one
/// entity serialise on that entity's own mutex.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    trackers: RwLock<HashMap<EntityId, Arc<Mutex<QueryTracker>>>>,
}

impl TrackerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, id: &EntityId, at: DateTime<Utc>) -> Arc<Mutex<QueryTracker>> {
        if let Some(tracker) = self.trackers.read().await.get(id) {
            return Arc::clone(tracker);
        }
        let mut trackers = self.trackers.write().await;
        Arc::clone(
            trackers
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(QueryTracker::new(at)))),
        )
    }

    /// Record one query against `id`
    pub async fn observe(&self, id: &EntityId, cache_hit: bool, at: DateTime<Utc>, window: Duration) -> Observation {
        let entry = self.entry(id, at).await;
        let mut tracker = entry.lock().await;
        let reset = tracker.observe(cache_hit, at, window);
        Observation {
            tracker: tracker.clone(),
            reset,
        }
    }

    /// Current tracker for `id`
    pub async fn get(&self, id: &EntityId) -> Option<QueryTracker> {
        let entry = self.trackers.read().await.get(id).cloned()?;
        let tracker = entry.lock().await;
        Some(tracker.clone())
    }

    /// Replace the tracker for `id`, e.g. when restoring persisted counters
    pub async fn restore(&self, id: EntityId, tracker: QueryTracker) {
        self.trackers
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(tracker)));
    }

    /// Drop the tracker for `id` (after it leaves the REASONING layer)
    pub async fn remove(&self, id: &EntityId) -> Option<QueryTracker> {
        let entry = self.trackers.write().await.remove(id)?;
        let tracker = entry.lock().await;
        Some(tracker.clone())
    }

    /// Drop trackers with no query inside `window` before `now`
    ///
    /// An evicted tracker would have been reset by its next query anyway.
    /// Returns how many were dropped.
    pub async fn evict_stale(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let Ok(window) = chrono::Duration::from_std(window) else {
            return 0;
        };
        let mut trackers = self.trackers.write().await;
        let before = trackers.len();
        let mut stale = Vec::new();
        for (id, entry) in trackers.iter() {
            if now - entry.lock().await.last_query_at > window {
                stale.push(id.clone());
            }
        }
        for id in &stale {
            trackers.remove(id);
        }
        before - trackers.len()
    }

    /// Number of tracked entities
    pub async fn len(&self) -> usize {
        self.trackers.read().await.len()
    }

    /// Whether no entity is tracked
    pub async fn is_empty(&self) -> bool {
        self.trackers.read().await.is_empty()
    }
}
