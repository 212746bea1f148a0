//! In-memory feedback counters

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use strata_domain::traits::{FeedbackCounts, FeedbackStore};
use strata_domain::{EntityId, StoreError};
use tokio::sync::Mutex;

/// Feedback store held in memory; clones share state
#[derive(Clone, Default)]
pub struct MemoryFeedbackStore {
    counts: Arc<Mutex<HashMap<EntityId, FeedbackCounts>>>,
}

impl MemoryFeedbackStore {
    /// Create an empty feedback store
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the counters for an entity
    pub async fn set(&self, id: impl Into<EntityId>, feedback_count: u64, negative_feedback_count: u64) {
        self.counts.lock().await.insert(
            id.into(),
            FeedbackCounts {
                feedback_count,
                negative_feedback_count,
            },
        );
    }
}

#[async_trait]
impl FeedbackStore for MemoryFeedbackStore {
    async fn get_feedback(&self, id: &EntityId) -> Result<FeedbackCounts, StoreError> {
        Ok(self.counts.lock().await.get(id).copied().unwrap_or_default())
    }

    async fn record_feedback(&self, id: &EntityId, positive: bool) -> Result<FeedbackCounts, StoreError> {
        let mut counts = self.counts.lock().await;
        let entry = counts.entry(id.clone()).or_default();
        entry.feedback_count += 1;
        if !positive {
            entry.negative_feedback_count += 1;
        }
        Ok(*entry)
    }

    async fn reset_negative_feedback(&self, id: &EntityId) -> Result<(), StoreError> {
        if let Some(entry) = self.counts.lock().await.get_mut(id) {
            entry.negative_feedback_count = 0;
        }
        Ok(())
    }
}
