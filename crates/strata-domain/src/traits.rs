//! Trait definitions for external collaborators
//!
//! These traits define the boundaries between the layer-management core and
//! the systems it sits above. Implementations live elsewhere (the
//! `strata-store` crate ships in-memory ones).

use crate::{
    Confidence, DomainEvent, EntityId, KnowledgeEntity, Layer, PropertyMap, QueryType, Relationship, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter for [`EntityStore::query_by_layer`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFilter {
    /// Match entities whose name, type or string properties contain any term
    pub terms: Vec<String>,

    /// Minimum confidence
    pub min_confidence: Option<f64>,

    /// Restrict to an entity type
    pub entity_type: Option<String>,
}

impl EntityFilter {
    /// Filter on keyword terms only
    pub fn terms(terms: Vec<String>) -> Self {
        Self {
            terms,
            ..Default::default()
        }
    }

    /// Whether an entity passes this filter
    ///
    /// Term matching is case-insensitive substring matching; an empty term
    /// list matches everything.
    pub fn matches(&self, entity: &KnowledgeEntity) -> bool {
        if let Some(min) = self.min_confidence {
            if entity.confidence < min {
                return false;
            }
        }
        if let Some(kind) = &self.entity_type {
            if !entity.entity_type.eq_ignore_ascii_case(kind) {
                return false;
            }
        }
        if self.terms.is_empty() {
            return true;
        }
        let mut haystack = format!("{} {}", entity.name, entity.entity_type).to_lowercase();
        for value in entity.properties.values() {
            if let Some(s) = value.as_str() {
                haystack.push(' ');
                haystack.push_str(&s.to_lowercase());
            }
        }
        self.terms.iter().any(|t| haystack.contains(&t.to_lowercase()))
    }
}

/// Acknowledgement returned by [`EntityStore::promote_entity`]
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionReceipt {
    /// Entity that moved
    pub entity_id: EntityId,
    /// Layer before
    pub from_layer: Layer,
    /// Layer after
    pub to_layer: Layer,
    /// When the store applied the move
    pub promoted_at: DateTime<Utc>,
}

/// Storage of knowledge entities and their relationships
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Get an entity by id
    async fn get_entity(&self, id: &EntityId) -> Result<Option<KnowledgeEntity>, StoreError>;

    /// Entities in `layer` passing `filter`, at most `limit`
    async fn query_by_layer(
        &self,
        layer: Layer,
        filter: &EntityFilter,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntity>, StoreError>;

    /// Relationships touching an entity
    async fn list_relationships(&self, id: &EntityId) -> Result<Vec<Relationship>, StoreError>;

    /// Merge properties into an entity; `false` when the entity is unknown
    ///
    /// The reserved keys `layer`, `confidence`, `name` and `entity_type`
    /// update the corresponding typed fields.
    async fn update_entity_properties(&self, id: &EntityId, props: PropertyMap) -> Result<bool, StoreError>;

    /// Move an entity to `target`, merging `props`
    async fn promote_entity(
        &self,
        id: &EntityId,
        target: Layer,
        props: PropertyMap,
    ) -> Result<PromotionReceipt, StoreError>;

    /// Optional versioning support
    fn versioning(&self) -> Option<&dyn EntityVersioning> {
        None
    }
}

/// Stores that can keep old versions of an entity alongside new ones
#[async_trait]
pub trait EntityVersioning: Send + Sync {
    /// Number of versioned copies that exist for the logical entity
    async fn version_count(&self, root: &EntityId) -> Result<u32, StoreError>;

    /// Write `entity` as a new record, linking it to `previous`
    async fn create_version(&self, previous: &EntityId, entity: KnowledgeEntity) -> Result<(), StoreError>;
}

/// Which kind of reasoning the caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningMode {
    /// Rules only; neural sources must not be consulted
    Symbolic,
    /// Neural inference
    Neural,
    /// Both
    Hybrid,
}

/// Input to [`ReasoningEngine::apply_reasoning`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningRequest {
    /// Original query text
    pub query: String,
    /// Entities gathered so far
    pub entities: Vec<KnowledgeEntity>,
    /// Relationships gathered so far
    pub relationships: Vec<Relationship>,
}

/// One conclusion drawn by the reasoning engine
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    /// What was concluded
    pub statement: String,
    /// How sure the engine is
    pub confidence: Confidence,
    /// Rule or model responsible
    pub rule: Option<String>,
    /// Entities the conclusion is about
    pub subjects: Vec<EntityId>,
}

/// Result of [`ReasoningEngine::apply_reasoning`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningOutcome {
    /// Conclusions
    pub inferences: Vec<Inference>,
    /// Safety or quality warnings
    pub warnings: Vec<String>,
}

/// Rule engine and neural inference source
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Draw conclusions from the gathered context
    async fn apply_reasoning(
        &self,
        request: &ReasoningRequest,
        mode: ReasoningMode,
    ) -> Result<ReasoningOutcome, StoreError>;
}

/// Feedback counters for one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackCounts {
    /// All feedback received
    pub feedback_count: u64,
    /// Negative feedback since the last demotion
    pub negative_feedback_count: u64,
}

/// Per-entity feedback counters
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Current counters (zeroes for unknown entities)
    async fn get_feedback(&self, id: &EntityId) -> Result<FeedbackCounts, StoreError>;

    /// Record one piece of feedback
    async fn record_feedback(&self, id: &EntityId, positive: bool) -> Result<FeedbackCounts, StoreError>;

    /// Zero the negative counter after a demotion
    async fn reset_negative_feedback(&self, id: &EntityId) -> Result<(), StoreError>;
}

/// External intent classifier for query text
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify query text
    async fn classify(&self, text: &str) -> Result<QueryType, StoreError>;
}

/// Sink for domain events
pub trait EventPublisher: Send + Sync {
    /// Publish without waiting for subscribers
    fn publish(&self, event: DomainEvent);
}
