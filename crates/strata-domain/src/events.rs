//! Domain events exchanged with the event bus

use crate::{EntityId, KnowledgeEntity, Layer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events consumed and produced by the layer-management core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A new entity was written to the store
    EntityCreated {
        /// Snapshot of the entity
        entity: KnowledgeEntity,
    },

    /// An existing entity changed
    EntityUpdated {
        /// Snapshot after the change
        entity: KnowledgeEntity,
    },

    /// A query returned this entity
    QueryExecuted {
        /// Entity that was served
        entity_id: EntityId,
        /// Whether the answer came from cache
        cache_hit: bool,
        /// When the query ran
        at: DateTime<Utc>,
    },

    /// A user left feedback on this entity
    FeedbackSubmitted {
        /// Entity the feedback is about
        entity_id: EntityId,
        /// Positive or negative
        positive: bool,
    },

    /// An entity moved up a layer
    LayerTransitionCompleted {
        /// Entity before the move (versioned copies get a new id)
        entity_id: EntityId,
        /// Entity after the move
        resulting_entity_id: EntityId,
        /// Layer before
        from_layer: Layer,
        /// Layer after
        to_layer: Layer,
        /// Why it moved
        reason: String,
        /// Transition record id
        transition_id: String,
    },

    /// An entity moved down a layer because of negative feedback
    EntityDemoted {
        /// Entity that moved
        entity_id: EntityId,
        /// Layer before
        from_layer: Layer,
        /// Layer after
        to_layer: Layer,
        /// Negative feedback count that triggered the move
        negative_feedback_count: u64,
        /// Confidence after the penalty
        new_confidence: f64,
    },
}

impl DomainEvent {
    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::EntityCreated { .. } => "entity_created",
            DomainEvent::EntityUpdated { .. } => "entity_updated",
            DomainEvent::QueryExecuted { .. } => "query_executed",
            DomainEvent::FeedbackSubmitted { .. } => "feedback_submitted",
            DomainEvent::LayerTransitionCompleted { .. } => "layer_transition_completed",
            DomainEvent::EntityDemoted { .. } => "entity_demoted",
        }
    }

    /// Entity the event concerns
    pub fn entity_id(&self) -> &EntityId {
        match self {
            DomainEvent::EntityCreated { entity } | DomainEvent::EntityUpdated { entity } => &entity.id,
            DomainEvent::QueryExecuted { entity_id, .. }
            | DomainEvent::FeedbackSubmitted { entity_id, .. }
            | DomainEvent::LayerTransitionCompleted { entity_id, .. }
            | DomainEvent::EntityDemoted { entity_id, .. } => entity_id,
        }
    }
}
