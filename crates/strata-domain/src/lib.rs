//! Strata Domain Layer
//!
//! Core value types and pure decision logic for layered knowledge management.
//! Everything that touches storage, inference or transport is expressed as a
//! trait in [`traits`] and implemented elsewhere.
//!
//! ## Key Concepts
//!
//! - **Layer**: maturity tier of an entity (perception → semantic → reasoning → application)
//! - **Confidence**: a [0, 1] score with provenance, immutable once built
//! - **Propagation**: weighting, merging and reconciling confidences across layers
//! - **KnowledgeEntity**: the unit being promoted and demoted, owned by the store
//! - **DomainEvent**: what the monitors consume and publish
//! - **QueryType**: what a query asks about, which decides how it is routed

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod confidence;
pub mod entity;
pub mod error;
pub mod events;
pub mod layer;
pub mod propagation;
pub mod query;
pub mod relationship;
pub mod traits;

// Re-exports for convenience
pub use confidence::{combine, CombinationStrategy, Confidence, ConfidenceSource, UncertaintyType};
pub use entity::{EntityId, EntityStatus, KnowledgeEntity, LayerProperties, PropertyMap};
pub use error::{with_timeout, DomainError, StoreError};
pub use events::DomainEvent;
pub use layer::Layer;
pub use propagation::{
    ConflictResolution, CrossLayerPropagator, LayerWeights, PropagationConfig, ReviewDecision,
};
pub use query::QueryType;
pub use relationship::Relationship;
