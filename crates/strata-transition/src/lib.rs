//! Strata Layer Transitions
//!
//! Moves knowledge entities up the layer stack under validation, with an
//! optional human approval step and optional versioned history.
//!
//! The engine provides:
//! - Transition requests with auto-approval or a PENDING queue
//! - Payload validation against the target layer's required fields
//! - Execution against an [`EntityStore`](strata_domain::traits::EntityStore),
//!   in place or as a new `<id>_v<n>` version
//! - Lineage and per-status / per-layer-pair statistics
//!
//! # Examples
//!
//! ```
//! use strata_domain::{Layer, PropertyMap};
//! use strata_transition::validate_transition;
//!
//! let outcome = validate_transition(&PropertyMap::new(), Layer::Perception, Layer::Semantic);
//! assert!(!outcome.is_valid);
//! assert_eq!(outcome.errors, vec!["missing required field: domain".to_string()]);
//! ```

#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod record;
mod validator;

pub use config::TransitionConfig;
pub use engine::{LayerTransitionEngine, TransitionStatistics};
pub use error::TransitionError;
pub use record::{diff_properties, LayerTransitionRecord, PropertyChange, TransitionId, TransitionStatus};
pub use validator::{backwards_error, validate_transition, ValidationOutcome};
