//! Transition engine error types

use crate::TransitionStatus;
use strata_domain::{EntityId, Layer, StoreError};
use thiserror::Error;

/// Errors that can occur during transition operations
///
/// A payload that fails validation is not an error: it produces a
/// `REJECTED` record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    /// Unknown transition id
    #[error("Transition not found: {0}")]
    NotFound(String),

    /// Entity referenced by the transition no longer exists
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Execution attempted on a record that is terminal, pending or already running
    #[error("Transition {id} is not executable (status {status})")]
    NotExecutable {
        /// Transition id
        id: String,
        /// Status at the time of the call
        status: TransitionStatus,
    },

    /// Approve/reject attempted outside PENDING
    #[error("Cannot {action} transition {id} in status {status}")]
    InvalidState {
        /// Transition id
        id: String,
        /// Status at the time of the call
        status: TransitionStatus,
        /// Attempted action
        action: &'static str,
    },

    /// Entity moved since the transition was requested
    #[error("Entity {id} is in {actual}, transition expects {expected}")]
    LayerMismatch {
        /// Entity id
        id: EntityId,
        /// Layer recorded on the transition
        expected: Layer,
        /// Layer found in the store
        actual: Layer,
    },

    /// Store failure during execution; the record stays APPROVED
    #[error("Backend error: {0}")]
    Backend(#[from] StoreError),
}
