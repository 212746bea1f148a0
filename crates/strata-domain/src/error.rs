//! Error types shared across the domain

use std::time::Duration;
use thiserror::Error;

/// Errors raised by pure domain computations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// A combination or propagation was asked to work on nothing
    #[error("Cannot {0} an empty set of confidences")]
    EmptyInput(&'static str),

    /// Weight vector does not line up with the score vector
    #[error("Expected {expected} weights, got {actual}")]
    LengthMismatch {
        /// Number of scores
        expected: usize,
        /// Number of weights supplied
        actual: usize,
    },

    /// Weights summed to zero (or less)
    #[error("Weights must sum to a positive value")]
    ZeroWeight,

    /// Raw entity data carried no `layer` field
    #[error("Entity {0} has no layer")]
    MissingLayer(String),

    /// Raw entity data carried a `layer` field that names no layer
    #[error("Entity {id} has invalid layer '{value}'")]
    InvalidLayer {
        /// Entity identifier
        id: String,
        /// Offending value
        value: String,
    },

    /// Layer weights are out of range or out of order
    #[error("Invalid layer weights: {0}")]
    InvalidWeights(String),
}

/// Errors reported by external collaborators (entity store, rule engine, feedback store)
///
/// Callers decide whether a given kind is fatal: the query router treats
/// every backend kind as an empty layer, while transition execution
/// propagates them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Backend could not be reached or failed internally
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer within the allotted time
    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend returned data that could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// True for outages and timeouts, the kinds a caller may degrade around
    pub fn is_backend(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// Await a collaborator call with a deadline, folding the elapsed case into [`StoreError::Timeout`]
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
