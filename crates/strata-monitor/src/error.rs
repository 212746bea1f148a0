//! Error types for monitor operations

use strata_domain::StoreError;
use strata_transition::TransitionError;
use thiserror::Error;

/// Errors that can occur while promoting or demoting entities
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Transition engine refused or failed a promotion
    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    /// Entity or feedback store error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker error (event bus closed, runtime issues)
    #[error("Worker error: {0}")]
    Worker(String),
}
