//! Router error type

use crate::ConfigError;
use strata_domain::DomainError;
use thiserror::Error;

/// Errors that abort a routed query
///
/// Layer and rule-engine failures are not errors: they degrade the answer
/// and are recorded in its trace.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The caller cancelled the query
    #[error("Query cancelled")]
    Cancelled,

    /// Confidence merging failed
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}
