//! Transition engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the layer transition engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Queue requests as PENDING until someone approves them
    pub require_approval: bool,

    /// Write a `<id>_v<n>` copy instead of updating the entity in place
    pub enable_versioning: bool,

    /// Deadline for each store call made while executing (milliseconds)
    pub store_timeout_ms: u64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            require_approval: false,
            enable_versioning: false,
            store_timeout_ms: 5_000,
        }
    }
}

impl TransitionConfig {
    /// Human-in-the-loop configuration: approval required, history kept
    pub fn supervised() -> Self {
        Self {
            require_approval: true,
            enable_versioning: true,
            ..Self::default()
        }
    }

    /// Automatic configuration that keeps a version per transition
    pub fn versioned() -> Self {
        Self {
            enable_versioning: true,
            ..Self::default()
        }
    }

    /// Store timeout as Duration
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
