//! Configuration for query routing
//!
//! Loads cache, fan-out, timeout and propagation settings from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strata_domain::PropagationConfig;
use thiserror::Error;

/// Router configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Router configuration loaded from TOML
///
/// Every field has a default, so a partial file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// How long a cached answer stays valid (in seconds)
    /// Default: 300
    pub cache_ttl_secs: u64,

    /// Maximum cached answers; the oldest are evicted first
    /// Default: 1000
    pub cache_capacity: usize,

    /// Entities fetched per layer
    /// Default: 20
    pub entity_limit: usize,

    /// Entities per layer whose relationships are fetched
    /// Default: 5
    pub relationship_entities: usize,

    /// Relationships kept per entity
    /// Default: 10
    pub relationships_per_entity: usize,

    /// SYMBOLIC_FIRST stops descending once this many entities are collected
    /// Default: 5
    pub early_stop_entities: usize,

    /// Deadline for one layer query (milliseconds)
    /// Default: 2000
    pub layer_timeout_ms: u64,

    /// Deadline for one reasoning call (milliseconds)
    /// Default: 5000
    pub reasoning_timeout_ms: u64,

    /// Confidence used when reasoning is unavailable
    /// Default: 0.7
    pub fallback_confidence: f64,

    /// Layer weights and conflict thresholds
    pub propagation: PropagationConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            cache_capacity: 1000,
            entity_limit: 20,
            relationship_entities: 5,
            relationships_per_entity: 10,
            early_stop_entities: 5,
            layer_timeout_ms: 2_000,
            reasoning_timeout_ms: 5_000,
            fallback_confidence: 0.7,
            propagation: PropagationConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Tight deadlines and small fan-out for latency-sensitive callers
    pub fn aggressive() -> Self {
        Self {
            entity_limit: 10,
            relationship_entities: 3,
            relationships_per_entity: 5,
            early_stop_entities: 3,
            layer_timeout_ms: 500,
            reasoning_timeout_ms: 1_000,
            ..Self::default()
        }
    }

    /// Generous deadlines and wide fan-out for batch or offline use
    pub fn lenient() -> Self {
        Self {
            cache_ttl_secs: 1_800,
            entity_limit: 50,
            relationship_entities: 10,
            relationships_per_entity: 25,
            early_stop_entities: 10,
            layer_timeout_ms: 10_000,
            reasoning_timeout_ms: 30_000,
            ..Self::default()
        }
    }

    /// Cache TTL as Duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Layer timeout as Duration
    pub fn layer_timeout(&self) -> Duration {
        Duration::from_millis(self.layer_timeout_ms)
    }

    /// Reasoning timeout as Duration
    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_millis(self.reasoning_timeout_ms)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be positive".to_string()));
        }
        if self.entity_limit == 0 {
            return Err(ConfigError::Invalid("entity_limit must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.fallback_confidence) {
            return Err(ConfigError::Invalid(format!(
                "fallback_confidence must be in [0, 1], got {}",
                self.fallback_confidence
            )));
        }
        self.propagation
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
