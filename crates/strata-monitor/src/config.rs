//! Configuration for promotion and demotion monitoring
//!
//! Thresholds per layer step, feedback limits and the worker cadence.

use crate::MonitorError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strata_transition::TransitionConfig;

/// Longest accepted query-tracking window, one year
pub const MAX_QUERY_WINDOW_HOURS: u64 = 24 * 366;

/// Thresholds for moving entities up the layer stack
///
/// PERCEPTION→SEMANTIC and SEMANTIC→REASONING fire when any of their
/// criteria holds; REASONING→APPLICATION needs both of its criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    /// PERCEPTION→SEMANTIC: minimum entity confidence
    /// Default: 0.85
    pub semantic_confidence: f64,

    /// PERCEPTION→SEMANTIC: minimum `validation_count` property
    /// Default: 3
    pub semantic_validation_count: u64,

    /// SEMANTIC→REASONING: minimum entity confidence
    /// Default: 0.90
    pub reasoning_confidence: f64,

    /// SEMANTIC→REASONING: minimum number of references
    /// Default: 5
    pub reasoning_reference_count: u64,

    /// REASONING→APPLICATION: queries within the rolling window
    /// Default: 10
    pub application_query_count: u64,

    /// REASONING→APPLICATION: minimum cache hit rate
    /// Default: 0.5
    pub application_cache_hit_rate: f64,

    /// Length of the query-tracking window (in hours)
    /// Default: 24
    pub query_window_hours: u64,

    /// Confidence written into REASONING payloads when the entity has none
    /// Default: 0.9
    pub default_reasoning_confidence: f64,

    /// Promote in response to events
    /// Default: true
    pub auto_promote: bool,

    /// Evaluate and log, but do not request transitions
    /// Default: false
    pub dry_run: bool,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            semantic_confidence: 0.85,
            semantic_validation_count: 3,
            reasoning_confidence: 0.90,
            reasoning_reference_count: 5,
            application_query_count: 10,
            application_cache_hit_rate: 0.5,
            query_window_hours: 24,
            default_reasoning_confidence: 0.9,
            auto_promote: true,
            dry_run: false,
        }
    }
}

impl PromotionConfig {
    /// Query window as Duration
    pub fn query_window(&self) -> Duration {
        Duration::from_secs(self.query_window_hours.saturating_mul(3600))
    }

    fn validate(&self) -> Result<(), MonitorError> {
        for (name, value) in [
            ("semantic_confidence", self.semantic_confidence),
            ("reasoning_confidence", self.reasoning_confidence),
            ("application_cache_hit_rate", self.application_cache_hit_rate),
            ("default_reasoning_confidence", self.default_reasoning_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MonitorError::Config(format!(
                    "promotion.{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.query_window_hours == 0 {
            return Err(MonitorError::Config(
                "promotion.query_window_hours must be positive".to_string(),
            ));
        }
        if self.query_window_hours > MAX_QUERY_WINDOW_HOURS {
            return Err(MonitorError::Config(format!(
                "promotion.query_window_hours must be at most {}, got {}",
                MAX_QUERY_WINDOW_HOURS, self.query_window_hours
            )));
        }
        Ok(())
    }
}

/// Limits for moving entities down after negative feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemotionConfig {
    /// Feedback needed before an entity is judged at all
    /// Default: 5
    pub min_feedback_count: u64,

    /// Negative feedback that triggers a demotion
    /// Default: 3
    pub demotion_threshold: u64,

    /// Confidence removed per demotion
    /// Default: 0.2
    pub confidence_step: f64,

    /// Confidence never drops below this
    /// Default: 0.1
    pub confidence_floor: f64,

    /// Demote in response to feedback events and sweeps
    /// Default: true
    pub auto_demote: bool,

    /// Evaluate and log, but do not write
    /// Default: false
    pub dry_run: bool,
}

impl Default for DemotionConfig {
    fn default() -> Self {
        Self {
            min_feedback_count: 5,
            demotion_threshold: 3,
            confidence_step: 0.2,
            confidence_floor: 0.1,
            auto_demote: true,
            dry_run: false,
        }
    }
}

impl DemotionConfig {
    fn validate(&self) -> Result<(), MonitorError> {
        if !(0.0..=1.0).contains(&self.confidence_step) || !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(MonitorError::Config(
                "demotion.confidence_step and demotion.confidence_floor must be in [0, 1]".to_string(),
            ));
        }
        if self.demotion_threshold == 0 {
            return Err(MonitorError::Config(
                "demotion.demotion_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the monitor worker and both monitors
///
/// # Examples
///
/// ```
/// use strata_monitor::MonitorConfig;
///
/// let config = MonitorConfig::default();
/// assert_eq!(config.promotion.semantic_confidence, 0.85);
/// assert_eq!(config.demotion.min_feedback_count, 5);
///
/// // Aggressive: promotes and demotes sooner
/// let config = MonitorConfig::aggressive();
/// assert!(config.promotion.semantic_confidence < 0.85);
///
/// // Lenient: needs more evidence either way
/// let config = MonitorConfig::lenient();
/// assert!(config.demotion.demotion_threshold > 3);
/// ```
///
/// Loaded from TOML:
///
/// ```toml
/// sweep_interval_secs = 300
/// event_capacity = 1024
///
/// [promotion]
/// semantic_confidence = 0.85
/// auto_promote = true
///
/// [demotion]
/// min_feedback_count = 5
/// demotion_threshold = 3
///
/// [transition]
/// enable_versioning = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Promotion thresholds
    pub promotion: PromotionConfig,

    /// Demotion limits
    pub demotion: DemotionConfig,

    /// Engine used to carry out promotions
    pub transition: TransitionConfig,

    /// How often the worker re-evaluates entities with pending feedback (in seconds)
    /// Default: 300
    pub sweep_interval_secs: u64,

    /// Event bus buffer size
    /// Default: 1024
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            promotion: PromotionConfig::default(),
            demotion: DemotionConfig::default(),
            transition: TransitionConfig::default(),
            sweep_interval_secs: 300,
            event_capacity: 1024,
        }
    }
}

impl MonitorConfig {
    /// Promote on weaker evidence and demote after less feedback
    pub fn aggressive() -> Self {
        Self {
            promotion: PromotionConfig {
                semantic_confidence: 0.75,
                semantic_validation_count: 2,
                reasoning_confidence: 0.85,
                reasoning_reference_count: 3,
                application_query_count: 5,
                application_cache_hit_rate: 0.4,
                ..PromotionConfig::default()
            },
            demotion: DemotionConfig {
                min_feedback_count: 3,
                demotion_threshold: 2,
                confidence_step: 0.25,
                ..DemotionConfig::default()
            },
            sweep_interval_secs: 60,
            ..Self::default()
        }
    }

    /// Require more evidence in both directions
    pub fn lenient() -> Self {
        Self {
            promotion: PromotionConfig {
                semantic_confidence: 0.9,
                semantic_validation_count: 5,
                reasoning_confidence: 0.95,
                reasoning_reference_count: 10,
                application_query_count: 20,
                application_cache_hit_rate: 0.6,
                ..PromotionConfig::default()
            },
            demotion: DemotionConfig {
                min_feedback_count: 10,
                demotion_threshold: 5,
                confidence_step: 0.1,
                ..DemotionConfig::default()
            },
            sweep_interval_secs: 900,
            ..Self::default()
        }
    }

    /// Sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), MonitorError> {
        self.promotion.validate()?;
        self.demotion.validate()?;
        if self.sweep_interval_secs == 0 {
            return Err(MonitorError::Config("sweep_interval_secs must be positive".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(MonitorError::Config("event_capacity must be positive".to_string()));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self, MonitorError> {
        let config: MonitorConfig = toml::from_str(toml_str)
            .map_err(|e| MonitorError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.promotion.semantic_confidence, 0.85);
        assert_eq!(config.promotion.semantic_validation_count, 3);
        assert_eq!(config.promotion.reasoning_confidence, 0.90);
        assert_eq!(config.promotion.reasoning_reference_count, 5);
        assert_eq!(config.promotion.application_query_count, 10);
        assert_eq!(config.promotion.application_cache_hit_rate, 0.5);
        assert_eq!(config.demotion.min_feedback_count, 5);
        assert_eq!(config.demotion.demotion_threshold, 3);
        assert_eq!(config.demotion.confidence_step, 0.2);
        assert_eq!(config.demotion.confidence_floor, 0.1);
        assert!(config.promotion.auto_promote);
        assert!(!config.promotion.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(MonitorConfig::aggressive().validate().is_ok());
        assert!(MonitorConfig::lenient().validate().is_ok());
        assert!(
            MonitorConfig::aggressive().promotion.application_query_count
                < MonitorConfig::lenient().promotion.application_query_count
        );
    }

    #[test]
    fn test_duration_conversions() {
        let config = MonitorConfig::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.promotion.query_window(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_partial_toml() {
        let config = MonitorConfig::from_toml_str(
            r#"
            sweep_interval_secs = 30

            [demotion]
            demotion_threshold = 4

            [transition]
            require_approval = true
            "#,
        )
        .unwrap();
        assert_eq!(config.sweep_interval_secs, 30);
        assert_eq!(config.demotion.demotion_threshold, 4);
        assert_eq!(config.demotion.min_feedback_count, 5);
        assert!(config.transition.require_approval);
        assert_eq!(config.promotion, PromotionConfig::default());
    }

    #[test]
    fn test_invalid_toml_values() {
        let err = MonitorConfig::from_toml_str("[promotion]\nsemantic_confidence = 1.5").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
        assert!(MonitorConfig::from_toml_str("sweep_interval_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_huge_query_window_is_rejected() {
        let err = MonitorConfig::from_toml_str("[promotion]\nquery_window_hours = 10000000").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));

        let promotion = PromotionConfig {
            query_window_hours: u64::MAX,
            ..PromotionConfig::default()
        };
        assert_eq!(promotion.query_window(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_missing_file() {
        let err = MonitorConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
