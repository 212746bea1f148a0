//! Layer module - maturity tiers for knowledge entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maturity layer of a knowledge entity
///
/// Entities move forward through the layers as they are validated and used,
/// and backward when feedback shows they were promoted too eagerly:
/// - Perception: raw extracted facts, tied to a source document
/// - Semantic: facts mapped into a domain vocabulary
/// - Reasoning: facts backed by explicit inference
/// - Application: facts proven useful in answering queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Layer {
    /// Raw, source-bound knowledge
    Perception,

    /// Domain-mapped knowledge
    Semantic,

    /// Inference-backed knowledge
    Reasoning,

    /// Knowledge in active use
    Application,
}

impl Layer {
    /// All layers in ascending order
    pub const ALL: [Layer; 4] = [
        Layer::Perception,
        Layer::Semantic,
        Layer::Reasoning,
        Layer::Application,
    ];

    /// Position in the fixed total order (Perception = 0)
    pub fn order(&self) -> u8 {
        match self {
            Layer::Perception => 0,
            Layer::Semantic => 1,
            Layer::Reasoning => 2,
            Layer::Application => 3,
        }
    }

    /// Get the layer name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Perception => "PERCEPTION",
            Layer::Semantic => "SEMANTIC",
            Layer::Reasoning => "REASONING",
            Layer::Application => "APPLICATION",
        }
    }

    /// Parse a layer from a string, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PERCEPTION" => Some(Layer::Perception),
            "SEMANTIC" => Some(Layer::Semantic),
            "REASONING" => Some(Layer::Reasoning),
            "APPLICATION" => Some(Layer::Application),
            _ => None,
        }
    }

    /// Get the next layer in the hierarchy (for promotion)
    pub fn next(&self) -> Option<Self> {
        match self {
            Layer::Perception => Some(Layer::Semantic),
            Layer::Semantic => Some(Layer::Reasoning),
            Layer::Reasoning => Some(Layer::Application),
            Layer::Application => None,
        }
    }

    /// Get the previous layer in the hierarchy (for demotion)
    pub fn previous(&self) -> Option<Self> {
        match self {
            Layer::Perception => None,
            Layer::Semantic => Some(Layer::Perception),
            Layer::Reasoning => Some(Layer::Semantic),
            Layer::Application => Some(Layer::Reasoning),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid layer: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_progression() {
        assert_eq!(Layer::Perception.next(), Some(Layer::Semantic));
        assert_eq!(Layer::Semantic.next(), Some(Layer::Reasoning));
        assert_eq!(Layer::Reasoning.next(), Some(Layer::Application));
        assert_eq!(Layer::Application.next(), None);
    }

    #[test]
    fn test_layer_demotion() {
        assert_eq!(Layer::Application.previous(), Some(Layer::Reasoning));
        assert_eq!(Layer::Reasoning.previous(), Some(Layer::Semantic));
        assert_eq!(Layer::Semantic.previous(), Some(Layer::Perception));
        assert_eq!(Layer::Perception.previous(), None);
    }

    #[test]
    fn test_order_is_total() {
        for pair in Layer::ALL.windows(2) {
            assert!(pair[0].order() < pair[1].order());
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("semantic".parse::<Layer>(), Ok(Layer::Semantic));
        assert_eq!(Layer::parse(" Application "), Some(Layer::Application));
        assert!("middle".parse::<Layer>().is_err());
    }
}
