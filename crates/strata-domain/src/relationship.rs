//! Relationship module - directed edges between entities

use crate::EntityId;
use serde::{Deserialize, Serialize};

/// A directed, typed edge between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity
    pub source_id: EntityId,

    /// Target entity
    pub target_id: EntityId,

    /// Edge label (treats, interacts_with, contraindicated_with, ...)
    pub relation_type: String,

    /// Strength of the edge [0.0, 1.0]
    pub confidence: f64,
}

impl Relationship {
    /// Create a new relationship, clamping the confidence into [0, 1]
    pub fn new(
        source_id: impl Into<EntityId>,
        target_id: impl Into<EntityId>,
        relation_type: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type: relation_type.into(),
            confidence: crate::confidence::clamp_score(confidence),
        }
    }

    /// Whether `id` is either endpoint
    pub fn touches(&self, id: &EntityId) -> bool {
        &self.source_id == id || &self.target_id == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_confidence() {
        let rel = Relationship::new("r1", "metformin", "treated_by", 1.4);
        assert_eq!(rel.source_id.as_str(), "r1");
        assert_eq!(rel.target_id.as_str(), "metformin");
        assert_eq!(rel.relation_type, "treated_by");
        assert_eq!(rel.confidence, 1.0);

        assert_eq!(Relationship::new("a", "b", "treats", -0.2).confidence, 0.0);
        assert_eq!(Relationship::new("a", "b", "treats", f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_touches_either_endpoint() {
        let rel = Relationship::new("warfarin", "aspirin", "interacts_with", 0.9);
        assert!(rel.touches(&EntityId::new("warfarin")));
        assert!(rel.touches(&EntityId::new("aspirin")));
        assert!(!rel.touches(&EntityId::new("ibuprofen")));
    }

    #[test]
    fn test_serde_round_trip() {
        let rel = Relationship::new("warfarin", "aspirin", "interacts_with", 0.75);
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(json["source_id"], "warfarin");
        assert_eq!(json["relation_type"], "interacts_with");

        let back: Relationship = serde_json::from_value(json).unwrap();
        assert_eq!(back, rel);
    }
}
