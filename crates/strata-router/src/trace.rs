//! Per-query trace and routed result types

use crate::{QueryType, Strategy};
use serde::Serialize;
use strata_domain::traits::Inference;
use strata_domain::{KnowledgeEntity, Layer, Relationship};
use uuid::Uuid;

/// Trace entry written when the rule engine could not be used
pub const REASONING_FALLBACK: &str = "reasoning unavailable - fallback";

/// Warning appended to every SYMBOLIC_ONLY answer
pub const SAFETY_DISCLAIMER: &str =
    "Safety-critical answer derived from curated rules only; confirm with a qualified clinician or pharmacist.";

/// Warning appended when neural output disagrees with validated knowledge
pub const NEURAL_CAUTION: &str =
    "Neural inferences disagree with validated semantic knowledge; treat them with caution.";

/// What one layer contributed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerResult {
    /// Layer queried
    pub layer: Layer,
    /// Entities returned
    pub entities: Vec<KnowledgeEntity>,
    /// Relationships fetched for the first few entities
    pub relationships: Vec<Relationship>,
    /// `clamp(0.5 + 0.1 * entities, 0, 1) * layer weight`
    pub confidence: f64,
    /// Whether this result was served from cache
    pub cache_hit: bool,
    /// Time spent on the layer
    pub elapsed_ms: u64,
    /// Store error or timeout, if the layer degraded to empty
    pub error: Option<String>,
}

/// A disagreement the router found and how it was settled
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictRecord {
    /// First side
    pub layer_a: Layer,
    /// First side's score
    pub score_a: f64,
    /// Second side
    pub layer_b: Layer,
    /// Second side's score
    pub score_b: f64,
    /// Absolute difference
    pub gap: f64,
    /// Inference or entity the disagreement is about, when not a whole layer
    pub subject: Option<String>,
    /// Layer that won, when resolved
    pub winning_layer: Option<Layer>,
    /// Why it won
    pub resolution: Option<String>,
}

/// Everything the router did for one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryTrace {
    /// Fresh per query, even when served from cache
    pub query_id: Uuid,
    /// Classified type
    pub query_type: QueryType,
    /// Strategy used
    pub strategy: Strategy,
    /// Layers queried, in traversal order
    pub layers_traversed: Vec<Layer>,
    /// One entry per traversed layer, same order
    pub layer_results: Vec<LayerResult>,
    /// Conflicts found
    pub conflicts_detected: Vec<ConflictRecord>,
    /// Reasoning notes, including the fallback marker
    pub reasoning: Vec<String>,
    /// Confidence from the rule engine (or the fallback value)
    pub reasoning_confidence: Option<f64>,
    /// Merged confidence across layers
    pub final_confidence: f64,
    /// Whether a human should review the answer
    pub needs_review: bool,
    /// Why (or why not)
    pub review_reason: String,
    /// Whether the whole answer came from cache
    pub cache_hit: bool,
    /// Wall time for the query
    pub elapsed_ms: u64,
}

/// Merged answer for one query
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedResult {
    /// Entities from every traversed layer, deduplicated by id (first wins)
    pub entities: Vec<KnowledgeEntity>,
    /// Relationships, deduplicated
    pub relationships: Vec<Relationship>,
    /// Rule engine conclusions
    pub inferences: Vec<Inference>,
    /// Safety and quality warnings
    pub warnings: Vec<String>,
    /// How the answer was produced
    pub trace: QueryTrace,
}

impl RoutedResult {
    /// Merged confidence
    pub fn confidence(&self) -> f64 {
        self.trace.final_confidence
    }

    /// Ids of the returned entities, in order
    pub fn entity_ids(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.id.as_str()).collect()
    }
}

/// Flatten layer results into deduplicated entity and relationship lists
pub fn merge_layer_results(results: &[LayerResult]) -> (Vec<KnowledgeEntity>, Vec<Relationship>) {
    let mut entities: Vec<KnowledgeEntity> = Vec::new();
    let mut relationships: Vec<Relationship> = Vec::new();
    for result in results {
        for entity in &result.entities {
            if !entities.iter().any(|e| e.id == entity.id) {
                entities.push(entity.clone());
            }
        }
        for rel in &result.relationships {
            let seen = relationships.iter().any(|r| {
                r.source_id == rel.source_id && r.target_id == rel.target_id && r.relation_type == rel.relation_type
            });
            if !seen {
                relationships.push(rel.clone());
            }
        }
    }
    (entities, relationships)
}
