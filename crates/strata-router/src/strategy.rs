//! Execution strategies

use crate::QueryType;
use serde::{Deserialize, Serialize};
use std::fmt;
use strata_domain::traits::ReasoningMode;
use strata_domain::Layer;

/// Plan for answering one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Rules only over SEMANTIC and REASONING; no cache, always a disclaimer
    SymbolicOnly,
    /// SEMANTIC, REASONING, PERCEPTION in turn, stopping early when enough is found
    SymbolicFirst,
    /// PERCEPTION with neural reasoning, validated against SEMANTIC
    NeuralFirst,
    /// REASONING, SEMANTIC and PERCEPTION together, conflicts resolved
    Collaborative,
}

impl Strategy {
    /// Default strategy for a query type
    pub fn for_query_type(query_type: QueryType) -> Self {
        match query_type {
            QueryType::DrugInteraction | QueryType::Contraindication => Strategy::SymbolicOnly,
            QueryType::SymptomInterpretation => Strategy::NeuralFirst,
            QueryType::TreatmentRecommendation
            | QueryType::DiseaseInformation
            | QueryType::General => Strategy::Collaborative,
            QueryType::DataCatalog => Strategy::SymbolicFirst,
        }
    }

    /// Layers in traversal order
    pub fn layer_plan(&self) -> &'static [Layer] {
        match self {
            Strategy::SymbolicOnly => &[Layer::Semantic, Layer::Reasoning],
            Strategy::SymbolicFirst => &[Layer::Semantic, Layer::Reasoning, Layer::Perception],
            Strategy::NeuralFirst => &[Layer::Perception, Layer::Semantic],
            Strategy::Collaborative => &[Layer::Reasoning, Layer::Semantic, Layer::Perception],
        }
    }

    /// Whether answers may be read from and written to the cache
    ///
    /// NEURAL_FIRST always reruns the neural engine, and safety-critical
    /// answers are never reused.
    pub fn uses_cache(&self) -> bool {
        matches!(self, Strategy::SymbolicFirst | Strategy::Collaborative)
    }

    /// Reasoning mode handed to the rule engine
    pub fn reasoning_mode(&self) -> ReasoningMode {
        match self {
            Strategy::SymbolicOnly | Strategy::SymbolicFirst => ReasoningMode::Symbolic,
            Strategy::NeuralFirst => ReasoningMode::Neural,
            Strategy::Collaborative => ReasoningMode::Hybrid,
        }
    }

    /// Stable name
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::SymbolicOnly => "SYMBOLIC_ONLY",
            Strategy::SymbolicFirst => "SYMBOLIC_FIRST",
            Strategy::NeuralFirst => "NEURAL_FIRST",
            Strategy::Collaborative => "COLLABORATIVE",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
