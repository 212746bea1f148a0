//! Confidence module - scores with provenance
//!
//! A [`Confidence`] is immutable: every operation returns a new value and
//! re-clamps the score into [0, 1].

use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a confidence value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    /// Rule-based reasoning
    Symbolic,
    /// Learned model inference
    Neural,
    /// Combination of several sources
    Hybrid,
    /// Fixed rule of thumb (layer defaults, fallbacks)
    Heuristic,
    /// Replayed from a cached result
    Cache,
}

impl ConfidenceSource {
    /// Get the source name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceSource::Symbolic => "symbolic",
            ConfidenceSource::Neural => "neural",
            ConfidenceSource::Hybrid => "hybrid",
            ConfidenceSource::Heuristic => "heuristic",
            ConfidenceSource::Cache => "cache",
        }
    }
}

impl fmt::Display for ConfidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of uncertainty the score expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyType {
    /// Inherent noise in the underlying data
    Aleatoric,
    /// Lack of knowledge, reducible with more evidence
    Epistemic,
    /// Both kinds present
    Mixed,
    /// Not characterised
    #[default]
    Unknown,
}

/// A belief score in [0, 1] with provenance metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    score: f64,
    /// Producer of the score
    pub source: ConfidenceSource,
    /// Kind of uncertainty
    pub uncertainty: UncertaintyType,
    /// Supporting evidence (entity ids, rule names, documents)
    pub evidence: Vec<String>,
    /// Human-readable justification
    pub reasoning: Option<String>,
    /// Component that produced the value
    pub generated_by: Option<String>,
    /// When the value was produced
    pub timestamp: DateTime<Utc>,
}

/// Clamp a raw score into [0, 1]; NaN maps to 0
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

impl Confidence {
    /// Create a confidence value, clamping the score into [0, 1]
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_domain::{Confidence, ConfidenceSource};
    ///
    /// let c = Confidence::new(1.4, ConfidenceSource::Symbolic);
    /// assert_eq!(c.score(), 1.0);
    /// ```
    pub fn new(score: f64, source: ConfidenceSource) -> Self {
        Self {
            score: clamp_score(score),
            source,
            uncertainty: UncertaintyType::Unknown,
            evidence: Vec::new(),
            reasoning: None,
            generated_by: None,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a symbolic confidence
    pub fn symbolic(score: f64) -> Self {
        Self::new(score, ConfidenceSource::Symbolic)
    }

    /// Shorthand for a neural confidence
    pub fn neural(score: f64) -> Self {
        Self::new(score, ConfidenceSource::Neural)
    }

    /// Shorthand for a heuristic confidence
    pub fn heuristic(score: f64) -> Self {
        Self::new(score, ConfidenceSource::Heuristic)
    }

    /// The clamped score
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Attach a justification
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Attach an evidence item
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    /// Record the producing component
    pub fn with_generated_by(mut self, generated_by: impl Into<String>) -> Self {
        self.generated_by = Some(generated_by.into());
        self
    }

    /// Set the uncertainty kind
    pub fn with_uncertainty(mut self, uncertainty: UncertaintyType) -> Self {
        self.uncertainty = uncertainty;
        self
    }

    /// Same provenance, different score (re-clamped)
    pub fn with_score(&self, score: f64) -> Self {
        Self {
            score: clamp_score(score),
            timestamp: Utc::now(),
            ..self.clone()
        }
    }

    /// Multiply the score by `factor`, keeping the result in [0, 1]
    pub fn decay(&self, factor: f64) -> Self {
        self.with_score(self.score * factor)
    }
}

/// How [`combine`] merges several scores into one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationStrategy {
    /// Most pessimistic input
    Min,
    /// Most optimistic input
    Max,
    /// Arithmetic mean
    Average,
    /// Weighted mean (equal weights when none supplied)
    WeightedAverage,
    /// Joint probability of independent inputs
    Product,
    /// Probability that at least one input holds: `1 - prod(1 - s)`
    NoisyOr,
}

/// Combine several confidences into one
///
/// The result is tagged with the inputs' shared source, or `hybrid` when
/// they disagree, and carries the union of their evidence.
///
/// # Errors
///
/// - [`DomainError::EmptyInput`] when `scores` is empty
/// - [`DomainError::LengthMismatch`] when `weights` has a different length
/// - [`DomainError::ZeroWeight`] when the weights sum to zero
pub fn combine(
    scores: &[Confidence],
    strategy: CombinationStrategy,
    weights: Option<&[f64]>,
) -> Result<Confidence, DomainError> {
    if scores.is_empty() {
        return Err(DomainError::EmptyInput("combine"));
    }
    if let Some(weights) = weights {
        if weights.len() != scores.len() {
            return Err(DomainError::LengthMismatch {
                expected: scores.len(),
                actual: weights.len(),
            });
        }
    }

    let values: Vec<f64> = scores.iter().map(Confidence::score).collect();
    let n = values.len() as f64;

    let combined = match strategy {
        CombinationStrategy::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        CombinationStrategy::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        CombinationStrategy::Average => values.iter().sum::<f64>() / n,
        CombinationStrategy::WeightedAverage => {
            let equal = vec![1.0; values.len()];
            let weights = weights.unwrap_or(&equal);
            let total: f64 = weights.iter().sum();
            if total <= 0.0 {
                return Err(DomainError::ZeroWeight);
            }
            values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total
        }
        CombinationStrategy::Product => values.iter().product(),
        CombinationStrategy::NoisyOr => 1.0 - values.iter().map(|v| 1.0 - v).product::<f64>(),
    };

    let first = scores[0].source;
    let source = if scores.iter().all(|c| c.source == first) {
        first
    } else {
        ConfidenceSource::Hybrid
    };

    let mut evidence: Vec<String> = Vec::new();
    for item in scores.iter().flat_map(|c| c.evidence.iter()) {
        if !evidence.contains(item) {
            evidence.push(item.clone());
        }
    }

    let mut result = Confidence::new(combined, source)
        .with_reasoning(format!("combined {} inputs via {:?}", scores.len(), strategy));
    result.evidence = evidence;
    Ok(result)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn strategy() -> impl Strategy<Value = CombinationStrategy> {
        prop_oneof![
            Just(CombinationStrategy::Min),
            Just(CombinationStrategy::Max),
            Just(CombinationStrategy::Average),
            Just(CombinationStrategy::WeightedAverage),
            Just(CombinationStrategy::Product),
            Just(CombinationStrategy::NoisyOr),
        ]
    }

    proptest! {
        /// Property: combination never leaves [0, 1]
        #[test]
        fn test_combine_bounded(
            values in prop::collection::vec(-1.0f64..2.0, 1..8),
            strategy in strategy(),
        ) {
            let input: Vec<_> = values.iter().map(|v| Confidence::neural(*v)).collect();
            let c = combine(&input, strategy, None).unwrap();
            prop_assert!((0.0..=1.0).contains(&c.score()));
        }

        /// Property: decay never leaves [0, 1]
        #[test]
        fn test_decay_bounded(score in 0.0f64..=1.0, factor in -5.0f64..5.0) {
            let c = Confidence::symbolic(score).decay(factor);
            prop_assert!((0.0..=1.0).contains(&c.score()));
        }
    }
}
