//! Cross-layer confidence propagation
//!
//! Implements the rules for comparing and merging confidence values that
//! come from different layers:
//! 1. Per-layer weighting (`adjust_for_layer`)
//! 2. Weighted merge across layers (`propagate_cross_layer`)
//! 3. Directional decay when a value travels between layers
//! 4. Deterministic conflict resolution and human-review escalation

use crate::{Confidence, ConfidenceSource, DomainError, Layer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default floor applied by [`CrossLayerPropagator::adjust_for_layer`]
pub const MIN_CONFIDENCE: f64 = 0.1;

/// Default score gap above which two layers are considered in conflict
pub const CONFLICT_THRESHOLD: f64 = 0.3;

/// Default margin by which a lighter layer may exceed a heavier one before review
pub const INVERSION_MARGIN: f64 = 0.15;

/// Per-step decay factor for upward (promotion) traversals
pub const UPWARD_DECAY: f64 = 0.95;

/// Per-step decay factor for downward (demotion) traversals
pub const DOWNWARD_DECAY: f64 = 0.85;

/// Trust weight of each layer
///
/// Weights must lie in (0, 1] and strictly decrease with distance from
/// Application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerWeights {
    /// Weight for Perception
    pub perception: f64,
    /// Weight for Semantic
    pub semantic: f64,
    /// Weight for Reasoning
    pub reasoning: f64,
    /// Weight for Application
    pub application: f64,
}

impl Default for LayerWeights {
    fn default() -> Self {
        Self {
            perception: 0.6,
            semantic: 0.8,
            reasoning: 0.9,
            application: 1.0,
        }
    }
}

impl LayerWeights {
    /// Weight for one layer
    pub fn weight(&self, layer: Layer) -> f64 {
        match layer {
            Layer::Perception => self.perception,
            Layer::Semantic => self.semantic,
            Layer::Reasoning => self.reasoning,
            Layer::Application => self.application,
        }
    }

    /// Check range and ordering
    pub fn validate(&self) -> Result<(), DomainError> {
        for layer in Layer::ALL {
            let w = self.weight(layer);
            if !(w > 0.0 && w <= 1.0) {
                return Err(DomainError::InvalidWeights(format!(
                    "{} weight {} is outside (0, 1]",
                    layer, w
                )));
            }
        }
        for pair in Layer::ALL.windows(2) {
            if self.weight(pair[0]) >= self.weight(pair[1]) {
                return Err(DomainError::InvalidWeights(format!(
                    "{} must weigh less than {}",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(())
    }
}

/// Tunables for [`CrossLayerPropagator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Trust weight of each layer
    pub layer_weights: LayerWeights,
    /// Floor for layer-adjusted and traversed scores
    pub min_confidence: f64,
    /// Gap above which two scores conflict
    pub conflict_threshold: f64,
    /// Gap by which a lighter layer may exceed a heavier one
    pub inversion_margin: f64,
    /// Per-step factor when moving toward Application
    pub upward_decay: f64,
    /// Per-step factor when moving toward Perception
    pub downward_decay: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            layer_weights: LayerWeights::default(),
            min_confidence: MIN_CONFIDENCE,
            conflict_threshold: CONFLICT_THRESHOLD,
            inversion_margin: INVERSION_MARGIN,
            upward_decay: UPWARD_DECAY,
            downward_decay: DOWNWARD_DECAY,
        }
    }
}

impl PropagationConfig {
    /// Check every tunable is usable
    pub fn validate(&self) -> Result<(), DomainError> {
        self.layer_weights.validate()?;
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(DomainError::InvalidWeights(format!("{} {} is outside [0, 1]", name, v)))
            }
        };
        unit("min_confidence", self.min_confidence)?;
        unit("conflict_threshold", self.conflict_threshold)?;
        unit("inversion_margin", self.inversion_margin)?;
        unit("upward_decay", self.upward_decay)?;
        unit("downward_decay", self.downward_decay)?;
        if self.downward_decay >= self.upward_decay {
            return Err(DomainError::InvalidWeights(
                "downward_decay must be stronger (smaller) than upward_decay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of [`CrossLayerPropagator::resolve_conflict`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictResolution {
    /// The winning confidence
    pub resolved: Confidence,
    /// Layer the winner came from
    pub winning_layer: Layer,
    /// Why it won ("confidence gap" or "<LAYER> priority")
    pub reason: String,
}

/// Outcome of [`CrossLayerPropagator::needs_human_review`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDecision {
    /// Whether a human should look at this
    pub required: bool,
    /// Short explanation
    pub reason: String,
}

/// Weighs, merges and reconciles confidences from different layers
#[derive(Debug, Clone, Default)]
pub struct CrossLayerPropagator {
    config: PropagationConfig,
}

impl CrossLayerPropagator {
    /// Create a propagator with the given tunables
    pub fn new(config: PropagationConfig) -> Self {
        Self { config }
    }

    /// Tunables in use
    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Weight of one layer
    pub fn layer_weight(&self, layer: Layer) -> f64 {
        self.config.layer_weights.weight(layer)
    }

    /// Scale a score by its layer weight, never below `min_confidence`
    pub fn adjust_for_layer(&self, confidence: &Confidence, layer: Layer) -> Confidence {
        let scaled = confidence.score() * self.layer_weight(layer);
        confidence.with_score(scaled.max(self.config.min_confidence))
    }

    /// Merge one confidence per layer into a single hybrid value
    ///
    /// Each score is scaled by its layer weight and then averaged using the
    /// same weights. A single entry is equivalent to [`Self::adjust_for_layer`].
    pub fn propagate_cross_layer(
        &self,
        by_layer: &BTreeMap<Layer, Confidence>,
    ) -> Result<Confidence, DomainError> {
        if by_layer.is_empty() {
            return Err(DomainError::EmptyInput("propagate"));
        }
        if by_layer.len() == 1 {
            let (layer, confidence) = by_layer.iter().next().ok_or(DomainError::EmptyInput("propagate"))?;
            return Ok(self.adjust_for_layer(confidence, *layer));
        }

        let mut numerator = 0.0;
        let mut total_weight = 0.0;
        let mut evidence = Vec::new();
        for (layer, confidence) in by_layer {
            let w = self.layer_weight(*layer);
            numerator += w * (confidence.score() * w);
            total_weight += w;
            evidence.push(format!("{}={:.3}", layer, confidence.score()));
        }
        if total_weight <= 0.0 {
            return Err(DomainError::ZeroWeight);
        }

        let mut merged = Confidence::new(numerator / total_weight, ConfidenceSource::Hybrid)
            .with_reasoning(format!("weighted merge across {} layers", by_layer.len()))
            .with_generated_by("cross_layer_propagator");
        merged.evidence = evidence;
        Ok(merged)
    }

    /// Decay factor for moving a value from `from` to `to`
    ///
    /// Downward steps decay harder than upward steps over the same pair.
    pub fn traversal_factor(&self, from: Layer, to: Layer) -> f64 {
        let steps = (to.order() as i32 - from.order() as i32).unsigned_abs() as i32;
        match to.cmp(&from) {
            std::cmp::Ordering::Equal => 1.0,
            std::cmp::Ordering::Greater => self.config.upward_decay.powi(steps),
            std::cmp::Ordering::Less => self.config.downward_decay.powi(steps),
        }
    }

    /// Carry a value from one layer to another
    pub fn propagate_through_layers(&self, confidence: &Confidence, from: Layer, to: Layer) -> Confidence {
        let decayed = confidence.score() * self.traversal_factor(from, to);
        confidence
            .with_score(decayed.max(self.config.min_confidence))
            .with_reasoning(format!("propagated {} -> {}", from, to))
    }

    /// Pick one of two disagreeing values
    ///
    /// A gap above the conflict threshold is settled by score alone; a
    /// smaller gap by layer weight. The winner does not depend on argument order.
    pub fn resolve_conflict(
        &self,
        layer_a: Layer,
        a: &Confidence,
        layer_b: Layer,
        b: &Confidence,
    ) -> ConflictResolution {
        let gap = (a.score() - b.score()).abs();

        let (a_wins, reason) = if gap > self.config.conflict_threshold {
            (a.score() >= b.score(), "confidence gap".to_string())
        } else {
            let (wa, wb) = (self.layer_weight(layer_a), self.layer_weight(layer_b));
            if wa == wb {
                (a.score() >= b.score(), format!("{} priority", layer_a))
            } else if wa > wb {
                (true, format!("{} priority", layer_a))
            } else {
                (false, format!("{} priority", layer_b))
            }
        };

        let (winning_layer, winner) = if a_wins { (layer_a, a) } else { (layer_b, b) };
        ConflictResolution {
            resolved: winner.clone(),
            winning_layer,
            reason,
        }
    }

    /// Decide whether a set of per-layer values should be escalated to a human
    pub fn needs_human_review(&self, by_layer: &BTreeMap<Layer, Confidence>) -> ReviewDecision {
        match by_layer.len() {
            0 => {
                return ReviewDecision {
                    required: false,
                    reason: "no sources".to_string(),
                }
            }
            1 => {
                return ReviewDecision {
                    required: false,
                    reason: "single source".to_string(),
                }
            }
            _ => {}
        }

        let entries: Vec<(&Layer, &Confidence)> = by_layer.iter().collect();

        let mut max_gap = 0.0_f64;
        for (i, (_, a)) in entries.iter().enumerate() {
            for (_, b) in &entries[i + 1..] {
                max_gap = max_gap.max((a.score() - b.score()).abs());
            }
        }
        if max_gap > self.config.conflict_threshold {
            return ReviewDecision {
                required: true,
                reason: format!(
                    "confidence gap {:.2} exceeds threshold {:.2}",
                    max_gap, self.config.conflict_threshold
                ),
            };
        }

        for (lower_layer, lower) in &entries {
            for (higher_layer, higher) in &entries {
                if self.layer_weight(**lower_layer) >= self.layer_weight(**higher_layer) {
                    continue;
                }
                if lower.score() - higher.score() > self.config.inversion_margin {
                    return ReviewDecision {
                        required: true,
                        reason: format!(
                            "inverted expectation: {} ({:.2}) exceeds {} ({:.2})",
                            lower_layer,
                            lower.score(),
                            higher_layer,
                            higher.score()
                        ),
                    };
                }
            }
        }

        ReviewDecision {
            required: false,
            reason: "consistent".to_string(),
        }
    }
}
