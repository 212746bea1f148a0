//! Running statistics for the promotion and demotion monitors

use std::collections::BTreeMap;
use strata_domain::Layer;

/// Counters kept by the promotion monitor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionMetrics {
    /// Promotions that reached the transition engine (or would have, in dry-run mode)
    pub attempted: usize,

    /// Transitions that completed
    pub completed: usize,

    /// Transitions rejected by validation
    pub rejected: usize,

    /// Transitions that errored
    pub failed: usize,

    /// Completed promotions per `from -> to` pair
    pub by_pair: BTreeMap<(Layer, Layer), usize>,

    /// Entities evaluated without a trigger firing
    pub not_eligible: usize,
}

impl PromotionMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed promotion
    pub fn record_completed(&mut self, from: Layer, to: Layer) {
        self.completed += 1;
        *self.by_pair.entry((from, to)).or_insert(0) += 1;
    }

    /// Completed promotions out of `from`
    pub fn promoted_from(&self, from: Layer) -> usize {
        self.by_pair
            .iter()
            .filter(|((f, _), _)| *f == from)
            .map(|(_, count)| count)
            .sum()
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Promotion Metrics Summary".to_string(),
            "=========================".to_string(),
            format!("Attempted: {}", self.attempted),
            format!("Completed: {}", self.completed),
            format!("Rejected: {}", self.rejected),
            format!("Failed: {}", self.failed),
            format!("Not eligible: {}", self.not_eligible),
        ];

        if !self.by_pair.is_empty() {
            lines.push(String::new());
            lines.push("Promotions by layer:".to_string());
            for ((from, to), count) in &self.by_pair {
                lines.push(format!("  {} -> {}: {}", from, to, count));
            }
        }

        lines.join("\n")
    }
}

/// Counters kept by the demotion monitor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemotionMetrics {
    /// Entities evaluated
    pub evaluated: usize,

    /// Demotions per source layer
    pub demoted: BTreeMap<Layer, usize>,

    /// Entities below the feedback thresholds or already at the bottom
    pub skipped: usize,

    /// Per-entity errors
    pub errors: usize,

    /// Sweep cycles completed
    pub sweep_count: usize,
}

impl DemotionMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a demotion out of `from`
    pub fn record_demotion(&mut self, from: Layer) {
        *self.demoted.entry(from).or_insert(0) += 1;
    }

    /// Total demotions across layers
    pub fn total_demoted(&self) -> usize {
        self.demoted.values().sum()
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Demotion Metrics Summary".to_string(),
            "========================".to_string(),
            format!("Sweep cycles: {}", self.sweep_count),
            format!("Evaluated: {}", self.evaluated),
            format!("Skipped: {}", self.skipped),
            format!("Errors: {}", self.errors),
        ];

        if !self.demoted.is_empty() {
            lines.push(String::new());
            lines.push("Demotions from layer:".to_string());
            for (layer, count) in &self.demoted {
                lines.push(format!("  {}: {}", layer, count));
            }
            lines.push(format!("  Total: {}", self.total_demoted()));
        }

        lines.join("\n")
    }
}
