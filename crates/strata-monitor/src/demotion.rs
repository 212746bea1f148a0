//! Feedback-driven demotion of entities down the layer stack

use crate::{DemotionConfig, DemotionMetrics, MonitorError};
use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strata_domain::traits::{EntityStore, EventPublisher, FeedbackStore};
use strata_domain::{with_timeout, DomainEvent, EntityId, Layer, PropertyMap, StoreError};
use tracing::{debug, error, info, warn};

/// One applied (or, in dry-run mode, planned) demotion
#[derive(Debug, Clone, PartialEq)]
pub struct Demotion {
    /// Entity that moved
    pub entity_id: EntityId,
    /// Layer before
    pub from_layer: Layer,
    /// Layer after
    pub to_layer: Layer,
    /// Confidence before the penalty
    pub previous_confidence: f64,
    /// Confidence after the penalty
    pub new_confidence: f64,
    /// Negative feedback that triggered the move
    pub negative_feedback_count: u64,
}

/// What a demotion check decided for one entity
#[derive(Debug, Clone, PartialEq)]
pub enum DemotionCheck {
    /// Moved (or, in dry-run mode, would move) down one layer
    Demoted(Demotion),
    /// Left in place, but later feedback could still demote it
    Pending,
    /// Left in place with nothing to act on: no negative feedback, or
    /// already at the bottom layer
    Settled,
}

impl DemotionCheck {
    /// The demotion, if one happened
    pub fn demotion(self) -> Option<Demotion> {
        match self {
            DemotionCheck::Demoted(demotion) => Some(demotion),
            DemotionCheck::Pending | DemotionCheck::Settled => None,
        }
    }
}

/// Result of evaluating a batch of entities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemotionReport {
    /// Entities evaluated
    pub evaluated: usize,
    /// Demotions applied
    pub demoted: Vec<Demotion>,
    /// Entities left where they are
    pub skipped: usize,
    /// Skipped entities that need no further checks
    pub settled: Vec<EntityId>,
    /// Entities that errored, with the error message
    pub errors: Vec<(EntityId, String)>,
}

/// Confidence after one demotion step
pub fn penalised_confidence(confidence: f64, config: &DemotionConfig) -> f64 {
    (confidence - config.confidence_step).max(config.confidence_floor).clamp(0.0, 1.0)
}

/// Moves entities down one layer once they collect enough negative feedback
pub struct DemotionMonitor {
    store: Arc<dyn EntityStore>,
    feedback: Arc<dyn FeedbackStore>,
    publisher: Arc<dyn EventPublisher>,
    config: DemotionConfig,
    timeout: Duration,
    metrics: Mutex<DemotionMetrics>,
}

impl DemotionMonitor {
    /// Create a monitor; `timeout` bounds every store call
    pub fn new(
        store: Arc<dyn EntityStore>,
        feedback: Arc<dyn FeedbackStore>,
        publisher: Arc<dyn EventPublisher>,
        config: DemotionConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            feedback,
            publisher,
            config,
            timeout,
            metrics: Mutex::new(DemotionMetrics::new()),
        }
    }

    /// Monitor configuration
    pub fn config(&self) -> &DemotionConfig {
        &self.config
    }

    /// Snapshot of the running statistics
    pub fn stats(&self) -> DemotionMetrics {
        self.metrics().clone()
    }

    /// Reset statistics counters
    pub fn reset_stats(&self) {
        self.metrics().reset();
    }

    fn metrics(&self) -> MutexGuard<'_, DemotionMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluate a batch of entities, demoting the ones that qualify
    ///
    /// Errors for one entity are logged and reported; the batch continues.
    pub async fn evaluate(&self, entity_ids: &[EntityId]) -> DemotionReport {
        let mut report = DemotionReport::default();
        for id in entity_ids {
            report.evaluated += 1;
            match self.check(id).await {
                Ok(DemotionCheck::Demoted(demotion)) => report.demoted.push(demotion),
                Ok(DemotionCheck::Pending) => report.skipped += 1,
                Ok(DemotionCheck::Settled) => {
                    report.skipped += 1;
                    report.settled.push(id.clone());
                }
                Err(e) => {
                    warn!("Demotion check for {} failed: {}", id, e);
                    self.metrics().errors += 1;
                    report.errors.push((id.clone(), e.to_string()));
                }
            }
        }
        self.metrics().sweep_count += 1;
        report
    }

    /// Evaluate one entity
    pub async fn evaluate_entity(&self, id: &EntityId) -> Result<Option<Demotion>, MonitorError> {
        Ok(self.check(id).await?.demotion())
    }

    /// Evaluate one entity, reporting why it was left in place
    ///
    /// # Errors
    ///
    /// Store and feedback failures. If the negative-feedback reset fails
    /// after the demotion was written, the entity's previous layer and
    /// confidence are restored before the error is returned.
    pub async fn check(&self, id: &EntityId) -> Result<DemotionCheck, MonitorError> {
        self.metrics().evaluated += 1;

        let counts = with_timeout(self.timeout, self.feedback.get_feedback(id)).await?;
        if counts.negative_feedback_count == 0 {
            debug!("{} has no negative feedback", id);
            self.metrics().skipped += 1;
            return Ok(DemotionCheck::Settled);
        }
        if counts.feedback_count < self.config.min_feedback_count
            || counts.negative_feedback_count < self.config.demotion_threshold
        {
            debug!(
                "{} below demotion thresholds ({} feedback, {} negative)",
                id, counts.feedback_count, counts.negative_feedback_count
            );
            self.metrics().skipped += 1;
            return Ok(DemotionCheck::Pending);
        }

        let entity = with_timeout(self.timeout, self.store.get_entity(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let Some(to_layer) = entity.layer.previous() else {
            debug!("{} is already at {}, nothing to demote to", id, entity.layer);
            self.metrics().skipped += 1;
            return Ok(DemotionCheck::Settled);
        };

        let demotion = Demotion {
            entity_id: id.clone(),
            from_layer: entity.layer,
            to_layer,
            previous_confidence: entity.confidence,
            new_confidence: penalised_confidence(entity.confidence, &self.config),
            negative_feedback_count: counts.negative_feedback_count,
        };

        if self.config.dry_run {
            info!(
                "[dry run] Would demote {}: {} -> {} (confidence {:.2} -> {:.2})",
                id, demotion.from_layer, demotion.to_layer, demotion.previous_confidence, demotion.new_confidence
            );
            return Ok(DemotionCheck::Demoted(demotion));
        }

        let reason = format!(
            "{} negative of {} feedback (threshold {})",
            counts.negative_feedback_count, counts.feedback_count, self.config.demotion_threshold
        );
        let mut props = PropertyMap::new();
        props.insert("previous_layer".into(), Value::from(entity.layer.as_str()));
        props.insert("demoted_at".into(), Value::from(Utc::now().to_rfc3339()));
        props.insert("demotion_reason".into(), Value::from(reason));

        // Put back exactly what the demotion overwrites
        let mut restore: PropertyMap = props
            .keys()
            .map(|key| (key.clone(), entity.properties.get(key).cloned().unwrap_or(Value::Null)))
            .collect();
        restore.insert("layer".into(), Value::from(entity.layer.as_str()));
        restore.insert("confidence".into(), Value::from(entity.confidence));

        props.insert("layer".into(), Value::from(to_layer.as_str()));
        props.insert("confidence".into(), Value::from(demotion.new_confidence));

        let updated = with_timeout(self.timeout, self.store.update_entity_properties(id, props)).await?;
        if !updated {
            return Err(StoreError::NotFound(id.to_string()).into());
        }
        if let Err(e) = with_timeout(self.timeout, self.feedback.reset_negative_feedback(id)).await {
            warn!("Could not reset negative feedback for {}, rolling back demotion: {}", id, e);
            if let Err(rollback) =
                with_timeout(self.timeout, self.store.update_entity_properties(id, restore)).await
            {
                error!("Rollback of demotion for {} failed: {}", id, rollback);
            }
            return Err(e.into());
        }

        self.metrics().record_demotion(demotion.from_layer);
        self.publisher.publish(DomainEvent::EntityDemoted {
            entity_id: id.clone(),
            from_layer: demotion.from_layer,
            to_layer,
            negative_feedback_count: counts.negative_feedback_count,
            new_confidence: demotion.new_confidence,
        });

        info!(
            "Demoted {} {} -> {} after {} negative feedback (confidence {:.2} -> {:.2})",
            id,
            demotion.from_layer,
            to_layer,
            counts.negative_feedback_count,
            demotion.previous_confidence,
            demotion.new_confidence
        );
        Ok(DemotionCheck::Demoted(demotion))
    }
}
