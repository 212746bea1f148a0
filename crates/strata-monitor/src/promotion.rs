//! Event-driven promotion of entities up the layer stack

use crate::tracker::{QueryTracker, TrackerRegistry};
use crate::{MonitorError, PromotionConfig, PromotionMetrics};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strata_domain::traits::{EntityFilter, EntityStore, EventPublisher};
use strata_domain::{with_timeout, DomainEvent, KnowledgeEntity, Layer, PropertyMap};
use strata_transition::{LayerTransitionEngine, LayerTransitionRecord, TransitionStatus};
use tracing::{debug, error, info, warn};

/// Property keys holding a code from a medical ontology
pub const ONTOLOGY_KEYS: [&str; 5] = ["snomed_code", "icd10_code", "umls_cui", "rxnorm_code", "loinc_code"];

/// Property keys listing inference rules that produced or used an entity
pub const INFERENCE_RULE_KEYS: [&str; 2] = ["inference_rules", "applied_rules"];

/// A fired promotion criterion
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionTrigger {
    /// Current layer
    pub from: Layer,
    /// Target layer
    pub to: Layer,
    /// Criterion that fired
    pub reason: String,
}

/// What happened to an eligible entity
#[derive(Debug, Clone, PartialEq)]
pub enum PromotionOutcome {
    /// Transition completed
    Promoted(LayerTransitionRecord),
    /// Transition rejected by validation
    Rejected(LayerTransitionRecord),
    /// Engine requires approval; the record sits in its pending queue
    AwaitingApproval(LayerTransitionRecord),
    /// Dry-run mode: nothing was requested
    DryRun(PromotionTrigger),
}

/// Totals from an on-demand scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Entities examined
    pub scanned: usize,
    /// Entities whose trigger fired
    pub eligible: usize,
    /// Completed promotions
    pub promoted: usize,
    /// Rejected promotions
    pub rejected: usize,
    /// Promotions waiting for approval
    pub pending: usize,
    /// Entities that errored
    pub errors: usize,
}

impl ScanReport {
    fn merge(&mut self, other: ScanReport) {
        self.scanned += other.scanned;
        self.eligible += other.eligible;
        self.promoted += other.promoted;
        self.rejected += other.rejected;
        self.pending += other.pending;
        self.errors += other.errors;
    }
}

/// Whether a property value counts as "set"
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn first_present<'a>(entity: &KnowledgeEntity, keys: &[&'a str]) -> Option<&'a str> {
    keys.iter()
        .copied()
        .find(|key| entity.properties.get(*key).is_some_and(is_present))
}

/// PERCEPTION→SEMANTIC: confidence, validation count or an ontology code
pub fn perception_trigger(entity: &KnowledgeEntity, config: &PromotionConfig) -> Option<String> {
    if entity.confidence >= config.semantic_confidence {
        return Some(format!(
            "confidence {:.2} >= {:.2}",
            entity.confidence, config.semantic_confidence
        ));
    }
    if let Some(count) = entity.number("validation_count") {
        if count >= config.semantic_validation_count as f64 {
            return Some(format!(
                "validation_count {} >= {}",
                count, config.semantic_validation_count
            ));
        }
    }
    first_present(entity, &ONTOLOGY_KEYS).map(|key| format!("ontology code {}", key))
}

/// SEMANTIC→REASONING: confidence, applied inference rules or references
pub fn semantic_trigger(entity: &KnowledgeEntity, references: u64, config: &PromotionConfig) -> Option<String> {
    if entity.confidence >= config.reasoning_confidence {
        return Some(format!(
            "confidence {:.2} >= {:.2}",
            entity.confidence, config.reasoning_confidence
        ));
    }
    if let Some(key) = first_present(entity, &INFERENCE_RULE_KEYS) {
        return Some(format!("inference rules applied ({})", key));
    }
    if references >= config.reasoning_reference_count {
        return Some(format!(
            "reference_count {} >= {}",
            references, config.reasoning_reference_count
        ));
    }
    None
}

/// REASONING→APPLICATION: enough queries and a high enough cache hit rate
pub fn application_trigger(tracker: &QueryTracker, config: &PromotionConfig) -> Option<String> {
    let rate = tracker.cache_hit_rate();
    if tracker.query_count >= config.application_query_count && rate >= config.application_cache_hit_rate {
        Some(format!(
            "{} queries, cache hit rate {:.2} >= {:.2}",
            tracker.query_count, rate, config.application_cache_hit_rate
        ))
    } else {
        None
    }
}

/// Watches entity and query events and promotes entities that qualify
///
/// Promotions run through a [`LayerTransitionEngine`], so they are
/// validated, recorded and optionally versioned like any other transition.
pub struct PromotionMonitor {
    store: Arc<dyn EntityStore>,
    engine: Arc<LayerTransitionEngine>,
    publisher: Arc<dyn EventPublisher>,
    trackers: TrackerRegistry,
    config: PromotionConfig,
    metrics: Mutex<PromotionMetrics>,
}

impl PromotionMonitor {
    /// Create a monitor
    pub fn new(
        store: Arc<dyn EntityStore>,
        engine: Arc<LayerTransitionEngine>,
        publisher: Arc<dyn EventPublisher>,
        config: PromotionConfig,
    ) -> Self {
        Self {
            store,
            engine,
            publisher,
            trackers: TrackerRegistry::new(),
            config,
            metrics: Mutex::new(PromotionMetrics::new()),
        }
    }

    /// Monitor configuration
    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    /// Query trackers
    pub fn trackers(&self) -> &TrackerRegistry {
        &self.trackers
    }

    /// Drop trackers whose last query fell outside the query window
    pub async fn evict_stale_trackers(&self, now: DateTime<Utc>) -> usize {
        let evicted = self.trackers.evict_stale(now, self.config.query_window()).await;
        if evicted > 0 {
            debug!("Evicted {} stale query trackers", evicted);
        }
        evicted
    }

    /// Snapshot of the running statistics
    pub fn stats(&self) -> PromotionMetrics {
        self.metrics().clone()
    }

    /// Reset statistics counters
    pub fn reset_stats(&self) {
        self.metrics().reset();
    }

    fn metrics(&self) -> MutexGuard<'_, PromotionMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_timeout(&self) -> Duration {
        self.engine.config().store_timeout()
    }

    /// React to one event
    ///
    /// Entity events evaluate the entity's current layer. Query events feed
    /// the tracker and only ever consider REASONING→APPLICATION. Other
    /// events are ignored.
    pub async fn handle_event(&self, event: &DomainEvent) -> Result<Option<PromotionOutcome>, MonitorError> {
        match event {
            DomainEvent::EntityCreated { entity } | DomainEvent::EntityUpdated { entity } => {
                if !self.config.auto_promote {
                    return Ok(None);
                }
                let tracker = self.trackers.get(&entity.id).await;
                self.consider(entity, tracker.as_ref()).await
            }
            DomainEvent::QueryExecuted {
                entity_id,
                cache_hit,
                at,
            } => {
                let observation = self
                    .trackers
                    .observe(entity_id, *cache_hit, *at, self.config.query_window())
                    .await;
                if !self.config.auto_promote {
                    return Ok(None);
                }
                if observation.reset {
                    debug!("Query window for {} expired, tracker reset", entity_id);
                    return Ok(None);
                }

                let entity = match with_timeout(self.store_timeout(), self.store.get_entity(entity_id)).await? {
                    Some(entity) => entity,
                    None => {
                        debug!("Queried entity {} is not in the store", entity_id);
                        return Ok(None);
                    }
                };
                if entity.layer != Layer::Reasoning {
                    return Ok(None);
                }
                self.consider(&entity, Some(&observation.tracker)).await
            }
            _ => Ok(None),
        }
    }

    /// Which promotion, if any, `entity` qualifies for
    pub async fn evaluate(
        &self,
        entity: &KnowledgeEntity,
        tracker: Option<&QueryTracker>,
    ) -> Result<Option<PromotionTrigger>, MonitorError> {
        let Some(to) = entity.layer.next() else {
            return Ok(None);
        };

        let reason = match entity.layer {
            Layer::Perception => perception_trigger(entity, &self.config),
            Layer::Semantic => match entity.number("reference_count") {
                Some(references) => semantic_trigger(entity, references.max(0.0) as u64, &self.config),
                None => match semantic_trigger(entity, 0, &self.config) {
                    Some(reason) => Some(reason),
                    None => {
                        let references = with_timeout(
                            self.store_timeout(),
                            self.store.list_relationships(&entity.id),
                        )
                        .await?
                        .len() as u64;
                        semantic_trigger(entity, references, &self.config)
                    }
                },
            },
            Layer::Reasoning => tracker.and_then(|t| application_trigger(t, &self.config)),
            Layer::Application => None,
        };

        Ok(reason.map(|reason| PromotionTrigger {
            from: entity.layer,
            to,
            reason,
        }))
    }

    async fn consider(
        &self,
        entity: &KnowledgeEntity,
        tracker: Option<&QueryTracker>,
    ) -> Result<Option<PromotionOutcome>, MonitorError> {
        match self.evaluate(entity, tracker).await? {
            Some(trigger) => self.promote(entity, trigger, tracker).await.map(Some),
            None => {
                debug!("{} ({}) not eligible for promotion", entity.id, entity.layer);
                self.metrics().not_eligible += 1;
                Ok(None)
            }
        }
    }

    /// Payload for the transition: the entity's properties plus layer defaults
    fn enrich(
        &self,
        entity: &KnowledgeEntity,
        trigger: &PromotionTrigger,
        tracker: Option<&QueryTracker>,
    ) -> PropertyMap {
        let mut payload = entity.properties.clone();
        match trigger.to {
            Layer::Semantic => {
                let domain = entity.text("domain").unwrap_or("general").to_string();
                payload.insert("domain".into(), Value::from(domain));
                payload.insert("validated".into(), Value::from(true));
                if entity.text("description").is_none() {
                    payload.insert(
                        "description".into(),
                        Value::from(format!("{} ({})", entity.name, entity.entity_type)),
                    );
                }
            }
            Layer::Reasoning => {
                let confidence = if entity.confidence > 0.0 {
                    entity.confidence
                } else {
                    self.config.default_reasoning_confidence
                };
                payload.insert("confidence".into(), Value::from(confidence));
                if entity.text("reasoning").is_none() {
                    payload.insert(
                        "reasoning".into(),
                        Value::from(format!("Promoted from {}: {}", trigger.from, trigger.reason)),
                    );
                }
            }
            Layer::Application => {
                if entity.text("usage_context").is_none() {
                    payload.insert("usage_context".into(), Value::from("general"));
                }
                let access_pattern = match tracker {
                    Some(t) => format!(
                        "{} queries, {:.2} cache hit rate",
                        t.query_count,
                        t.cache_hit_rate()
                    ),
                    None => "frequent".to_string(),
                };
                payload.insert("access_pattern".into(), Value::from(access_pattern));
                payload.insert("promoted_at".into(), Value::from(Utc::now().to_rfc3339()));
            }
            Layer::Perception => {}
        }
        payload
    }

    /// Request and execute the transition for a fired trigger
    pub async fn promote(
        &self,
        entity: &KnowledgeEntity,
        trigger: PromotionTrigger,
        tracker: Option<&QueryTracker>,
    ) -> Result<PromotionOutcome, MonitorError> {
        self.metrics().attempted += 1;

        if self.config.dry_run {
            info!(
                "[dry run] Would promote {}: {} -> {} ({})",
                entity.id, trigger.from, trigger.to, trigger.reason
            );
            return Ok(PromotionOutcome::DryRun(trigger));
        }

        let payload = self.enrich(entity, &trigger, tracker);
        let mut metadata = PropertyMap::new();
        metadata.insert("trigger".into(), Value::from(trigger.reason.clone()));
        metadata.insert("requested_by".into(), Value::from("promotion_monitor"));

        let record = self.engine.request_transition(
            entity.id.clone(),
            trigger.from,
            trigger.to,
            trigger.reason.clone(),
            metadata,
        );
        match record.status {
            TransitionStatus::Rejected => {
                self.metrics().rejected += 1;
                return Ok(PromotionOutcome::Rejected(record));
            }
            TransitionStatus::Pending => {
                info!(
                    "Promotion of {} to {} awaiting approval ({})",
                    entity.id, trigger.to, record.transition_id
                );
                return Ok(PromotionOutcome::AwaitingApproval(record));
            }
            _ => {}
        }

        let record = match self.engine.execute_transition(&record.transition_id, &payload).await {
            Ok(record) => record,
            Err(e) => {
                self.metrics().failed += 1;
                error!("Promotion of {} to {} failed: {}", entity.id, trigger.to, e);
                return Err(e.into());
            }
        };
        if record.status != TransitionStatus::Completed {
            self.metrics().rejected += 1;
            warn!(
                "Promotion of {} to {} rejected: {}",
                entity.id,
                trigger.to,
                record.rejection_reason.as_deref().unwrap_or("unknown")
            );
            return Ok(PromotionOutcome::Rejected(record));
        }
        self.metrics().record_completed(trigger.from, trigger.to);

        let resulting_id = record
            .resulting_entity_id
            .clone()
            .unwrap_or_else(|| entity.id.clone());

        let mut audit = PropertyMap::new();
        audit.insert("promoted_from".into(), Value::from(trigger.from.as_str()));
        audit.insert("promotion_reason".into(), Value::from(trigger.reason.clone()));
        audit.insert("last_transition_id".into(), Value::from(record.transition_id.to_string()));
        if let Err(e) = with_timeout(
            self.store_timeout(),
            self.store.update_entity_properties(&resulting_id, audit),
        )
        .await
        {
            warn!("Could not stamp promotion audit fields on {}: {}", resulting_id, e);
        }

        if trigger.from == Layer::Reasoning {
            self.trackers.remove(&entity.id).await;
        }

        self.publisher.publish(DomainEvent::LayerTransitionCompleted {
            entity_id: entity.id.clone(),
            resulting_entity_id: resulting_id,
            from_layer: trigger.from,
            to_layer: trigger.to,
            reason: trigger.reason.clone(),
            transition_id: record.transition_id.to_string(),
        });

        info!(
            "Promoted {} {} -> {} ({})",
            entity.id, trigger.from, trigger.to, trigger.reason
        );
        Ok(PromotionOutcome::Promoted(record))
    }

    /// Evaluate up to `limit` entities of `layer`, promoting each eligible one
    ///
    /// Per-entity errors are logged and counted; the scan continues.
    pub async fn scan_candidates(&self, layer: Layer, limit: usize) -> Result<ScanReport, MonitorError> {
        let mut report = ScanReport::default();
        if layer.next().is_none() {
            return Ok(report);
        }

        let entities = with_timeout(
            self.store_timeout(),
            self.store.query_by_layer(layer, &EntityFilter::default(), limit),
        )
        .await?;
        report.scanned = entities.len();

        for entity in entities {
            let tracker = self.trackers.get(&entity.id).await;
            match self.consider(&entity, tracker.as_ref()).await {
                Ok(None) => {}
                Ok(Some(outcome)) => {
                    report.eligible += 1;
                    match outcome {
                        PromotionOutcome::Promoted(_) => report.promoted += 1,
                        PromotionOutcome::Rejected(_) => report.rejected += 1,
                        PromotionOutcome::AwaitingApproval(_) => report.pending += 1,
                        PromotionOutcome::DryRun(_) => {}
                    }
                }
                Err(e) => {
                    warn!("Scan of {} failed: {}", entity.id, e);
                    report.errors += 1;
                }
            }
        }

        debug!("Scanned {}: {:?}", layer, report);
        Ok(report)
    }

    /// Scan every promotable layer, top-down so an entity climbs at most one layer per scan
    pub async fn scan_all(&self, limit: usize) -> Result<ScanReport, MonitorError> {
        let mut report = ScanReport::default();
        for layer in [Layer::Reasoning, Layer::Semantic, Layer::Perception] {
            report.merge(self.scan_candidates(layer, limit).await?);
        }
        Ok(report)
    }
}
