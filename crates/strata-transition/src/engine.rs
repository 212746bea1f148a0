//! Layer transition state machine

use crate::record::diff_properties;
use crate::validator::{backwards_error, validate_transition};
use crate::{
    LayerTransitionRecord, TransitionConfig, TransitionError, TransitionId, TransitionStatus,
    ValidationOutcome,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strata_domain::traits::EntityStore;
use strata_domain::{with_timeout, EntityId, KnowledgeEntity, Layer, PropertyMap};
use tracing::{debug, info, warn};

/// Aggregate view over every transition the engine has seen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionStatistics {
    /// Records ever created
    pub total: usize,
    /// Records per status
    pub by_status: BTreeMap<TransitionStatus, usize>,
    /// Records per `from -> to` pair
    pub by_pair: BTreeMap<(Layer, Layer), usize>,
    /// Mean request-to-completion time of completed records
    pub average_completion_ms: Option<f64>,
}

impl TransitionStatistics {
    /// Count for one status
    pub fn count(&self, status: TransitionStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[derive(Default)]
struct EngineState {
    records: HashMap<TransitionId, LayerTransitionRecord>,
    /// Insertion order, which is chronological
    order: Vec<TransitionId>,
    pending: VecDeque<TransitionId>,
    in_flight: HashSet<TransitionId>,
}

/// Moves entities between layers under validation
///
/// The state lock is never held across an await: execution claims the
/// record (check-and-set of an in-flight marker), talks to the store
/// unlocked, then writes the outcome back. That guarantees at most one
/// successful execution per transition id.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use strata_domain::{Layer, PropertyMap};
/// use strata_store::MemoryStore;
/// use strata_transition::{LayerTransitionEngine, TransitionConfig};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(MemoryStore::new());
/// let engine = LayerTransitionEngine::new(store, TransitionConfig::default());
///
/// let mut payload = PropertyMap::new();
/// payload.insert("domain".into(), "cardiology".into());
/// let record = engine.request_transition(
///     "e1".into(), Layer::Perception, Layer::Semantic, "validated", PropertyMap::new(),
/// );
/// let record = engine.execute_transition(&record.transition_id, &payload).await?;
/// println!("{}", record.status);
/// # Ok(())
/// # }
/// ```
pub struct LayerTransitionEngine {
    store: Arc<dyn EntityStore>,
    config: TransitionConfig,
    state: Mutex<EngineState>,
}

impl LayerTransitionEngine {
    /// Create an engine over `store`
    pub fn new(store: Arc<dyn EntityStore>, config: TransitionConfig) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a transition request
    ///
    /// Backward or sideways requests are rejected on the spot. Otherwise the
    /// record is queued as PENDING when approval is required, or approved
    /// immediately.
    pub fn request_transition(
        &self,
        entity_id: EntityId,
        from: Layer,
        to: Layer,
        reason: impl Into<String>,
        metadata: PropertyMap,
    ) -> LayerTransitionRecord {
        let mut record = LayerTransitionRecord::new(entity_id, from, to, reason.into(), metadata);

        if to.order() <= from.order() {
            let error = backwards_error(from, to);
            record.status = TransitionStatus::Rejected;
            record.completed_at = Some(Utc::now());
            record.rejection_reason = Some(error.clone());
            record.validation = Some(ValidationOutcome {
                is_valid: false,
                errors: vec![error],
            });
            warn!(
                "Rejected transition request for {}: {} -> {}",
                record.entity_id, from, to
            );
        } else if self.config.require_approval {
            record.status = TransitionStatus::Pending;
        } else {
            record.status = TransitionStatus::Approved;
            record.approved_by = Some("system".to_string());
        }

        let mut state = self.state();
        if record.status == TransitionStatus::Pending {
            state.pending.push_back(record.transition_id);
        }
        state.order.push(record.transition_id);
        state.records.insert(record.transition_id, record.clone());

        debug!(
            "Transition {} requested for {} ({} -> {}): {}",
            record.transition_id, record.entity_id, from, to, record.status
        );
        record
    }

    /// Approve a PENDING request
    pub fn approve_transition(
        &self,
        id: &TransitionId,
        approver: &str,
    ) -> Result<LayerTransitionRecord, TransitionError> {
        let mut state = self.state();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| TransitionError::NotFound(id.to_string()))?;
        if record.status != TransitionStatus::Pending {
            return Err(TransitionError::InvalidState {
                id: id.to_string(),
                status: record.status,
                action: "approve",
            });
        }
        record.status = TransitionStatus::Approved;
        record.approved_by = Some(approver.to_string());
        let approved = record.clone();
        state.pending.retain(|p| p != id);

        info!("Transition {} approved by {}", id, approver);
        Ok(approved)
    }

    /// Reject a PENDING request; terminal
    pub fn reject_transition(
        &self,
        id: &TransitionId,
        reason: &str,
    ) -> Result<LayerTransitionRecord, TransitionError> {
        let mut state = self.state();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| TransitionError::NotFound(id.to_string()))?;
        if record.status != TransitionStatus::Pending {
            return Err(TransitionError::InvalidState {
                id: id.to_string(),
                status: record.status,
                action: "reject",
            });
        }
        record.status = TransitionStatus::Rejected;
        record.rejection_reason = Some(reason.to_string());
        record.completed_at = Some(Utc::now());
        let rejected = record.clone();
        state.pending.retain(|p| p != id);

        info!("Transition {} rejected: {}", id, reason);
        Ok(rejected)
    }

    /// Requests waiting for approval, oldest first
    pub fn pending_transitions(&self) -> Vec<LayerTransitionRecord> {
        let state = self.state();
        state
            .pending
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect()
    }

    /// Look up one record
    pub fn get_transition(&self, id: &TransitionId) -> Result<LayerTransitionRecord, TransitionError> {
        self.state()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| TransitionError::NotFound(id.to_string()))
    }

    /// Check a payload without touching any record
    pub fn validate_transition(&self, entity_data: &PropertyMap, from: Layer, to: Layer) -> ValidationOutcome {
        validate_transition(entity_data, from, to)
    }

    /// Apply an APPROVED transition
    ///
    /// Returns the updated record: COMPLETED on success, REJECTED when the
    /// payload fails validation.
    ///
    /// # Errors
    ///
    /// - [`TransitionError::NotExecutable`] for PENDING, terminal or already running records
    /// - [`TransitionError::Backend`] when the store fails; the record stays APPROVED
    /// - [`TransitionError::EntityNotFound`] / [`TransitionError::LayerMismatch`] mark the record FAILED
    pub async fn execute_transition(
        &self,
        id: &TransitionId,
        entity_data: &PropertyMap,
    ) -> Result<LayerTransitionRecord, TransitionError> {
        let record = self.claim(id)?;

        let validation = validate_transition(entity_data, record.from_layer, record.to_layer);
        if !validation.is_valid {
            warn!(
                "Transition {} for {} failed validation: {:?}",
                id, record.entity_id, validation.errors
            );
            return self.finish(id, |r| {
                r.status = TransitionStatus::Rejected;
                r.rejection_reason = Some(validation.errors.join("; "));
                r.validation = Some(validation);
                r.completed_at = Some(Utc::now());
            });
        }

        let timeout = self.config.store_timeout();
        let entity = match with_timeout(timeout, self.store.get_entity(&record.entity_id)).await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                let missing = record.entity_id.clone();
                self.finish(id, |r| {
                    r.status = TransitionStatus::Failed;
                    r.rejection_reason = Some(format!("entity {} not found", missing));
                    r.completed_at = Some(Utc::now());
                })?;
                return Err(TransitionError::EntityNotFound(missing));
            }
            Err(e) => {
                self.release(id);
                return Err(e.into());
            }
        };

        if entity.layer != record.from_layer {
            let actual = entity.layer;
            self.finish(id, |r| {
                r.status = TransitionStatus::Failed;
                r.rejection_reason = Some(format!("entity is in {}", actual));
                r.completed_at = Some(Utc::now());
            })?;
            return Err(TransitionError::LayerMismatch {
                id: entity.id,
                expected: record.from_layer,
                actual,
            });
        }

        let before = entity.to_map();
        let mut after = before.clone();
        after.extend(entity_data.clone());
        after.insert("layer".into(), record.to_layer.as_str().into());
        let properties_changed = diff_properties(&before, &after);

        let resulting_id = match self.apply(&entity, &record, entity_data, after).await {
            Ok(resulting_id) => resulting_id,
            Err(e) => {
                warn!("Transition {} could not be applied: {}", id, e);
                self.release(id);
                return Err(e);
            }
        };

        let lineage = self.lineage_ids(&entity.id);
        let completed = self.finish(id, |r| {
            r.status = TransitionStatus::Completed;
            r.validation = Some(validation);
            r.properties_changed = properties_changed;
            r.lineage = lineage;
            r.resulting_entity_id = Some(resulting_id);
            r.completed_at = Some(Utc::now());
        })?;

        info!(
            "Transition {} completed: {} {} -> {} ({} properties changed)",
            id,
            completed.entity_id,
            completed.from_layer,
            completed.to_layer,
            completed.properties_changed.len()
        );
        Ok(completed)
    }

    /// Write the move to the store, returning the id the entity now lives under
    async fn apply(
        &self,
        entity: &KnowledgeEntity,
        record: &LayerTransitionRecord,
        entity_data: &PropertyMap,
        after: PropertyMap,
    ) -> Result<EntityId, TransitionError> {
        let timeout = self.config.store_timeout();

        if self.config.enable_versioning {
            if let Some(versioning) = self.store.versioning() {
                let root = entity.id.root();
                let n = with_timeout(timeout, versioning.version_count(&root)).await? + 1;
                let new_id = entity.id.versioned(n);
                let mut copy = KnowledgeEntity::from_map(new_id.clone(), after)
                    .map_err(|e| strata_domain::StoreError::InvalidData(e.to_string()))?;
                copy.created_at = Utc::now();
                with_timeout(timeout, versioning.create_version(&entity.id, copy)).await?;
                debug!("Created version {} of {}", new_id, entity.id);
                return Ok(new_id);
            }
            debug!("Store has no versioning support, updating {} in place", entity.id);
        }

        with_timeout(
            timeout,
            self.store
                .promote_entity(&entity.id, record.to_layer, entity_data.clone()),
        )
        .await?;
        Ok(entity.id.clone())
    }

    /// Atomically mark an APPROVED record as running
    fn claim(&self, id: &TransitionId) -> Result<LayerTransitionRecord, TransitionError> {
        let mut state = self.state();
        let record = state
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| TransitionError::NotFound(id.to_string()))?;
        if record.status != TransitionStatus::Approved || state.in_flight.contains(id) {
            return Err(TransitionError::NotExecutable {
                id: id.to_string(),
                status: record.status,
            });
        }
        state.in_flight.insert(*id);
        Ok(record)
    }

    /// Drop the running marker without changing the record
    fn release(&self, id: &TransitionId) {
        self.state().in_flight.remove(id);
    }

    /// Apply `update` to the record and drop the running marker
    fn finish(
        &self,
        id: &TransitionId,
        update: impl FnOnce(&mut LayerTransitionRecord),
    ) -> Result<LayerTransitionRecord, TransitionError> {
        let mut state = self.state();
        state.in_flight.remove(id);
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| TransitionError::NotFound(id.to_string()))?;
        update(record);
        Ok(record.clone())
    }

    /// Prior ids of the logical entity, oldest first, ending with `current`
    fn lineage_ids(&self, current: &EntityId) -> Vec<EntityId> {
        let state = self.state();
        let mut lineage: Vec<EntityId> = Vec::new();
        for record in state.order.iter().filter_map(|id| state.records.get(id)) {
            if record.status == TransitionStatus::Completed
                && record.touches(current)
                && !lineage.contains(&record.entity_id)
            {
                lineage.push(record.entity_id.clone());
            }
        }
        if !lineage.contains(current) {
            lineage.push(current.clone());
        }
        lineage
    }

    /// Every record touching the logical entity, chronologically
    pub fn get_entity_lineage(&self, entity_id: &EntityId) -> Vec<LayerTransitionRecord> {
        let state = self.state();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|r| r.touches(entity_id))
            .cloned()
            .collect()
    }

    /// Counts by status and by layer pair, plus mean completion time
    pub fn get_layer_statistics(&self) -> TransitionStatistics {
        let state = self.state();
        let mut stats = TransitionStatistics {
            total: state.records.len(),
            ..Default::default()
        };
        let mut durations = Vec::new();
        for record in state.records.values() {
            *stats.by_status.entry(record.status).or_insert(0) += 1;
            *stats
                .by_pair
                .entry((record.from_layer, record.to_layer))
                .or_insert(0) += 1;
            if record.status == TransitionStatus::Completed {
                if let Some(ms) = record.completion_millis() {
                    durations.push(ms as f64);
                }
            }
        }
        if !durations.is_empty() {
            stats.average_completion_ms = Some(durations.iter().sum::<f64>() / durations.len() as f64);
        }
        stats
    }
}
