//! Query routing across layers

use crate::cache::{cache_key, CacheStats, QueryCache};
use crate::trace::{
    merge_layer_results, ConflictRecord, LayerResult, QueryTrace, RoutedResult, NEURAL_CAUTION,
    REASONING_FALLBACK, SAFETY_DISCLAIMER,
};
use crate::{classify_heuristic, extract_terms, QueryType, RouterConfig, RouterError, Strategy};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use strata_domain::traits::{
    EntityFilter, EntityStore, EventPublisher, Inference, IntentClassifier, ReasoningEngine,
    ReasoningMode, ReasoningRequest,
};
use strata_domain::{with_timeout, Confidence, CrossLayerPropagator, DomainEvent, KnowledgeEntity, Layer};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A query to route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Free query text
    pub text: String,
    /// Force a strategy instead of deriving it from the query type
    pub strategy: Option<Strategy>,
    /// Skip classification
    pub query_type: Option<QueryType>,
}

impl QueryRequest {
    /// Route `text` with classification and the default strategy mapping
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            strategy: None,
            query_type: None,
        }
    }

    /// Force a strategy
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Use a known query type
    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = Some(query_type);
        self
    }
}

impl From<&str> for QueryRequest {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Counters kept by the router
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouterStatistics {
    /// Queries started
    pub total_queries: u64,
    /// Queries per strategy
    pub by_strategy: BTreeMap<Strategy, u64>,
    /// Answers served from cache
    pub cache_hits: u64,
    /// Cache lookups that missed
    pub cache_misses: u64,
    /// Layers that degraded to empty
    pub layer_errors: u64,
    /// Queries answered without the rule engine
    pub reasoning_fallbacks: u64,
    /// Conflicts detected
    pub conflicts: u64,
    /// Queries cancelled by the caller
    pub cancelled: u64,
}

impl RouterStatistics {
    /// Reset all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Router Statistics Summary".to_string(),
            "=========================".to_string(),
            format!("Total queries: {}", self.total_queries),
            format!("Cache hits: {}", self.cache_hits),
            format!("Cache misses: {}", self.cache_misses),
            format!("Layer errors: {}", self.layer_errors),
            format!("Reasoning fallbacks: {}", self.reasoning_fallbacks),
            format!("Conflicts: {}", self.conflicts),
            format!("Cancelled: {}", self.cancelled),
        ];

        if !self.by_strategy.is_empty() {
            lines.push(String::new());
            lines.push("Queries by strategy:".to_string());
            for (strategy, count) in &self.by_strategy {
                lines.push(format!("  {}: {}", strategy, count));
            }
        }

        lines.join("\n")
    }
}

/// Confidence of one layer's answer before cross-layer merging
pub fn layer_confidence(entity_count: usize, weight: f64) -> f64 {
    (0.5 + 0.1 * entity_count as f64).clamp(0.0, 1.0) * weight
}

#[derive(Debug, Clone, Copy)]
struct LayerQuery {
    limit: usize,
    relationship_entities: usize,
    relationships_per_entity: usize,
    timeout: Duration,
    weight: f64,
}

fn degraded_layer(layer: Layer, weight: f64, error: impl Into<String>) -> LayerResult {
    LayerResult {
        layer,
        entities: Vec::new(),
        relationships: Vec::new(),
        confidence: layer_confidence(0, weight),
        cache_hit: false,
        elapsed_ms: 0,
        error: Some(error.into()),
    }
}

async fn query_layer(store: Arc<dyn EntityStore>, layer: Layer, filter: EntityFilter, query: LayerQuery) -> LayerResult {
    let started = Instant::now();
    let (entities, mut error) = match with_timeout(query.timeout, store.query_by_layer(layer, &filter, query.limit)).await
    {
        Ok(entities) => (entities, None),
        Err(e) => {
            warn!("{} layer query failed, continuing without it: {}", layer, e);
            (Vec::new(), Some(e.to_string()))
        }
    };

    let mut relationships = Vec::new();
    for entity in entities.iter().take(query.relationship_entities) {
        match with_timeout(query.timeout, store.list_relationships(&entity.id)).await {
            Ok(found) => relationships.extend(found.into_iter().take(query.relationships_per_entity)),
            Err(e) => {
                warn!("Relationships for {} unavailable: {}", entity.id, e);
                if error.is_none() {
                    error = Some(e.to_string());
                }
            }
        }
    }

    LayerResult {
        layer,
        confidence: layer_confidence(entities.len(), query.weight),
        entities,
        relationships,
        cache_hit: false,
        elapsed_ms: started.elapsed().as_millis() as u64,
        error,
    }
}

struct ReasoningPass {
    inferences: Vec<Inference>,
    warnings: Vec<String>,
    notes: Vec<String>,
    confidence: Option<f64>,
    fell_back: bool,
}

struct Gathered {
    results: Vec<LayerResult>,
    reasoning: ReasoningPass,
    conflicts: Vec<ConflictRecord>,
    warnings: Vec<String>,
}

/// Routes queries across the knowledge layers
///
/// Each query is classified, mapped to a [`Strategy`], answered from the
/// layers that strategy visits and merged into one [`RoutedResult`] with a
/// full [`QueryTrace`]. Store failures and timeouts degrade a layer to empty;
/// rule engine failures fall back to a fixed confidence. Neither aborts the
/// query.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use strata_domain::traits::{ReasoningEngine, ReasoningMode, ReasoningOutcome, ReasoningRequest};
/// use strata_domain::{KnowledgeEntity, Layer, StoreError};
/// use strata_router::{QueryRequest, QueryRouter, RouterConfig, Strategy};
/// use strata_store::MemoryStore;
///
/// struct NoRules;
///
/// #[async_trait::async_trait]
/// impl ReasoningEngine for NoRules {
///     async fn apply_reasoning(
///         &self,
///         _request: &ReasoningRequest,
///         _mode: ReasoningMode,
///     ) -> Result<ReasoningOutcome, StoreError> {
///         Ok(ReasoningOutcome::default())
///     }
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = MemoryStore::new();
/// store.insert(KnowledgeEntity::new("d1", "Diabetes", "disease", Layer::Semantic, 0.9)).await;
///
/// let router = QueryRouter::new(Arc::new(store), Arc::new(NoRules), RouterConfig::default()).unwrap();
/// let result = router.route(QueryRequest::new("What is Diabetes?")).await.unwrap();
///
/// assert_eq!(result.trace.strategy, Strategy::Collaborative);
/// assert_eq!(result.entity_ids(), vec!["d1"]);
/// # });
/// ```
pub struct QueryRouter {
    store: Arc<dyn EntityStore>,
    reasoning: Arc<dyn ReasoningEngine>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    propagator: CrossLayerPropagator,
    cache: QueryCache<RoutedResult>,
    config: RouterConfig,
    stats: Mutex<RouterStatistics>,
}

impl QueryRouter {
    /// Create a router, validating `config`
    pub fn new(
        store: Arc<dyn EntityStore>,
        reasoning: Arc<dyn ReasoningEngine>,
        config: RouterConfig,
    ) -> Result<Self, RouterError> {
        config.validate()?;
        Ok(Self {
            store,
            reasoning,
            classifier: None,
            publisher: None,
            propagator: CrossLayerPropagator::new(config.propagation.clone()),
            cache: QueryCache::new(config.cache_ttl(), config.cache_capacity),
            config,
            stats: Mutex::new(RouterStatistics::default()),
        })
    }

    /// Classify queries with an external classifier, keeping keyword heuristics as fallback
    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Publish a `QueryExecuted` event for every entity served
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Router configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Snapshot of the running statistics
    pub fn stats(&self) -> RouterStatistics {
        self.lock_stats().clone()
    }

    /// Reset statistics counters
    pub fn reset_stats(&self) {
        self.lock_stats().reset();
    }

    /// Cache counters
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Drop every cached answer
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Drop expired cached answers
    pub async fn purge_expired(&self) -> usize {
        self.cache.purge_expired().await
    }

    fn lock_stats(&self) -> MutexGuard<'_, RouterStatistics> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Determine the query type
    ///
    /// Classifier errors and timeouts fall back to keyword heuristics.
    pub async fn classify(&self, text: &str) -> QueryType {
        if let Some(classifier) = &self.classifier {
            match with_timeout(self.config.layer_timeout(), classifier.classify(text)).await {
                Ok(kind) => return kind,
                Err(e) => warn!("Intent classifier unavailable, using keyword heuristics: {}", e),
            }
        }
        classify_heuristic(text)
    }

    /// Route a query to completion
    pub async fn route(&self, request: QueryRequest) -> Result<RoutedResult, RouterError> {
        self.route_with_cancel(request, CancellationToken::new()).await
    }

    /// Route a query, giving up when `cancel` fires
    ///
    /// Cancelling aborts every outstanding layer query.
    ///
    /// # Errors
    ///
    /// [`RouterError::Cancelled`] when the token fires first.
    pub async fn route_with_cancel(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<RoutedResult, RouterError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.lock_stats().cancelled += 1;
                info!("Query cancelled: {:?}", request.text);
                Err(RouterError::Cancelled)
            }
            result = self.execute(&request) => result,
        }
    }

    async fn execute(&self, request: &QueryRequest) -> Result<RoutedResult, RouterError> {
        let started = Instant::now();
        let query_type = match request.query_type {
            Some(kind) => kind,
            None => self.classify(&request.text).await,
        };
        let strategy = request
            .strategy
            .unwrap_or_else(|| Strategy::for_query_type(query_type));
        {
            let mut stats = self.lock_stats();
            stats.total_queries += 1;
            *stats.by_strategy.entry(strategy).or_insert(0) += 1;
        }
        debug!("Routing {} query via {}", query_type, strategy);

        let key = strategy
            .uses_cache()
            .then(|| cache_key(&request.text, strategy));
        if let Some(key) = &key {
            if let Some(cached) = self.cache.get(key).await {
                self.lock_stats().cache_hits += 1;
                debug!("Cache hit for {} query", strategy);
                let result = Self::served_from_cache(cached, started);
                self.publish_served(&result.entities, true);
                return Ok(result);
            }
            self.lock_stats().cache_misses += 1;
        }

        let filter = EntityFilter::terms(extract_terms(&request.text));
        let gathered = match strategy {
            Strategy::SymbolicOnly => self.symbolic_only(&request.text, &filter).await,
            Strategy::SymbolicFirst => self.symbolic_first(&request.text, &filter).await,
            Strategy::NeuralFirst => self.neural_first(&request.text, &filter).await,
            Strategy::Collaborative => self.collaborative(&request.text, &filter).await,
        };

        let result = self.assemble(query_type, strategy, gathered, started)?;
        let degraded = result.trace.layer_results.iter().any(|r| r.error.is_some())
            || result.trace.reasoning.iter().any(|note| note == REASONING_FALLBACK);
        if let Some(key) = key {
            if !degraded {
                self.cache.insert(key, result.clone()).await;
            }
        }
        self.publish_served(&result.entities, false);

        info!(
            "Routed {} query via {}: {} entities, confidence {:.2}, {} conflicts ({} ms)",
            query_type,
            strategy,
            result.entities.len(),
            result.trace.final_confidence,
            result.trace.conflicts_detected.len(),
            result.trace.elapsed_ms
        );
        Ok(result)
    }

    fn served_from_cache(mut cached: RoutedResult, started: Instant) -> RoutedResult {
        cached.trace.query_id = Uuid::now_v7();
        cached.trace.cache_hit = true;
        for layer in &mut cached.trace.layer_results {
            layer.cache_hit = true;
        }
        cached.trace.elapsed_ms = started.elapsed().as_millis() as u64;
        cached
    }

    fn publish_served(&self, entities: &[KnowledgeEntity], cache_hit: bool) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let at = Utc::now();
        for entity in entities {
            publisher.publish(DomainEvent::QueryExecuted {
                entity_id: entity.id.clone(),
                cache_hit,
                at,
            });
        }
    }

    fn layer_query(&self, layer: Layer) -> LayerQuery {
        LayerQuery {
            limit: self.config.entity_limit,
            relationship_entities: self.config.relationship_entities,
            relationships_per_entity: self.config.relationships_per_entity,
            timeout: self.config.layer_timeout(),
            weight: self.propagator.layer_weight(layer),
        }
    }

    /// Query `layers` as concurrent tasks, returning results in `layers` order
    async fn query_concurrent(&self, layers: &[Layer], filter: &EntityFilter) -> Vec<LayerResult> {
        let mut tasks = JoinSet::new();
        for (index, &layer) in layers.iter().enumerate() {
            let store = Arc::clone(&self.store);
            let filter = filter.clone();
            let query = self.layer_query(layer);
            tasks.spawn(async move { (index, query_layer(store, layer, filter, query).await) });
        }

        let mut slots: Vec<Option<LayerResult>> = vec![None; layers.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!("Layer query task failed: {}", e),
            }
        }

        layers
            .iter()
            .zip(slots)
            .map(|(&layer, slot)| {
                slot.unwrap_or_else(|| degraded_layer(layer, self.propagator.layer_weight(layer), "layer task failed"))
            })
            .collect()
    }

    async fn run_reasoning(&self, text: &str, results: &[LayerResult], mode: ReasoningMode) -> ReasoningPass {
        let (entities, relationships) = merge_layer_results(results);
        let request = ReasoningRequest {
            query: text.to_string(),
            entities,
            relationships,
        };

        match with_timeout(
            self.config.reasoning_timeout(),
            self.reasoning.apply_reasoning(&request, mode),
        )
        .await
        {
            Ok(outcome) => {
                let confidence = if outcome.inferences.is_empty() {
                    None
                } else {
                    let total: f64 = outcome.inferences.iter().map(|i| i.confidence.score()).sum();
                    Some(total / outcome.inferences.len() as f64)
                };
                let notes = outcome
                    .inferences
                    .iter()
                    .map(|i| match &i.rule {
                        Some(rule) => format!("{} ({})", i.statement, rule),
                        None => i.statement.clone(),
                    })
                    .collect();
                ReasoningPass {
                    inferences: outcome.inferences,
                    warnings: outcome.warnings,
                    notes,
                    confidence,
                    fell_back: false,
                }
            }
            Err(e) => {
                warn!(
                    "Reasoning unavailable ({}), falling back to confidence {:.2}",
                    e, self.config.fallback_confidence
                );
                ReasoningPass {
                    inferences: Vec::new(),
                    warnings: Vec::new(),
                    notes: vec![REASONING_FALLBACK.to_string()],
                    confidence: Some(self.config.fallback_confidence),
                    fell_back: true,
                }
            }
        }
    }

    async fn symbolic_only(&self, text: &str, filter: &EntityFilter) -> Gathered {
        let results = self
            .query_concurrent(Strategy::SymbolicOnly.layer_plan(), filter)
            .await;
        let reasoning = self.run_reasoning(text, &results, ReasoningMode::Symbolic).await;
        Gathered {
            results,
            reasoning,
            conflicts: Vec::new(),
            warnings: vec![SAFETY_DISCLAIMER.to_string()],
        }
    }

    async fn symbolic_first(&self, text: &str, filter: &EntityFilter) -> Gathered {
        let mut results = Vec::new();
        let mut collected = 0;
        for &layer in Strategy::SymbolicFirst.layer_plan() {
            let result = query_layer(Arc::clone(&self.store), layer, filter.clone(), self.layer_query(layer)).await;
            collected += result.entities.len();
            results.push(result);
            if collected >= self.config.early_stop_entities && layer != Layer::Perception {
                debug!("{} entities collected by {}, skipping lower layers", collected, layer);
                break;
            }
        }
        let reasoning = self.run_reasoning(text, &results, ReasoningMode::Symbolic).await;
        Gathered {
            results,
            reasoning,
            conflicts: Vec::new(),
            warnings: Vec::new(),
        }
    }

    async fn neural_first(&self, text: &str, filter: &EntityFilter) -> Gathered {
        let results = self
            .query_concurrent(Strategy::NeuralFirst.layer_plan(), filter)
            .await;
        let (perception, semantic): (Vec<&LayerResult>, Vec<&LayerResult>) =
            results.iter().partition(|r| r.layer == Layer::Perception);
        let perception: Vec<LayerResult> = perception.into_iter().cloned().collect();
        let reasoning = self.run_reasoning(text, &perception, ReasoningMode::Neural).await;

        let threshold = self.propagator.config().conflict_threshold;
        let mut conflicts = Vec::new();
        for inference in &reasoning.inferences {
            for entity in semantic.iter().flat_map(|r| r.entities.iter()) {
                if !inference.subjects.is_empty() && !inference.subjects.contains(&entity.id) {
                    continue;
                }
                let gap = (inference.confidence.score() - entity.confidence).abs();
                if gap > threshold {
                    conflicts.push(ConflictRecord {
                        layer_a: Layer::Perception,
                        score_a: inference.confidence.score(),
                        layer_b: Layer::Semantic,
                        score_b: entity.confidence,
                        gap,
                        subject: Some(format!("{} vs {}", inference.statement, entity.id)),
                        winning_layer: None,
                        resolution: None,
                    });
                }
            }
        }

        let mut warnings = Vec::new();
        if !conflicts.is_empty() {
            warn!("{} neural inferences disagree with semantic knowledge", conflicts.len());
            warnings.push(NEURAL_CAUTION.to_string());
        }
        Gathered {
            results,
            reasoning,
            conflicts,
            warnings,
        }
    }

    async fn collaborative(&self, text: &str, filter: &EntityFilter) -> Gathered {
        let results = self
            .query_concurrent(Strategy::Collaborative.layer_plan(), filter)
            .await;
        let reasoning = self.run_reasoning(text, &results, ReasoningMode::Hybrid).await;

        let threshold = self.propagator.config().conflict_threshold;
        let mut conflicts = Vec::new();
        for (i, a) in results.iter().enumerate() {
            for b in &results[i + 1..] {
                let gap = (a.confidence - b.confidence).abs();
                if gap <= threshold {
                    continue;
                }
                let resolution = self.propagator.resolve_conflict(
                    a.layer,
                    &Confidence::heuristic(a.confidence),
                    b.layer,
                    &Confidence::heuristic(b.confidence),
                );
                debug!(
                    "Conflict {} ({:.2}) vs {} ({:.2}) resolved for {}: {}",
                    a.layer, a.confidence, b.layer, b.confidence, resolution.winning_layer, resolution.reason
                );
                conflicts.push(ConflictRecord {
                    layer_a: a.layer,
                    score_a: a.confidence,
                    layer_b: b.layer,
                    score_b: b.confidence,
                    gap,
                    subject: None,
                    winning_layer: Some(resolution.winning_layer),
                    resolution: Some(resolution.reason),
                });
            }
        }

        Gathered {
            results,
            reasoning,
            conflicts,
            warnings: Vec::new(),
        }
    }

    fn assemble(
        &self,
        query_type: QueryType,
        strategy: Strategy,
        gathered: Gathered,
        started: Instant,
    ) -> Result<RoutedResult, RouterError> {
        let Gathered {
            results,
            reasoning,
            conflicts,
            warnings: strategy_warnings,
        } = gathered;

        let by_layer: BTreeMap<Layer, Confidence> = results
            .iter()
            .map(|r| (r.layer, Confidence::heuristic(r.confidence)))
            .collect();
        let final_confidence = if by_layer.is_empty() {
            reasoning.confidence.unwrap_or(self.config.fallback_confidence)
        } else {
            self.propagator.propagate_cross_layer(&by_layer)?.score()
        };
        let review = self.propagator.needs_human_review(&by_layer);

        {
            let mut stats = self.lock_stats();
            stats.layer_errors += results.iter().filter(|r| r.error.is_some()).count() as u64;
            stats.conflicts += conflicts.len() as u64;
            if reasoning.fell_back {
                stats.reasoning_fallbacks += 1;
            }
        }

        let (entities, relationships) = merge_layer_results(&results);
        let mut warnings = reasoning.warnings;
        warnings.extend(strategy_warnings);

        let trace = QueryTrace {
            query_id: Uuid::now_v7(),
            query_type,
            strategy,
            layers_traversed: results.iter().map(|r| r.layer).collect(),
            layer_results: results,
            conflicts_detected: conflicts,
            reasoning: reasoning.notes,
            reasoning_confidence: reasoning.confidence,
            final_confidence,
            needs_review: review.required,
            review_reason: review.reason,
            cache_hit: false,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        Ok(RoutedResult {
            entities,
            relationships,
            inferences: reasoning.inferences,
            warnings,
            trace,
        })
    }
}
