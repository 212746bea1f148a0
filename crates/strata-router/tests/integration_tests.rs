//! Integration tests for query routing

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strata_domain::traits::{
    EntityFilter, EntityStore, EventPublisher, Inference, IntentClassifier, PromotionReceipt,
    ReasoningEngine, ReasoningMode, ReasoningOutcome, ReasoningRequest,
};
use strata_domain::{
    Confidence, DomainEvent, EntityId, KnowledgeEntity, Layer, PropertyMap, Relationship, StoreError,
};
use strata_router::{
    QueryRequest, QueryRouter, QueryType, RouterConfig, RouterError, Strategy, NEURAL_CAUTION,
    REASONING_FALLBACK, SAFETY_DISCLAIMER,
};
use strata_store::MemoryStore;
use tokio_util::sync::CancellationToken;

/// Delegates to a [`MemoryStore`] and remembers which layers were queried
#[derive(Clone, Default)]
struct RecordingStore {
    inner: MemoryStore,
    queried: Arc<Mutex<Vec<Layer>>>,
}

impl RecordingStore {
    fn queried(&self) -> Vec<Layer> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntityStore for RecordingStore {
    async fn get_entity(&self, id: &EntityId) -> Result<Option<KnowledgeEntity>, StoreError> {
        self.inner.get_entity(id).await
    }

    async fn query_by_layer(
        &self,
        layer: Layer,
        filter: &EntityFilter,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntity>, StoreError> {
        self.queried.lock().unwrap().push(layer);
        self.inner.query_by_layer(layer, filter, limit).await
    }

    async fn list_relationships(&self, id: &EntityId) -> Result<Vec<Relationship>, StoreError> {
        self.inner.list_relationships(id).await
    }

    async fn update_entity_properties(&self, id: &EntityId, props: PropertyMap) -> Result<bool, StoreError> {
        self.inner.update_entity_properties(id, props).await
    }

    async fn promote_entity(
        &self,
        id: &EntityId,
        target: Layer,
        props: PropertyMap,
    ) -> Result<PromotionReceipt, StoreError> {
        self.inner.promote_entity(id, target, props).await
    }
}

/// Rule engine returning canned inferences and recording every call
#[derive(Default)]
struct ScriptedRules {
    inferences: Vec<Inference>,
    warnings: Vec<String>,
    fail: bool,
    calls: Mutex<Vec<(ReasoningMode, Vec<EntityId>)>>,
}

impl ScriptedRules {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn with_inference(mut self, statement: &str, score: f64, subjects: &[&str]) -> Self {
        self.inferences.push(Inference {
            statement: statement.to_string(),
            confidence: Confidence::neural(score),
            rule: None,
            subjects: subjects.iter().map(|s| EntityId::new(*s)).collect(),
        });
        self
    }

    fn modes(&self) -> Vec<ReasoningMode> {
        self.calls.lock().unwrap().iter().map(|(mode, _)| *mode).collect()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedRules {
    async fn apply_reasoning(
        &self,
        request: &ReasoningRequest,
        mode: ReasoningMode,
    ) -> Result<ReasoningOutcome, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push((mode, request.entities.iter().map(|e| e.id.clone()).collect()));
        if self.fail {
            return Err(StoreError::Unavailable("rule engine offline".to_string()));
        }
        Ok(ReasoningOutcome {
            inferences: self.inferences.clone(),
            warnings: self.warnings.clone(),
        })
    }
}

#[derive(Default)]
struct CollectingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl EventPublisher for CollectingPublisher {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct FixedClassifier(Result<QueryType, StoreError>);

#[async_trait]
impl IntentClassifier for FixedClassifier {
    async fn classify(&self, _text: &str) -> Result<QueryType, StoreError> {
        self.0.clone()
    }
}

async fn diabetes_store() -> RecordingStore {
    let store = RecordingStore::default();
    let entities = [
        KnowledgeEntity::new("p1", "diabetes mention in discharge note", "finding", Layer::Perception, 0.6),
        KnowledgeEntity::new("s1", "Diabetes mellitus", "disease", Layer::Semantic, 0.85),
        KnowledgeEntity::new("r1", "Diabetes mellitus type 2", "disease", Layer::Reasoning, 0.92),
        KnowledgeEntity::new("x1", "Asthma", "disease", Layer::Semantic, 0.9),
    ];
    for entity in entities {
        store.inner.insert(entity).await;
    }
    store
        .inner
        .add_relationship(Relationship::new("r1", "metformin", "treated_by", 0.9))
        .await;
    store
}

fn router(store: &RecordingStore, rules: Arc<ScriptedRules>) -> QueryRouter {
    QueryRouter::new(Arc::new(store.clone()), rules, RouterConfig::default()).unwrap()
}

#[tokio::test]
async fn test_disease_question_uses_all_layers_then_cache() {
    let store = diabetes_store().await;
    let rules = Arc::new(ScriptedRules::default());
    let router = router(&store, Arc::clone(&rules));

    let first = router.route(QueryRequest::new("What is Diabetes?")).await.unwrap();
    assert_eq!(first.trace.query_type, QueryType::DiseaseInformation);
    assert_eq!(first.trace.strategy, Strategy::Collaborative);
    assert_eq!(
        first.trace.layers_traversed,
        vec![Layer::Reasoning, Layer::Semantic, Layer::Perception]
    );
    assert_eq!(first.entity_ids(), vec!["r1", "s1", "p1"]);
    assert_eq!(first.relationships.len(), 1);
    assert!(!first.trace.cache_hit);
    assert_eq!(rules.modes(), vec![ReasoningMode::Hybrid]);

    let second = router.route(QueryRequest::new("  what is   DIABETES? ")).await.unwrap();
    assert!(second.trace.cache_hit);
    assert!(second.trace.layer_results.iter().all(|r| r.cache_hit));
    assert_ne!(second.trace.query_id, first.trace.query_id);
    assert_eq!(second.entity_ids(), first.entity_ids());
    assert_eq!(rules.modes().len(), 1);

    let stats = router.stats();
    assert_eq!(stats.total_queries, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.by_strategy.get(&Strategy::Collaborative), Some(&2));
}

#[tokio::test]
async fn test_drug_interaction_never_touches_perception_or_cache() {
    let store = diabetes_store().await;
    store
        .inner
        .insert(KnowledgeEntity::new("p2", "warfarin aspirin bleeding report", "finding", Layer::Perception, 0.7))
        .await;
    let rules = Arc::new(ScriptedRules::default());
    let router = router(&store, Arc::clone(&rules));

    let questions = [
        "Does warfarin interact with aspirin?",
        "Can I take ibuprofen with lisinopril, is there an interaction?",
        "Does warfarin interact with aspirin?",
        "Is it safe to take metformin with contrast dye? Should I avoid it?",
    ];
    for question in questions {
        let result = router.route(QueryRequest::new(question)).await.unwrap();
        assert_eq!(result.trace.strategy, Strategy::SymbolicOnly, "{}", question);
        assert!(!result.trace.cache_hit);
        assert!(!result.trace.layers_traversed.contains(&Layer::Perception));
        assert_eq!(result.warnings.last().map(String::as_str), Some(SAFETY_DISCLAIMER));
    }

    assert!(!store.queried().contains(&Layer::Perception));
    assert!(rules.modes().iter().all(|m| *m == ReasoningMode::Symbolic));
    let cache = router.cache_stats().await;
    assert_eq!(cache.entries, 0);
    assert_eq!(cache.hits + cache.misses, 0);
}

#[tokio::test]
async fn test_forced_strategy_overrides_mapping() {
    let store = diabetes_store().await;
    let router = router(&store, Arc::new(ScriptedRules::default()));

    let result = router
        .route(QueryRequest::new("What is Diabetes?").with_strategy(Strategy::SymbolicOnly))
        .await
        .unwrap();
    assert_eq!(result.trace.query_type, QueryType::DiseaseInformation);
    assert_eq!(result.trace.strategy, Strategy::SymbolicOnly);
    assert_eq!(result.trace.layers_traversed, vec![Layer::Semantic, Layer::Reasoning]);
}

#[tokio::test]
async fn test_failed_layer_degrades_to_empty() {
    let store = diabetes_store().await;
    store.inner.fail_layer(Layer::Semantic).await;
    let router = router(&store, Arc::new(ScriptedRules::default()));

    let result = router.route(QueryRequest::new("What is Diabetes?")).await.unwrap();
    let semantic = &result.trace.layer_results[1];
    assert_eq!(semantic.layer, Layer::Semantic);
    assert!(semantic.entities.is_empty());
    assert!(semantic.error.as_deref().unwrap_or_default().contains("offline"));
    assert_eq!(result.entity_ids(), vec!["r1", "p1"]);
    assert_eq!(router.stats().layer_errors, 1);

    // Degraded answers are not cached
    let again = router.route(QueryRequest::new("What is Diabetes?")).await.unwrap();
    assert!(!again.trace.cache_hit);
}

#[tokio::test]
async fn test_layer_timeout_is_non_fatal() {
    let store = diabetes_store().await;
    store.inner.set_latency(Some(Duration::from_millis(300))).await;
    let config = RouterConfig {
        layer_timeout_ms: 20,
        ..RouterConfig::default()
    };
    let router = QueryRouter::new(Arc::new(store.clone()), Arc::new(ScriptedRules::default()), config).unwrap();

    let result = router.route(QueryRequest::new("What is Diabetes?")).await.unwrap();
    assert!(result.entities.is_empty());
    assert_eq!(result.trace.layer_results.len(), 3);
    assert!(result
        .trace
        .layer_results
        .iter()
        .all(|r| r.error.as_deref().unwrap_or_default().contains("timed out")));
    assert!(result.trace.final_confidence > 0.0);
}

#[tokio::test]
async fn test_reasoning_failure_falls_back() {
    let store = diabetes_store().await;
    let router = router(&store, Arc::new(ScriptedRules::failing()));

    let result = router.route(QueryRequest::new("What is Diabetes?")).await.unwrap();
    assert!(result.trace.reasoning.iter().any(|note| note == REASONING_FALLBACK));
    assert_eq!(result.trace.reasoning_confidence, Some(0.7));
    assert!(result.inferences.is_empty());
    assert_eq!(result.entities.len(), 3);
    assert_eq!(router.stats().reasoning_fallbacks, 1);
}

#[tokio::test]
async fn test_symbolic_first_stops_early() {
    let store = RecordingStore::default();
    for i in 0..5 {
        store
            .inner
            .insert(KnowledgeEntity::new(
                format!("s{}", i),
                format!("admissions table {}", i),
                "dataset",
                Layer::Semantic,
                0.8,
            ))
            .await;
    }
    store
        .inner
        .insert(KnowledgeEntity::new("r1", "admissions summary", "dataset", Layer::Reasoning, 0.9))
        .await;
    let router = router(&store, Arc::new(ScriptedRules::default()));

    let result = router
        .route(QueryRequest::new("admissions").with_strategy(Strategy::SymbolicFirst))
        .await
        .unwrap();
    assert_eq!(result.trace.layers_traversed, vec![Layer::Semantic]);
    assert_eq!(result.entities.len(), 5);
    assert_eq!(store.queried(), vec![Layer::Semantic]);

    // Single layer: 1.0 * 0.8 for the layer, then weighted again when merged
    assert!((result.trace.layer_results[0].confidence - 0.8).abs() < 1e-9);
    assert!((result.trace.final_confidence - 0.64).abs() < 1e-9);
}

#[tokio::test]
async fn test_symbolic_first_descends_when_sparse() {
    let store = RecordingStore::default();
    store
        .inner
        .insert(KnowledgeEntity::new("s1", "admissions table", "dataset", Layer::Semantic, 0.8))
        .await;
    store
        .inner
        .insert(KnowledgeEntity::new("p1", "admissions csv", "file", Layer::Perception, 0.5))
        .await;
    let router = router(&store, Arc::new(ScriptedRules::default()));

    let result = router
        .route(QueryRequest::new("Which dataset holds admissions?"))
        .await
        .unwrap();
    assert_eq!(result.trace.query_type, QueryType::DataCatalog);
    assert_eq!(
        result.trace.layers_traversed,
        vec![Layer::Semantic, Layer::Reasoning, Layer::Perception]
    );
    assert_eq!(result.entity_ids(), vec!["s1", "p1"]);
}

#[tokio::test]
async fn test_neural_first_flags_disagreement() {
    let store = RecordingStore::default();
    store
        .inner
        .insert(KnowledgeEntity::new("p1", "fever and rash cluster", "finding", Layer::Perception, 0.6))
        .await;
    store
        .inner
        .insert(KnowledgeEntity::new("s1", "Fever", "symptom", Layer::Semantic, 0.95))
        .await;
    let rules = Arc::new(ScriptedRules::default().with_inference("fever suggests measles", 0.4, &["s1"]));
    let router = router(&store, Arc::clone(&rules));

    let result = router
        .route(QueryRequest::new("I have a fever and a rash"))
        .await
        .unwrap();
    assert_eq!(result.trace.strategy, Strategy::NeuralFirst);
    assert_eq!(result.trace.layers_traversed, vec![Layer::Perception, Layer::Semantic]);
    assert_eq!(result.trace.conflicts_detected.len(), 1);
    let conflict = &result.trace.conflicts_detected[0];
    assert!((conflict.gap - 0.55).abs() < 1e-9);
    assert!(result.warnings.iter().any(|w| w == NEURAL_CAUTION));

    // Neural reasoning only sees perception entities
    let calls = rules.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, ReasoningMode::Neural);
    assert_eq!(calls[0].1, vec![EntityId::new("p1")]);
}

#[tokio::test]
async fn test_neural_first_reruns_neural_reasoning_every_time() {
    let store = RecordingStore::default();
    store
        .inner
        .insert(KnowledgeEntity::new("p1", "fever and rash cluster", "finding", Layer::Perception, 0.6))
        .await;
    let rules = Arc::new(ScriptedRules::default().with_inference("possible viral exanthem", 0.6, &["p1"]));
    let router = router(&store, Arc::clone(&rules));

    for _ in 0..2 {
        let result = router
            .route(QueryRequest::new("I have a fever and a rash"))
            .await
            .unwrap();
        assert_eq!(result.trace.strategy, Strategy::NeuralFirst);
        assert!(!result.trace.cache_hit);
        assert_eq!(result.trace.layers_traversed, vec![Layer::Perception, Layer::Semantic]);
    }

    assert_eq!(rules.modes(), vec![ReasoningMode::Neural, ReasoningMode::Neural]);
    let cache = router.cache_stats().await;
    assert_eq!(cache.entries, 0);
    assert_eq!(cache.hits + cache.misses, 0);
    assert_eq!(router.stats().cache_hits, 0);
}

#[tokio::test]
async fn test_neural_first_agreement_has_no_caution() {
    let store = RecordingStore::default();
    store
        .inner
        .insert(KnowledgeEntity::new("s1", "Fever", "symptom", Layer::Semantic, 0.8))
        .await;
    let rules = Arc::new(ScriptedRules::default().with_inference("fever is common", 0.7, &[]));
    let router = router(&store, rules);

    let result = router.route(QueryRequest::new("I have a fever")).await.unwrap();
    assert!(result.trace.conflicts_detected.is_empty());
    assert!(!result.warnings.iter().any(|w| w == NEURAL_CAUTION));
}

#[tokio::test]
async fn test_collaborative_resolves_layer_conflicts() {
    let store = RecordingStore::default();
    for i in 0..5 {
        store
            .inner
            .insert(KnowledgeEntity::new(
                format!("r{}", i),
                format!("hypertension rule {}", i),
                "guideline",
                Layer::Reasoning,
                0.9,
            ))
            .await;
    }
    let router = router(&store, Arc::new(ScriptedRules::default()));

    let result = router
        .route(QueryRequest::new("How do you treat hypertension?"))
        .await
        .unwrap();
    assert_eq!(result.trace.query_type, QueryType::TreatmentRecommendation);

    // REASONING 1.0 * 0.9 = 0.9 against empty SEMANTIC 0.4 and PERCEPTION 0.3;
    // SEMANTIC and PERCEPTION are within the threshold of each other
    let conflicts = &result.trace.conflicts_detected;
    assert_eq!(conflicts.len(), 2);
    assert_eq!(
        conflicts.iter().map(|c| (c.layer_a, c.layer_b)).collect::<Vec<_>>(),
        vec![(Layer::Reasoning, Layer::Semantic), (Layer::Reasoning, Layer::Perception)]
    );
    for conflict in conflicts {
        assert_eq!(conflict.winning_layer, Some(Layer::Reasoning));
        assert_eq!(conflict.resolution.as_deref(), Some("confidence gap"));
    }
    assert!(result.trace.needs_review);
    assert_eq!(router.stats().conflicts, 2);
}

#[tokio::test]
async fn test_cancellation_aborts_query() {
    let store = diabetes_store().await;
    store.inner.set_latency(Some(Duration::from_secs(5))).await;
    let router = Arc::new(router(&store, Arc::new(ScriptedRules::default())));

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let started = Instant::now();
    let result = router
        .route_with_cancel(QueryRequest::new("What is Diabetes?"), cancel)
        .await;
    assert!(matches!(result, Err(RouterError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(router.stats().cancelled, 1);
    assert_eq!(router.cache_stats().await.entries, 0);
}

#[tokio::test]
async fn test_classifier_and_fallback() {
    let store = diabetes_store().await;

    let router = router(&store, Arc::new(ScriptedRules::default())).with_classifier(Arc::new(FixedClassifier(
        Ok(QueryType::DrugInteraction),
    )));
    assert_eq!(router.classify("What is Diabetes?").await, QueryType::DrugInteraction);

    let router = router_with_failing_classifier(&store);
    assert_eq!(router.classify("What is Diabetes?").await, QueryType::DiseaseInformation);
}

fn router_with_failing_classifier(store: &RecordingStore) -> QueryRouter {
    router(store, Arc::new(ScriptedRules::default())).with_classifier(Arc::new(FixedClassifier(Err(
        StoreError::Unavailable("classifier down".to_string()),
    ))))
}

#[tokio::test]
async fn test_served_entities_are_published() {
    let store = diabetes_store().await;
    let publisher = Arc::new(CollectingPublisher::default());
    let router = router(&store, Arc::new(ScriptedRules::default())).with_publisher(publisher.clone());

    router.route(QueryRequest::new("What is Diabetes?")).await.unwrap();
    router.route(QueryRequest::new("What is Diabetes?")).await.unwrap();

    let events = publisher.events.lock().unwrap();
    assert_eq!(events.len(), 6);
    let hits: Vec<bool> = events
        .iter()
        .map(|e| match e {
            DomainEvent::QueryExecuted { cache_hit, .. } => *cache_hit,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(hits, vec![false, false, false, true, true, true]);
    assert_eq!(events[0].entity_id().as_str(), "r1");
}

#[tokio::test]
async fn test_cache_maintenance() {
    let store = diabetes_store().await;
    let router = router(&store, Arc::new(ScriptedRules::default()));

    router.route(QueryRequest::new("What is Diabetes?")).await.unwrap();
    assert_eq!(router.cache_stats().await.entries, 1);
    assert_eq!(router.purge_expired().await, 0);

    router.clear_cache().await;
    let result = router.route(QueryRequest::new("What is Diabetes?")).await.unwrap();
    assert!(!result.trace.cache_hit);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = RouterConfig {
        cache_capacity: 0,
        ..RouterConfig::default()
    };
    let result = QueryRouter::new(
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptedRules::default()),
        config,
    );
    assert!(matches!(result, Err(RouterError::Config(_))));
}
