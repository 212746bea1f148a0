//! Integration tests for promotion, demotion and the worker loop

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use strata_domain::traits::{EventPublisher, FeedbackCounts, FeedbackStore};
use strata_domain::{DomainEvent, EntityId, KnowledgeEntity, Layer, Relationship, StoreError};
use strata_monitor::{
    DemotionMonitor, EventBus, MonitorConfig, MonitorWorker, PromotionMonitor, PromotionOutcome, QueryTracker,
};
use strata_store::{MemoryFeedbackStore, MemoryStore};
use strata_transition::LayerTransitionEngine;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

struct Harness {
    store: MemoryStore,
    feedback: MemoryFeedbackStore,
    events: broadcast::Receiver<DomainEvent>,
    promotion: PromotionMonitor,
    demotion: DemotionMonitor,
}

/// Helper to wire both monitors over fresh in-memory stores
fn harness(config: MonitorConfig) -> Harness {
    let store = MemoryStore::new();
    let feedback = MemoryFeedbackStore::new();
    let bus = EventBus::new(64);
    let events = bus.subscribe();
    let publisher: Arc<dyn EventPublisher> = Arc::new(bus);
    let engine = Arc::new(LayerTransitionEngine::new(
        Arc::new(store.clone()),
        config.transition.clone(),
    ));
    let promotion = PromotionMonitor::new(
        Arc::new(store.clone()),
        engine,
        Arc::clone(&publisher),
        config.promotion.clone(),
    );
    let demotion = DemotionMonitor::new(
        Arc::new(store.clone()),
        Arc::new(feedback.clone()),
        publisher,
        config.demotion.clone(),
        config.transition.store_timeout(),
    );
    Harness {
        store,
        feedback,
        events,
        promotion,
        demotion,
    }
}

fn query(id: &str, cache_hit: bool) -> DomainEvent {
    DomainEvent::QueryExecuted {
        entity_id: EntityId::new(id),
        cache_hit,
        at: Utc::now(),
    }
}

fn tracker(queries: u64, hits: u64, misses: u64) -> QueryTracker {
    let mut tracker = QueryTracker::new(Utc::now() - ChronoDuration::hours(1));
    tracker.query_count = queries;
    tracker.cache_hits = hits;
    tracker.cache_misses = misses;
    tracker
}

#[tokio::test]
async fn test_confident_perception_entity_promotes_to_semantic() {
    let mut h = harness(MonitorConfig::default());
    let entity = KnowledgeEntity::new("e1", "Aspirin", "drug", Layer::Perception, 0.86).with_property("source", "doc:9");
    h.store.insert(entity.clone()).await;

    let outcome = h
        .promotion
        .handle_event(&DomainEvent::EntityCreated { entity })
        .await
        .unwrap();
    assert!(matches!(outcome, Some(PromotionOutcome::Promoted(_))));

    let stored = h.store.snapshot(&"e1".into()).await.unwrap();
    assert_eq!(stored.layer, Layer::Semantic);
    assert_eq!(stored.text("domain"), Some("general"));
    assert_eq!(stored.properties["validated"], serde_json::json!(true));
    assert_eq!(stored.text("promoted_from"), Some("PERCEPTION"));

    match h.events.recv().await.unwrap() {
        DomainEvent::LayerTransitionCompleted {
            entity_id,
            from_layer,
            to_layer,
            ..
        } => {
            assert_eq!(entity_id, EntityId::new("e1"));
            assert_eq!(from_layer, Layer::Perception);
            assert_eq!(to_layer, Layer::Semantic);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let stats = h.promotion.stats();
    assert_eq!(stats.attempted, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.by_pair[&(Layer::Perception, Layer::Semantic)], 1);
}

#[tokio::test]
async fn test_weak_perception_entity_stays() {
    let h = harness(MonitorConfig::default());
    let entity = KnowledgeEntity::new("e1", "Aspirin", "drug", Layer::Perception, 0.80)
        .with_property("validation_count", 2);
    h.store.insert(entity.clone()).await;

    let outcome = h
        .promotion
        .handle_event(&DomainEvent::EntityUpdated { entity })
        .await
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(h.store.snapshot(&"e1".into()).await.unwrap().layer, Layer::Perception);
    assert_eq!(h.promotion.stats().not_eligible, 1);
}

#[tokio::test]
async fn test_semantic_promotion_counts_store_references() {
    let h = harness(MonitorConfig::default());
    let entity = KnowledgeEntity::new("e1", "Metformin", "drug", Layer::Semantic, 0.5).with_property("domain", "endocrinology");
    h.store.insert(entity.clone()).await;
    for i in 0..5 {
        h.store
            .add_relationship(Relationship::new("e1", format!("t{}", i), "treats", 0.8))
            .await;
    }

    let outcome = h
        .promotion
        .handle_event(&DomainEvent::EntityUpdated { entity })
        .await
        .unwrap();
    assert!(matches!(outcome, Some(PromotionOutcome::Promoted(_))));

    let stored = h.store.snapshot(&"e1".into()).await.unwrap();
    assert_eq!(stored.layer, Layer::Reasoning);
    assert_eq!(stored.confidence, 0.5);
    assert!(stored.text("reasoning").unwrap().contains("reference_count 5"));
}

#[tokio::test]
async fn test_reasoning_needs_cache_hit_rate() {
    let h = harness(MonitorConfig::default());
    for id in ["cold", "warm"] {
        h.store
            .insert(KnowledgeEntity::new(id, id, "guideline", Layer::Reasoning, 0.9))
            .await;
    }
    // After one more miss: 12 queries at 0.40
    h.promotion.trackers().restore("cold".into(), tracker(11, 4, 5)).await;
    // After one more hit: 12 queries at 0.64
    h.promotion.trackers().restore("warm".into(), tracker(11, 6, 4)).await;

    let cold = h.promotion.handle_event(&query("cold", false)).await.unwrap();
    assert!(cold.is_none());
    assert_eq!(h.store.snapshot(&"cold".into()).await.unwrap().layer, Layer::Reasoning);

    let warm = h.promotion.handle_event(&query("warm", true)).await.unwrap();
    assert!(matches!(warm, Some(PromotionOutcome::Promoted(_))));
    let stored = h.store.snapshot(&"warm".into()).await.unwrap();
    assert_eq!(stored.layer, Layer::Application);
    assert_eq!(stored.text("usage_context"), Some("general"));
    assert!(stored.text("access_pattern").unwrap().starts_with("12 queries"));
    assert!(h.promotion.trackers().get(&"warm".into()).await.is_none());
}

#[tokio::test]
async fn test_expired_window_resets_and_blocks() {
    let h = harness(MonitorConfig::default());
    h.store
        .insert(KnowledgeEntity::new("e1", "e1", "guideline", Layer::Reasoning, 0.9))
        .await;
    let mut stale = tracker(40, 40, 0);
    stale.first_query_at = Utc::now() - ChronoDuration::hours(30);
    h.promotion.trackers().restore("e1".into(), stale).await;

    let outcome = h.promotion.handle_event(&query("e1", true)).await.unwrap();
    assert!(outcome.is_none());

    let tracker = h.promotion.trackers().get(&"e1".into()).await.unwrap();
    assert_eq!(tracker.query_count, 1);
    assert_eq!(tracker.cache_hits, 0);
    assert_eq!(tracker.cache_misses, 0);
}

#[tokio::test]
async fn test_dry_run_leaves_store_alone() {
    let mut config = MonitorConfig::default();
    config.promotion.dry_run = true;
    let h = harness(config);
    let entity = KnowledgeEntity::new("e1", "Aspirin", "drug", Layer::Perception, 0.95);
    h.store.insert(entity.clone()).await;

    let outcome = h
        .promotion
        .handle_event(&DomainEvent::EntityCreated { entity })
        .await
        .unwrap();
    assert!(matches!(outcome, Some(PromotionOutcome::DryRun(_))));
    assert_eq!(h.store.snapshot(&"e1".into()).await.unwrap().layer, Layer::Perception);
}

#[tokio::test]
async fn test_approval_required_parks_promotion() {
    let mut config = MonitorConfig::default();
    config.transition.require_approval = true;
    let h = harness(config);
    let entity = KnowledgeEntity::new("e1", "Aspirin", "drug", Layer::Perception, 0.95);
    h.store.insert(entity.clone()).await;

    let outcome = h
        .promotion
        .handle_event(&DomainEvent::EntityCreated { entity })
        .await
        .unwrap();
    assert!(matches!(outcome, Some(PromotionOutcome::AwaitingApproval(_))));
    assert_eq!(h.store.snapshot(&"e1".into()).await.unwrap().layer, Layer::Perception);
}

#[tokio::test]
async fn test_scan_all_moves_each_entity_once() {
    let h = harness(MonitorConfig::default());
    h.store
        .insert(KnowledgeEntity::new("p1", "Aspirin", "drug", Layer::Perception, 0.9))
        .await;
    h.store
        .insert(KnowledgeEntity::new("p2", "Noise", "drug", Layer::Perception, 0.2))
        .await;
    h.store
        .insert(
            KnowledgeEntity::new("s1", "Metformin", "drug", Layer::Semantic, 0.95).with_property("domain", "endocrinology"),
        )
        .await;

    let report = h.promotion.scan_all(50).await.unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.eligible, 2);
    assert_eq!(report.promoted, 2);
    assert_eq!(report.errors, 0);

    assert_eq!(h.store.snapshot(&"p1".into()).await.unwrap().layer, Layer::Semantic);
    assert_eq!(h.store.snapshot(&"p2".into()).await.unwrap().layer, Layer::Perception);
    assert_eq!(h.store.snapshot(&"s1".into()).await.unwrap().layer, Layer::Reasoning);
}

#[tokio::test]
async fn test_application_entity_demotes_on_negative_feedback() {
    let mut h = harness(MonitorConfig::default());
    h.store
        .insert(KnowledgeEntity::new("e1", "Aspirin", "drug", Layer::Application, 0.9))
        .await;
    h.feedback.set("e1", 6, 4).await;

    let report = h.demotion.evaluate(&["e1".into()]).await;
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.demoted.len(), 1);

    let demotion = &report.demoted[0];
    assert_eq!(demotion.to_layer, Layer::Reasoning);
    assert!((demotion.previous_confidence - demotion.new_confidence - 0.2).abs() < 1e-9);

    let stored = h.store.snapshot(&"e1".into()).await.unwrap();
    assert_eq!(stored.layer, Layer::Reasoning);
    assert!((stored.confidence - 0.7).abs() < 1e-9);
    assert_eq!(stored.text("previous_layer"), Some("APPLICATION"));
    assert!(stored.text("demoted_at").is_some());

    let counts = h.feedback.get_feedback(&"e1".into()).await.unwrap();
    assert_eq!(counts.negative_feedback_count, 0);
    assert_eq!(counts.feedback_count, 6);

    match h.events.recv().await.unwrap() {
        DomainEvent::EntityDemoted {
            from_layer,
            to_layer,
            negative_feedback_count,
            ..
        } => {
            assert_eq!(from_layer, Layer::Application);
            assert_eq!(to_layer, Layer::Reasoning);
            assert_eq!(negative_feedback_count, 4);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_demotion_floor_and_skips() {
    let h = harness(MonitorConfig::default());
    h.store
        .insert(KnowledgeEntity::new("low", "Low", "drug", Layer::Semantic, 0.15))
        .await;
    h.store
        .insert(KnowledgeEntity::new("bottom", "Bottom", "drug", Layer::Perception, 0.5))
        .await;
    h.store
        .insert(KnowledgeEntity::new("quiet", "Quiet", "drug", Layer::Application, 0.9))
        .await;
    h.feedback.set("low", 5, 3).await;
    h.feedback.set("bottom", 10, 10).await;
    h.feedback.set("quiet", 4, 4).await;
    h.feedback.set("ghost", 9, 9).await;

    let ids: Vec<EntityId> = ["low", "bottom", "quiet", "ghost"].into_iter().map(EntityId::from).collect();
    let report = h.demotion.evaluate(&ids).await;

    assert_eq!(report.evaluated, 4);
    assert_eq!(report.demoted.len(), 1);
    assert_eq!(report.demoted[0].new_confidence, 0.1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, EntityId::new("ghost"));

    let stats = h.demotion.stats();
    assert_eq!(stats.total_demoted(), 1);
    assert_eq!(stats.errors, 1);
    assert!(stats.summary().contains("SEMANTIC: 1"));
}

/// Feedback store that cannot clear negative feedback
struct StuckFeedback(MemoryFeedbackStore);

#[async_trait]
impl FeedbackStore for StuckFeedback {
    async fn get_feedback(&self, id: &EntityId) -> Result<FeedbackCounts, StoreError> {
        self.0.get_feedback(id).await
    }

    async fn record_feedback(&self, id: &EntityId, positive: bool) -> Result<FeedbackCounts, StoreError> {
        self.0.record_feedback(id, positive).await
    }

    async fn reset_negative_feedback(&self, _id: &EntityId) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("feedback store is read-only".to_string()))
    }
}

#[tokio::test]
async fn test_failed_feedback_reset_rolls_back_demotion() {
    let store = MemoryStore::new();
    store
        .insert(KnowledgeEntity::new("e1", "Aspirin", "drug", Layer::Application, 0.9).with_property("source", "doc:9"))
        .await;
    let feedback = MemoryFeedbackStore::new();
    feedback.set("e1", 6, 4).await;

    let config = MonitorConfig::default();
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let demotion = DemotionMonitor::new(
        Arc::new(store.clone()),
        Arc::new(StuckFeedback(feedback.clone())),
        Arc::new(bus),
        config.demotion.clone(),
        config.transition.store_timeout(),
    );

    for _ in 0..2 {
        assert!(demotion.evaluate_entity(&"e1".into()).await.is_err());
        let stored = store.snapshot(&"e1".into()).await.unwrap();
        assert_eq!(stored.layer, Layer::Application);
        assert!((stored.confidence - 0.9).abs() < 1e-9);
        assert_eq!(stored.text("source"), Some("doc:9"));
        assert_eq!(stored.text("previous_layer"), None);
    }

    let counts = feedback.get_feedback(&"e1".into()).await.unwrap();
    assert_eq!(counts.negative_feedback_count, 4);
    assert_eq!(demotion.stats().total_demoted(), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_worker_promotes_from_bus_events() {
    let store = MemoryStore::new();
    let entity = KnowledgeEntity::new("e1", "Aspirin", "drug", Layer::Perception, 0.9).with_property("umls_cui", "C0004057");
    store.insert(entity.clone()).await;

    let mut config = MonitorConfig::default();
    config.transition.enable_versioning = true;
    let bus = EventBus::new(config.event_capacity);
    let mut worker = MonitorWorker::from_config(
        &config,
        Arc::new(store.clone()),
        Arc::new(MemoryFeedbackStore::new()),
        &bus,
    )
    .unwrap();

    let mut observer = bus.subscribe();
    let shutdown = CancellationToken::new();
    let events = bus.subscribe();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { worker.run(events, token).await });

    bus.publish(DomainEvent::EntityCreated { entity });

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let DomainEvent::LayerTransitionCompleted {
                resulting_entity_id, ..
            } = observer.recv().await.unwrap()
            {
                return resulting_entity_id;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(completed, EntityId::new("e1_v1"));
    assert_eq!(store.snapshot(&completed).await.unwrap().layer, Layer::Semantic);

    shutdown.cancel();
    assert!(handle.await.unwrap().is_ok());
}
