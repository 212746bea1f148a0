//! Background worker driving both monitors from the event bus

use crate::{DemotionMonitor, DemotionReport, EventBus, MonitorConfig, MonitorError, PromotionMonitor};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use strata_domain::traits::{EntityStore, EventPublisher, FeedbackStore};
use strata_domain::{DomainEvent, EntityId};
use strata_transition::LayerTransitionEngine;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Single coordinator for promotion and demotion
///
/// Every event is handled on this one task, so promotion and demotion of
/// the same entity can never interleave. Entities that received feedback
/// are remembered and re-evaluated for demotion on every sweep tick, until
/// they are demoted or have nothing left to demote for. Each sweep also
/// drops query trackers that fell outside the promotion window.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use strata_monitor::{EventBus, MonitorConfig, MonitorWorker};
/// use strata_store::{MemoryFeedbackStore, MemoryStore};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = MonitorConfig::default();
///     let bus = EventBus::new(config.event_capacity);
///     let mut worker = MonitorWorker::from_config(
///         &config,
///         Arc::new(MemoryStore::new()),
///         Arc::new(MemoryFeedbackStore::new()),
///         &bus,
///     )?;
///
///     let shutdown = CancellationToken::new();
///     worker.run(bus.subscribe(), shutdown.clone()).await?;
///     Ok(())
/// }
/// ```
pub struct MonitorWorker {
    promotion: Arc<PromotionMonitor>,
    demotion: Arc<DemotionMonitor>,
    interval: Duration,
    watched: BTreeSet<EntityId>,
}

impl MonitorWorker {
    /// Create a worker around existing monitors
    pub fn new(promotion: Arc<PromotionMonitor>, demotion: Arc<DemotionMonitor>, sweep_interval: Duration) -> Self {
        Self {
            promotion,
            demotion,
            interval: sweep_interval.max(Duration::from_millis(1)),
            watched: BTreeSet::new(),
        }
    }

    /// Build the transition engine and both monitors from configuration
    ///
    /// Both monitors publish their events on `bus`.
    pub fn from_config(
        config: &MonitorConfig,
        store: Arc<dyn EntityStore>,
        feedback: Arc<dyn FeedbackStore>,
        bus: &EventBus,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let publisher: Arc<dyn EventPublisher> = Arc::new(bus.clone());
        let engine = Arc::new(LayerTransitionEngine::new(
            Arc::clone(&store),
            config.transition.clone(),
        ));
        let promotion = Arc::new(PromotionMonitor::new(
            Arc::clone(&store),
            engine,
            Arc::clone(&publisher),
            config.promotion.clone(),
        ));
        let demotion = Arc::new(DemotionMonitor::new(
            store,
            feedback,
            publisher,
            config.demotion.clone(),
            config.transition.store_timeout(),
        ));
        Ok(Self::new(promotion, demotion, config.sweep_interval()))
    }

    /// Promotion monitor
    pub fn promotion(&self) -> &Arc<PromotionMonitor> {
        &self.promotion
    }

    /// Demotion monitor
    pub fn demotion(&self) -> &Arc<DemotionMonitor> {
        &self.demotion
    }

    /// Entities waiting for their next demotion check
    pub fn watched(&self) -> impl Iterator<Item = &EntityId> {
        self.watched.iter()
    }

    /// Handle one event
    pub async fn process(&mut self, event: &DomainEvent) {
        match event {
            DomainEvent::FeedbackSubmitted { entity_id, .. } => {
                if !self.demotion.config().auto_demote {
                    return;
                }
                self.watched.insert(entity_id.clone());
                let report = self.demotion.evaluate(std::slice::from_ref(entity_id)).await;
                self.forget_resolved(&report);
            }
            other => {
                if let Err(e) = self.promotion.handle_event(other).await {
                    tracing::error!("Promotion handling for {} failed: {}", other.entity_id(), e);
                }
            }
        }
    }

    /// Evict stale query trackers, then re-evaluate every watched entity
    /// for demotion
    pub async fn sweep(&mut self) -> DemotionReport {
        self.promotion.evict_stale_trackers(Utc::now()).await;
        if !self.demotion.config().auto_demote || self.watched.is_empty() {
            return DemotionReport::default();
        }
        let ids: Vec<EntityId> = self.watched.iter().cloned().collect();
        let report = self.demotion.evaluate(&ids).await;
        self.forget_resolved(&report);
        report
    }

    fn forget_resolved(&mut self, report: &DemotionReport) {
        for demotion in &report.demoted {
            self.watched.remove(&demotion.entity_id);
        }
        for id in &report.settled {
            self.watched.remove(id);
        }
    }

    /// Consume events until `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Worker`] if the event bus closes underneath
    /// the worker.
    pub async fn run(
        &mut self,
        mut events: broadcast::Receiver<DomainEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), MonitorError> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        tracing::info!("Monitor worker started (sweep interval: {:?})", self.interval);

        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, stopping monitor worker");
                    break Ok(());
                }
                received = events.recv() => match received {
                    Ok(event) => self.process(&event).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Monitor worker lagged, {} events dropped", missed);
                    }
                    Err(RecvError::Closed) => {
                        break Err(MonitorError::Worker("event bus closed".to_string()));
                    }
                },
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    tracing::debug!(
                        "Demotion sweep: {} evaluated, {} demoted, {} errors",
                        report.evaluated,
                        report.demoted.len(),
                        report.errors.len()
                    );
                }
            }
        };

        tracing::info!(
            "Monitor worker stopped. Final metrics:\n{}\n\n{}",
            self.promotion.stats().summary(),
            self.demotion.stats().summary()
        );
        result
    }
}
