//! Strata Monitor
//!
//! Background promotion and demotion of knowledge entities between layers.
//!
//! # Overview
//!
//! The monitor is responsible for:
//! - **Promotion**: moving entities up a layer when evidence accumulates
//! - **Demotion**: moving entities down a layer after negative feedback
//! - **Query tracking**: rolling per-entity query and cache-hit counters
//! - **Metrics collection**: running totals with printable summaries
//!
//! ## Layer Policy
//!
//! | Step | Trigger |
//! |------|---------|
//! | **Perception → Semantic** | confidence ≥ 0.85, or 3+ validations, or an ontology code |
//! | **Semantic → Reasoning** | confidence ≥ 0.90, or applied inference rules, or 5+ references |
//! | **Reasoning → Application** | 10+ queries in 24 h **and** cache hit rate ≥ 0.5 |
//! | **Demotion (any layer but Perception)** | 5+ feedback **and** 3+ negative |
//!
//! # Usage
//!
//! ## Background Worker
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_monitor::{EventBus, MonitorConfig, MonitorWorker};
//! use strata_store::{MemoryFeedbackStore, MemoryStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MonitorConfig::from_file("monitor.toml")?;
//!     let bus = EventBus::new(config.event_capacity);
//!     let mut worker = MonitorWorker::from_config(
//!         &config,
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryFeedbackStore::new()),
//!         &bus,
//!     )?;
//!
//!     let shutdown = CancellationToken::new();
//!     let events = bus.subscribe();
//!     worker.run(events, shutdown).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration Presets
//!
//! ```
//! use strata_monitor::MonitorConfig;
//!
//! let config = MonitorConfig::default();
//! let config = MonitorConfig::aggressive();
//! let config = MonitorConfig::lenient();
//! ```

#![warn(missing_docs)]

mod config;
mod demotion;
mod error;
mod event_bus;
mod metrics;
mod promotion;
mod tracker;
mod worker;

pub use config::{DemotionConfig, MonitorConfig, PromotionConfig, MAX_QUERY_WINDOW_HOURS};
pub use demotion::{penalised_confidence, Demotion, DemotionCheck, DemotionMonitor, DemotionReport};
pub use error::MonitorError;
pub use event_bus::EventBus;
pub use metrics::{DemotionMetrics, PromotionMetrics};
pub use promotion::{
    application_trigger, perception_trigger, semantic_trigger, PromotionMonitor, PromotionOutcome,
    PromotionTrigger, ScanReport, INFERENCE_RULE_KEYS, ONTOLOGY_KEYS,
};
pub use tracker::{Observation, QueryTracker, TrackerRegistry};
pub use worker::MonitorWorker;
