//! Strata Router
//!
//! Answers queries by visiting the knowledge layers a query type calls for,
//! merging what each layer returns and recording how the answer was built.
//!
//! # Overview
//!
//! | Query type | Strategy | Layers |
//! |------------|----------|--------|
//! | drug_interaction, contraindication | **SYMBOLIC_ONLY** | SEMANTIC, REASONING (never cached, always a disclaimer) |
//! | data_catalog | **SYMBOLIC_FIRST** | SEMANTIC → REASONING → PERCEPTION, stopping early |
//! | symptom_interpretation | **NEURAL_FIRST** | PERCEPTION with neural reasoning, validated by SEMANTIC (never cached) |
//! | treatment_recommendation, disease_information, general | **COLLABORATIVE** | REASONING, SEMANTIC, PERCEPTION |
//!
//! Each answer carries a [`QueryTrace`] with the layers visited, per-layer
//! confidence, conflicts and how they were resolved, and the merged
//! confidence.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_router::{init_tracing, QueryRequest, QueryRouter, RouterConfig};
//! # use strata_domain::traits::ReasoningEngine;
//! # fn rules() -> Arc<dyn ReasoningEngine> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_tracing();
//!     let config = RouterConfig::from_file("router.toml")?;
//!     let router = QueryRouter::new(Arc::new(strata_store::MemoryStore::new()), rules(), config)?;
//!
//!     let result = router.route(QueryRequest::new("How do you treat hypertension?")).await?;
//!     println!("{:.2} via {}", result.confidence(), result.trace.strategy);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod cache;
mod classify;
mod config;
mod error;
mod router;
mod strategy;
mod trace;

pub use cache::{cache_key, CacheKey, CacheStats, QueryCache};
pub use classify::{classify_heuristic, extract_terms, normalise};
pub use config::{ConfigError, RouterConfig};
pub use error::RouterError;
pub use router::{layer_confidence, QueryRequest, QueryRouter, RouterStatistics};
pub use strategy::Strategy;
pub use strata_domain::QueryType;
pub use trace::{
    merge_layer_results, ConflictRecord, LayerResult, QueryTrace, RoutedResult, NEURAL_CAUTION,
    REASONING_FALLBACK, SAFETY_DISCLAIMER,
};

use tracing_subscriber::EnvFilter;

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "strata=info";

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`
///
/// Falls back to [`DEFAULT_LOG_FILTER`]. Safe to call more than once; only
/// the first call installs a subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
