//! Strata Storage Layer
//!
//! In-memory implementations of the collaborator traits from
//! `strata_domain::traits`. They back the test suites and embedded use; a
//! production deployment plugs its graph store in behind the same traits.
//!
//! # Examples
//!
//! ```
//! use strata_domain::{KnowledgeEntity, Layer};
//! use strata_store::MemoryStore;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let store = MemoryStore::new();
//! rt.block_on(store.insert(KnowledgeEntity::new("e1", "Aspirin", "drug", Layer::Perception, 0.6)));
//! assert_eq!(rt.block_on(store.len()), 1);
//! ```

#![warn(missing_docs)]

mod feedback;
mod fixtures;
mod memory;

pub use feedback::MemoryFeedbackStore;
pub use fixtures::load_fixture;
pub use memory::MemoryStore;
