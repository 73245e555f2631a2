//! # QC-18: Conflict Resolution Subsystem
//!
//! Reconciles speculatively executed contracts of one sub-block so that every
//! node converges on the state a strictly sequential execution would produce.
//!
//! ## Architecture
//!
//! - **Domain**: `ConflictRecord`, `LayeredCache`, value objects, invariants
//! - **Algorithms**: dependency closure (worklist), canonical state rendering
//! - **Ports**: Outbound `KeyValueStore` (ledger / common store) and
//!   `ContractExecutor` (sandboxed interpreter)
//! - **Adapters**: `InMemoryStore`
//! - **Application**: `ConflictResolutionContext` state machine,
//!   `ContextPool`, merge to master
//!
//! ## Flow
//!
//! ```text
//! [Block Production (17)] ──run contracts──→ [Context slot N]
//!                                                  │
//!                            detect_conflicts ─→ rerun list (ascending)
//!                                                  │
//!                            replay + footprint verification
//!                                                  │
//!                            merge_to_common ─→ [CommonStore]
//!                                                  │
//!                     (block end) merge_to_master ─→ [Ledger]
//! ```

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::InMemoryStore;
pub use algorithms::{render_state, DependencyClosure, DependencyResolver};
pub use application::{merge_to_master, ConflictResolutionContext, ContextPool, Phase};
pub use config::ConflictResolutionConfig;
pub use domain::*;
pub use ports::{ContractExecutor, KeyValueStore};
