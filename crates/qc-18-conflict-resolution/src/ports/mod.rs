//! Ports module for Conflict Resolution
//!
//! Outbound (driven) ports only: the engine is a library invoked by the
//! block-production pipeline, which supplies storage and contract execution.

pub mod executor;
pub mod storage;

pub use executor::ContractExecutor;
pub use storage::KeyValueStore;
