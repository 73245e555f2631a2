//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits. Persistent backends are provided by the
//! storage subsystem; this crate ships the in-memory store.

mod memory_store;

pub use memory_store::InMemoryStore;
