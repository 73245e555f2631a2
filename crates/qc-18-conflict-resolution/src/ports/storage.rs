//! Storage port
//!
//! Implemented once per backend and used for both the ledger (master store)
//! and the common store shared by all sub-blocks of a block.

use crate::domain::{Key, StoreError, Value};

/// Key-value store abstraction for ledger and common state.
pub trait KeyValueStore: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool, StoreError>;
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<Key>, StoreError>;
    /// Remove every key.
    fn flush(&self) -> Result<(), StoreError>;
}
