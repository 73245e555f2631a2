//! Error types for Conflict Resolution
//!
//! Everything except storage access and caller misuse is fatal for the
//! sub-block being reconciled: the pipeline must abandon the context and
//! `reset()` it. There is no retry inside this crate.

use thiserror::Error;

/// Result type alias for conflict resolution operations
pub type Result<T> = std::result::Result<T, CrError>;

/// All errors that can occur while reconciling a sub-block
#[derive(Debug, Error)]
pub enum CrError {
    /// Internal bookkeeping is inconsistent (programming defect)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// `merge_to_common` called a second time in one lifecycle
    #[error("Already merged to common; merge_to_common may only be called once")]
    AlreadyMerged,

    /// Merge attempted while replay work is still outstanding
    #[error("Replay not resolved: {pending} contract(s) still pending")]
    ReplayUnresolved { pending: usize },

    /// An excluded key leaked into the dependency closure
    #[error("Excluded key {key} found in rerun set")]
    ExcludedKeyInRerunSet { key: String },

    /// A replayed contract touched a different set of keys
    #[error("Replay divergence for contract {contract_idx}: expected {expected}, got {actual}")]
    ReplayDivergence {
        contract_idx: usize,
        expected: String,
        actual: String,
    },

    /// Merge-to-master found a key missing from the common store
    #[error("Key {key} must exist in common store to merge to master")]
    MissingFromCommon { key: String },

    /// Operation not allowed in the current lifecycle phase
    #[error("Operation {operation} not allowed in phase {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: &'static str,
    },

    /// Contract index outside the recorded contracts
    #[error("Contract index {index} out of bounds ({len} contracts)")]
    ContractIndexOutOfBounds { index: usize, len: usize },

    /// Sub-block representation requested before merge to common
    #[error("Sub-block representation requires merge to common first")]
    NotMerged,

    /// Context still holds per-run data after reset
    #[error("Context not reset: {0}")]
    NotReset(String),

    /// Stored value cannot be rendered in the textual state format
    #[error("Value for key {key} is not valid UTF-8")]
    NonUtf8Value { key: String },

    /// Contract executor failed outside of the contract's own status
    #[error("Execution error: {0}")]
    Execution(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No pooled context is available
    #[error("No conflict resolution context available in pool")]
    PoolExhausted,

    /// Storage collaborator failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl CrError {
    /// Whether the sub-block must be aborted.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CrError::InvalidConfig(_) | CrError::PoolExhausted | CrError::Storage(_)
        )
    }
}

/// Errors raised by `KeyValueStore` implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Backend error: {0}")]
    Backend(String),
}
