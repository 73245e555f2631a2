//! Application layer: sub-block lifecycle, context pooling and block merge.

pub mod context;
pub mod merge;
pub mod pool;

pub use context::{ConflictResolutionContext, Phase};
pub use merge::{merge_key_to_master, merge_to_master};
pub use pool::ContextPool;
