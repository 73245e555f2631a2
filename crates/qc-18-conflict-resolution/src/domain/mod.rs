//! Domain module for Conflict Resolution
//!
//! Contains core entities, value objects, errors, invariants and the
//! layered sub-block cache.

pub mod cache;
pub mod entities;
pub mod errors;
pub mod invariants;
pub mod value_objects;

pub use cache::{ContractAccess, LayeredCache};
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
