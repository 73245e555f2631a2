//! Algorithms module for Conflict Resolution
//!
//! Contains:
//! - Dependency closure over externally modified keys
//! - Canonical state representation rendering

pub mod dependency_resolver;
pub mod state_rep;

pub use dependency_resolver::{DependencyClosure, DependencyResolver};
pub use state_rep::render_state;
