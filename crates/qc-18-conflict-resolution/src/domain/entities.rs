//! Core entities for Conflict Resolution

use super::value_objects::{ContractIndex, ExecutionStatus, Slot, Value};
use std::collections::BTreeSet;

/// Per-key bookkeeping for one sub-block run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConflictRecord {
    /// Value observed the first time the key was touched (`None` = absent)
    pub original: Option<Value>,
    /// Current speculative value
    pub modified: Slot,
    /// Contracts that wrote this key during the current run
    pub contracts: BTreeSet<ContractIndex>,
}

impl ConflictRecord {
    pub fn new(original: Option<Value>) -> Self {
        Self {
            original,
            modified: Slot::Unwritten,
            contracts: BTreeSet::new(),
        }
    }

    /// Value a contract sees for this key right now.
    pub fn current(&self) -> Option<&Value> {
        self.modified.as_written().or(self.original.as_ref())
    }

    /// Written during this run to something other than what was first observed.
    pub fn is_locally_modified(&self) -> bool {
        self.modified.is_written() && self.modified.as_written() != self.original.as_ref()
    }
}

/// What a contract executor reports after running one contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub output: Option<Value>,
}

impl ExecutionOutcome {
    pub fn success() -> Self {
        Self {
            status: ExecutionStatus::Success,
            output: None,
        }
    }

    pub fn failure() -> Self {
        Self {
            status: ExecutionStatus::Failure,
            output: None,
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}

/// One row of the sub-block summary: (contract, status, state).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubblockEntry<'a, C> {
    pub contract: &'a C,
    pub status: ExecutionStatus,
    pub state: String,
}
