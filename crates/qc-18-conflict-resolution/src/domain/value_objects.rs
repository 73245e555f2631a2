//! Value objects for Conflict Resolution

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Ledger key
pub type Key = String;

/// Opaque stored value
pub type Value = Vec<u8>;

/// Position of a contract within its sub-block
pub type ContractIndex = usize;

/// Identifies the input batch of a sub-block
pub type InputHash = [u8; 32];

/// Speculative value of a key within one sub-block run.
///
/// `Unwritten` is distinct from any real value, including an empty one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    #[default]
    Unwritten,
    Written(Value),
}

impl Slot {
    pub fn is_written(&self) -> bool {
        matches!(self, Slot::Written(_))
    }

    pub fn as_written(&self) -> Option<&Value> {
        match self {
            Slot::Written(v) => Some(v),
            Slot::Unwritten => None,
        }
    }
}

/// Value of a key just before a contract first wrote it (redo log entry).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorValue {
    /// The key did not exist anywhere
    Absent,
    Present(Value),
}

impl From<Option<Value>> for PriorValue {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(v) => PriorValue::Present(v),
            None => PriorValue::Absent,
        }
    }
}

/// Status of a contract run, from a closed set of wire markers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    #[serde(rename = "SUCC")]
    Success,
    #[serde(rename = "FAIL")]
    Failure,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCC",
            ExecutionStatus::Failure => "FAIL",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys read and written by one contract during one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Footprint {
    pub reads: BTreeSet<Key>,
    pub writes: BTreeSet<Key>,
}

impl Footprint {
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }
}

impl fmt::Display for Footprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reads={:?} writes={:?}", self.reads, self.writes)
    }
}
