//! Domain invariants for Conflict Resolution
//!
//! Pure predicates. Callers turn a `false` into `CrError::InvariantViolation`.

use super::cache::LayeredCache;
use super::value_objects::{ContractIndex, Key};
use std::collections::BTreeSet;

/// `contracts` and `results` stay index-aligned.
pub fn invariant_aligned_results(contracts: usize, results: usize) -> bool {
    contracts == results
}

/// Every contract listed on a key has that key in its write set.
pub fn invariant_writers_recorded(cache: &LayeredCache) -> bool {
    cache.records().all(|(key, record)| {
        record.contracts.iter().all(|idx| {
            cache
                .writes_of(*idx)
                .map(|written| written.contains(key))
                .unwrap_or(false)
        })
    })
}

/// No excluded key appears in `keys`.
pub fn invariant_no_excluded_keys(keys: &BTreeSet<Key>, excluded: &BTreeSet<Key>) -> bool {
    keys.is_disjoint(excluded)
}

/// Strictly ascending, therefore deduplicated.
pub fn invariant_strictly_ascending(indices: &[ContractIndex]) -> bool {
    indices.windows(2).all(|w| w[0] < w[1])
}
