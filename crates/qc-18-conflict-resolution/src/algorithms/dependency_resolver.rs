//! Dependency Resolver
//!
//! Expands a set of externally modified keys into every key and contract
//! that must be replayed.
//!
//! ## Algorithm: Worklist Closure
//!
//! ```text
//! frontier = seed keys (minus excluded)
//! while key = frontier.pop():
//!     for contract in writers(key) [∪ readers(key)]:
//!         if contract newly implicated:
//!             for k in writes(contract) not yet seen and not excluded:
//!                 frontier.push(k)
//! ```
//!
//! Each key enters the frontier once and each contract is expanded once, so
//! the loop is bounded by the total key count plus contract count.

use crate::domain::{ContractIndex, Key, LayeredCache};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Keys and contracts reached from the seed set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyClosure {
    pub keys: BTreeSet<Key>,
    pub contracts: BTreeSet<ContractIndex>,
}

impl DependencyClosure {
    /// Contracts to replay, ascending.
    pub fn rerun_list(&self) -> Vec<ContractIndex> {
        self.contracts.iter().copied().collect()
    }
}

/// Computes dependency closures over one `LayeredCache`.
pub struct DependencyResolver<'a> {
    cache: &'a LayeredCache,
    readers: BTreeMap<&'a str, BTreeSet<ContractIndex>>,
}

impl<'a> DependencyResolver<'a> {
    /// With `replay_readers`, contracts that only read a key in the closure
    /// are implicated alongside its writers.
    pub fn new(cache: &'a LayeredCache, replay_readers: bool) -> Self {
        let mut readers: BTreeMap<&'a str, BTreeSet<ContractIndex>> = BTreeMap::new();
        if replay_readers {
            for (idx, keys) in cache.reads() {
                for key in keys {
                    readers.entry(key.as_str()).or_default().insert(*idx);
                }
            }
        }
        Self { cache, readers }
    }

    pub fn resolve(&self, seed: BTreeSet<Key>) -> DependencyClosure {
        let excluded = self.cache.excluded_keys();
        let mut closure = DependencyClosure::default();
        let mut frontier: VecDeque<Key> = VecDeque::new();

        for key in seed {
            if !excluded.contains(&key) && closure.keys.insert(key.clone()) {
                frontier.push_back(key);
            }
        }

        while let Some(key) = frontier.pop_front() {
            for idx in self.implicated(&key) {
                if !closure.contracts.insert(idx) {
                    continue;
                }
                let Some(written) = self.cache.writes_of(idx) else {
                    continue;
                };
                for k in written {
                    if !excluded.contains(k) && closure.keys.insert(k.clone()) {
                        frontier.push_back(k.clone());
                    }
                }
            }
        }

        closure
    }

    fn implicated(&self, key: &str) -> BTreeSet<ContractIndex> {
        let mut contracts = self
            .cache
            .record(key)
            .map(|r| r.contracts.clone())
            .unwrap_or_default();
        if let Some(readers) = self.readers.get(key) {
            contracts.extend(readers.iter().copied());
        }
        contracts
    }
}
