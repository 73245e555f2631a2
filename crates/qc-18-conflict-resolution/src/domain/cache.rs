//! # Layered Sub-Block Cache
//!
//! Speculative view of the ledger for one sub-block.
//!
//! ## Read Path
//!
//! ```text
//! get(key) ──→ record.modified ──→ record.original
//!                  (written)         (first observation:
//!                                     CommonStore, then Ledger)
//! ```
//!
//! ## Bookkeeping
//!
//! - `reads` / `writes`: per-contract key footprint, cleared before every run
//! - `outputs`: per-contract last written values, rendered as `SET k v;`
//! - `redo_log`: per-contract value of each key before the contract first
//!   wrote it, used by `rollback_contract`

use super::entities::ConflictRecord;
use super::errors::{CrError, Result};
use super::invariants::invariant_no_excluded_keys;
use super::value_objects::{ContractIndex, Footprint, Key, PriorValue, Slot, Value};
use crate::algorithms::{render_state, DependencyResolver};
use crate::ports::KeyValueStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Per-sub-block mapping from key to `ConflictRecord` plus contract footprints.
pub struct LayeredCache {
    common: Arc<dyn KeyValueStore>,
    master: Arc<dyn KeyValueStore>,
    excluded_keys: Arc<BTreeSet<Key>>,
    records: BTreeMap<Key, ConflictRecord>,
    reads: BTreeMap<ContractIndex, BTreeSet<Key>>,
    writes: BTreeMap<ContractIndex, BTreeSet<Key>>,
    outputs: BTreeMap<ContractIndex, BTreeMap<Key, Value>>,
    redo_log: BTreeMap<ContractIndex, BTreeMap<Key, PriorValue>>,
}

impl LayeredCache {
    pub fn new(
        common: Arc<dyn KeyValueStore>,
        master: Arc<dyn KeyValueStore>,
        excluded_keys: Arc<BTreeSet<Key>>,
    ) -> Self {
        Self {
            common,
            master,
            excluded_keys,
            records: BTreeMap::new(),
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
            outputs: BTreeMap::new(),
            redo_log: BTreeMap::new(),
        }
    }

    /// Value visible to `contract_idx`: speculative, then common, then ledger.
    pub fn get(&mut self, contract_idx: ContractIndex, key: &str) -> Result<Option<Value>> {
        let value = self.touch(key)?.current().cloned();
        self.reads
            .entry(contract_idx)
            .or_default()
            .insert(key.to_string());
        Ok(value)
    }

    /// Speculatively write `value`, logging the prior value on first write.
    pub fn set(&mut self, contract_idx: ContractIndex, key: &str, value: Value) -> Result<()> {
        let record = self.touch(key)?;
        let prior = PriorValue::from(record.current().cloned());
        record.modified = Slot::Written(value.clone());
        record.contracts.insert(contract_idx);

        self.redo_log
            .entry(contract_idx)
            .or_default()
            .entry(key.to_string())
            .or_insert(prior);
        self.writes
            .entry(contract_idx)
            .or_default()
            .insert(key.to_string());
        self.outputs
            .entry(contract_idx)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Record for `key`, created from the external view on first touch.
    fn touch(&mut self, key: &str) -> Result<&mut ConflictRecord> {
        if !self.records.contains_key(key) {
            let original = self.lookup_external(key)?;
            trace!(key, found = original.is_some(), "[qc-18] First touch of key");
            self.records
                .insert(key.to_string(), ConflictRecord::new(original));
        }
        self.records
            .get_mut(key)
            .ok_or_else(|| CrError::InvariantViolation(format!("record for {key} vanished")))
    }

    fn lookup_external(&self, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.common.get(key)? {
            return Ok(Some(value));
        }
        Ok(self.master.get(key)?)
    }

    /// Clear the read/write footprint, outputs and redo history of one contract.
    pub fn reset_contract_data(&mut self, contract_idx: ContractIndex) {
        self.reads.remove(&contract_idx);
        self.writes.remove(&contract_idx);
        self.outputs.remove(&contract_idx);
        self.redo_log.remove(&contract_idx);
    }

    /// Undo every write of `contract_idx` using its redo log.
    ///
    /// A contract without redo history (read-only) is a no-op.
    pub fn rollback_contract(&mut self, contract_idx: ContractIndex) {
        debug!(contract_idx, "[qc-18] Rolling back contract");
        let Some(redo) = self.redo_log.remove(&contract_idx) else {
            warn!(
                contract_idx,
                "[qc-18] Contract not in redo log, returning without any reverts"
            );
            return;
        };

        self.reset_contract_data(contract_idx);

        for (key, prior) in redo {
            match prior {
                PriorValue::Absent => {
                    debug!(key = %key, "[qc-18] Removing key");
                    self.records.remove(&key);
                }
                PriorValue::Present(value) => {
                    if let Some(record) = self.records.get_mut(&key) {
                        record.modified = Slot::Written(value);
                        record.contracts.remove(&contract_idx);
                    }
                }
            }
        }
    }

    /// Keys whose ledger or common value diverged from what this sub-block
    /// first observed. Excluded keys are never returned.
    pub fn get_modified_keys(&self) -> Result<BTreeSet<Key>> {
        let mut modified = BTreeSet::new();
        for (key, record) in &self.records {
            if self.excluded_keys.contains(key) {
                continue;
            }
            if diverged(self.master.as_ref(), key, &record.original)?
                || diverged(self.common.as_ref(), key, &record.original)?
            {
                modified.insert(key.clone());
            }
        }
        Ok(modified)
    }

    /// `get_modified_keys` closed over "written by the same contract".
    pub fn get_modified_keys_recursive(&self, replay_readers: bool) -> Result<BTreeSet<Key>> {
        let seed = self.get_modified_keys()?;
        let closure = DependencyResolver::new(self, replay_readers).resolve(seed);
        Ok(closure.keys)
    }

    /// Sorted contract indices to replay, optionally resetting every key in
    /// the dependency closure to its best-known external value.
    pub fn get_rerun_list(
        &mut self,
        reset_keys: bool,
        replay_readers: bool,
    ) -> Result<Vec<ContractIndex>> {
        let seed = self.get_modified_keys()?;
        let closure = DependencyResolver::new(self, replay_readers).resolve(seed);

        if !invariant_no_excluded_keys(&closure.keys, &self.excluded_keys) {
            let key = closure
                .keys
                .intersection(&self.excluded_keys)
                .next()
                .cloned()
                .unwrap_or_default();
            return Err(CrError::ExcludedKeyInRerunSet { key });
        }
        debug!(keys = ?closure.keys, "[qc-18] Modified keys for rerunning");

        if reset_keys {
            for key in &closure.keys {
                if self.records.contains_key(key) {
                    self.reset_key(key)?;
                }
            }
        }

        Ok(closure.rerun_list())
    }

    /// Clear the speculative value of `key` and re-base its original on the
    /// common value. The ledger is consulted only when common lacks the key,
    /// since common always holds the newer value.
    pub fn reset_key(&mut self, key: &str) -> Result<()> {
        let external = match self.common.get(key)? {
            Some(value) => Some(("common", value)),
            None => self.master.get(key)?.map(|value| ("master", value)),
        };
        let record = self
            .records
            .get_mut(key)
            .ok_or_else(|| CrError::InvariantViolation(format!("reset of unknown key {key}")))?;

        record.modified = Slot::Unwritten;
        record.contracts.clear();

        match external {
            Some((source, value)) if record.original.as_ref() != Some(&value) => {
                debug!(key, source, "[qc-18] Resetting key to external value");
                record.original = Some(value);
            }
            _ => trace!(key, "[qc-18] No updated value found, keeping original"),
        }
        Ok(())
    }

    /// Locally modified keys with their speculative values, in key order.
    pub fn modified_entries(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.records.iter().filter_map(|(key, record)| {
            if record.is_locally_modified() {
                record.modified.as_written().map(|v| (key, v))
            } else {
                None
            }
        })
    }

    /// Canonical `SET k v;` representation of every locally modified key.
    pub fn get_state_rep(&self) -> Result<String> {
        render_state(self.modified_entries())
    }

    /// State representation of the values one contract wrote.
    pub fn get_state_for_idx(&self, contract_idx: ContractIndex) -> Result<String> {
        match self.outputs.get(&contract_idx) {
            Some(outputs) => render_state(outputs.iter()),
            None => Ok(String::new()),
        }
    }

    /// Write every locally modified key into the common store.
    pub fn merge_to_common(&self) -> Result<usize> {
        let mut merged = 0;
        for (key, value) in self.modified_entries() {
            self.common.set(key, value.clone())?;
            merged += 1;
        }
        Ok(merged)
    }

    pub fn footprint(&self, contract_idx: ContractIndex) -> Footprint {
        Footprint {
            reads: self.reads.get(&contract_idx).cloned().unwrap_or_default(),
            writes: self.writes.get(&contract_idx).cloned().unwrap_or_default(),
        }
    }

    pub fn record(&self, key: &str) -> Option<&ConflictRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = (&Key, &ConflictRecord)> {
        self.records.iter()
    }

    pub fn writes_of(&self, contract_idx: ContractIndex) -> Option<&BTreeSet<Key>> {
        self.writes.get(&contract_idx)
    }

    pub fn reads(&self) -> impl Iterator<Item = (&ContractIndex, &BTreeSet<Key>)> {
        self.reads.iter()
    }

    pub fn excluded_keys(&self) -> &BTreeSet<Key> {
        &self.excluded_keys
    }

    pub fn has_redo_log(&self, contract_idx: ContractIndex) -> bool {
        self.redo_log.contains_key(&contract_idx)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Description of every non-empty per-run collection.
    pub fn leftover_bookkeeping(&self) -> Vec<String> {
        let mut leftover = Vec::new();
        if !self.records.is_empty() {
            leftover.push(format!("records: {:?}", self.records.keys().collect::<Vec<_>>()));
        }
        if !self.reads.is_empty() {
            leftover.push(format!("reads: {:?}", self.reads));
        }
        if !self.writes.is_empty() {
            leftover.push(format!("writes: {:?}", self.writes));
        }
        if !self.outputs.is_empty() {
            leftover.push(format!("outputs: {:?}", self.outputs.keys().collect::<Vec<_>>()));
        }
        if !self.redo_log.is_empty() {
            leftover.push(format!("redo log: {:?}", self.redo_log.keys().collect::<Vec<_>>()));
        }
        leftover
    }
}

fn diverged(store: &dyn KeyValueStore, key: &str, original: &Option<Value>) -> Result<bool> {
    if !store.exists(key)? {
        return Ok(false);
    }
    Ok(store.get(key)? != *original)
}

/// `get`/`set` capability bound to one cache and one contract index.
pub struct ContractAccess<'a> {
    cache: &'a mut LayeredCache,
    contract_idx: ContractIndex,
}

impl<'a> ContractAccess<'a> {
    pub fn new(cache: &'a mut LayeredCache, contract_idx: ContractIndex) -> Self {
        Self {
            cache,
            contract_idx,
        }
    }

    pub fn contract_idx(&self) -> ContractIndex {
        self.contract_idx
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Value>> {
        self.cache.get(self.contract_idx, key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.cache.set(self.contract_idx, key, value.into())
    }
}
