//! Conflict Resolution Context
//!
//! Drives one sub-block through its lifecycle:
//!
//! ```text
//! Idle ──begin──→ Running ──detect_conflicts──→ Detecting ──→ Replaying
//!   ↑                                                            │
//!   └────────────────reset──────────── MergedToCommon ←─merge────┘
//! ```
//!
//! Replay is a synchronous handoff: `next_replay` yields an index, the
//! scheduler re-executes that contract through `access`, and
//! `finish_replay` verifies the contract touched exactly the same keys.
//! `replay_all` runs the same loop against a `ContractExecutor`.

use crate::config::ConflictResolutionConfig;
use crate::domain::invariants::{
    invariant_aligned_results, invariant_strictly_ascending, invariant_writers_recorded,
};
use crate::domain::{
    ContractAccess, ContractIndex, CrError, ExecutionStatus, Footprint, InputHash, Key,
    LayeredCache, Result, SubblockEntry,
};
use crate::ports::{ContractExecutor, KeyValueStore};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle phase of a context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Detecting,
    Replaying,
    MergedToCommon,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Running => "Running",
            Phase::Detecting => "Detecting",
            Phase::Replaying => "Replaying",
            Phase::MergedToCommon => "MergedToCommon",
        }
    }
}

struct InFlightReplay {
    contract_idx: ContractIndex,
    footprint: Footprint,
}

/// One sub-block slot: cache, executed contracts and their results.
pub struct ConflictResolutionContext<C> {
    slot: usize,
    config: Arc<ConflictResolutionConfig>,
    excluded_keys: Arc<BTreeSet<Key>>,
    common: Arc<dyn KeyValueStore>,
    master: Arc<dyn KeyValueStore>,
    cache: LayeredCache,
    contracts: Vec<C>,
    results: Vec<ExecutionStatus>,
    merged_to_common: bool,
    input_hash: Option<InputHash>,
    phase: Phase,
    pending_replay: VecDeque<ContractIndex>,
    in_flight: Option<InFlightReplay>,
}

impl<C> ConflictResolutionContext<C> {
    pub fn new(
        slot: usize,
        common: Arc<dyn KeyValueStore>,
        master: Arc<dyn KeyValueStore>,
        config: Arc<ConflictResolutionConfig>,
    ) -> Self {
        let excluded_keys = Arc::new(config.excluded_keys.clone());
        let cache = LayeredCache::new(common.clone(), master.clone(), excluded_keys.clone());
        Self {
            slot,
            config,
            excluded_keys,
            common,
            master,
            cache,
            contracts: Vec::new(),
            results: Vec::new(),
            merged_to_common: false,
            input_hash: None,
            phase: Phase::Idle,
            pending_replay: VecDeque::new(),
            in_flight: None,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn input_hash(&self) -> Option<&InputHash> {
        self.input_hash.as_ref()
    }

    pub fn merged_to_common(&self) -> bool {
        self.merged_to_common
    }

    pub fn contracts(&self) -> &[C] {
        &self.contracts
    }

    pub fn results(&self) -> &[ExecutionStatus] {
        &self.results
    }

    pub fn cache(&self) -> &LayeredCache {
        &self.cache
    }

    fn require_phase(&self, operation: &'static str, allowed: &[Phase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(CrError::InvalidPhase {
                operation,
                phase: self.phase.as_str(),
            })
        }
    }

    fn check_aligned(&self) -> Result<()> {
        if invariant_aligned_results(self.contracts.len(), self.results.len()) {
            Ok(())
        } else {
            Err(CrError::InvariantViolation(format!(
                "{} contracts but {} results",
                self.contracts.len(),
                self.results.len()
            )))
        }
    }

    fn check_index(&self, index: ContractIndex) -> Result<()> {
        if index < self.contracts.len() {
            Ok(())
        } else {
            Err(CrError::ContractIndexOutOfBounds {
                index,
                len: self.contracts.len(),
            })
        }
    }

    /// Start a new sub-block run for `input_hash`.
    pub fn begin(&mut self, input_hash: InputHash) -> Result<()> {
        self.require_phase("begin", &[Phase::Idle])?;
        info!(
            slot = self.slot,
            input_hash = %hex::encode(&input_hash[..8]),
            "[qc-18] Starting sub-block"
        );
        self.input_hash = Some(input_hash);
        self.phase = Phase::Running;
        Ok(())
    }

    pub fn next_contract_idx(&self) -> Result<ContractIndex> {
        self.check_aligned()?;
        Ok(self.contracts.len())
    }

    /// State capability for `contract_idx`.
    ///
    /// While running, any index up to the next free one; while replaying,
    /// only the contract handed out by `next_replay`.
    pub fn access(&mut self, contract_idx: ContractIndex) -> Result<ContractAccess<'_>> {
        match self.phase {
            Phase::Running => {
                let next = self.next_contract_idx()?;
                if contract_idx > next {
                    return Err(CrError::ContractIndexOutOfBounds {
                        index: contract_idx,
                        len: next,
                    });
                }
            }
            Phase::Replaying => match &self.in_flight {
                Some(replay) if replay.contract_idx == contract_idx => {}
                _ => {
                    return Err(CrError::InvariantViolation(format!(
                        "contract {contract_idx} is not being replayed"
                    )))
                }
            },
            _ => {
                return Err(CrError::InvalidPhase {
                    operation: "access",
                    phase: self.phase.as_str(),
                })
            }
        }
        Ok(ContractAccess::new(&mut self.cache, contract_idx))
    }

    /// Append an executed contract and its status; returns its index.
    pub fn add_contract_result(&mut self, contract: C, status: ExecutionStatus) -> Result<ContractIndex> {
        self.require_phase("add_contract_result", &[Phase::Running])?;
        let idx = self.next_contract_idx()?;
        self.contracts.push(contract);
        self.results.push(status);
        self.check_aligned()?;
        Ok(idx)
    }

    pub fn update_contract_result(
        &mut self,
        contract_idx: ContractIndex,
        status: ExecutionStatus,
    ) -> Result<()> {
        self.check_aligned()?;
        self.check_index(contract_idx)?;
        debug!(contract_idx, %status, "[qc-18] Updating run result");
        self.results[contract_idx] = status;
        Ok(())
    }

    /// Speculatively run `contract` at the next index and record its status.
    ///
    /// An executor error rolls back whatever the contract wrote.
    pub fn run_contract<E>(&mut self, contract: C, executor: &mut E) -> Result<ContractIndex>
    where
        E: ContractExecutor<C>,
    {
        self.require_phase("run_contract", &[Phase::Running])?;
        let idx = self.next_contract_idx()?;
        self.cache.reset_contract_data(idx);

        let mut access = ContractAccess::new(&mut self.cache, idx);
        match executor.execute(&contract, &mut access) {
            Ok(outcome) => {
                debug!(slot = self.slot, contract_idx = idx, status = %outcome.status, "[qc-18] Contract executed");
                self.add_contract_result(contract, outcome.status)
            }
            Err(e) => {
                self.cache.rollback_contract(idx);
                self.cache.reset_contract_data(idx);
                Err(e)
            }
        }
    }

    pub fn rollback_contract(&mut self, contract_idx: ContractIndex) -> Result<()> {
        self.require_phase("rollback_contract", &[Phase::Running, Phase::Replaying])?;
        self.cache.rollback_contract(contract_idx);
        Ok(())
    }

    /// Compute the rerun list and enter replay.
    ///
    /// Returns the contract indices to replay, ascending.
    pub fn detect_conflicts(&mut self) -> Result<Vec<ContractIndex>> {
        self.require_phase("detect_conflicts", &[Phase::Running])?;
        self.check_aligned()?;
        if !invariant_writers_recorded(&self.cache) {
            return Err(CrError::InvariantViolation(
                "key lists a writer whose write set does not contain it".into(),
            ));
        }

        self.phase = Phase::Detecting;
        // closure keys are always re-based on their external value
        let rerun = self.cache.get_rerun_list(true, self.config.replay_readers)?;

        if !invariant_strictly_ascending(&rerun) {
            return Err(CrError::InvariantViolation(format!(
                "rerun list not ascending: {rerun:?}"
            )));
        }
        if let Some(&idx) = rerun.iter().find(|&&idx| idx >= self.contracts.len()) {
            return Err(CrError::ContractIndexOutOfBounds {
                index: idx,
                len: self.contracts.len(),
            });
        }

        info!(slot = self.slot, rerun = ?rerun, "[qc-18] Contract indexes to rerun");
        self.pending_replay = rerun.iter().copied().collect();
        self.phase = Phase::Replaying;
        Ok(rerun)
    }

    /// Next contract to re-execute, with its footprint cleared.
    pub fn next_replay(&mut self) -> Result<Option<ContractIndex>> {
        self.require_phase("next_replay", &[Phase::Replaying])?;
        if let Some(replay) = &self.in_flight {
            return Err(CrError::InvariantViolation(format!(
                "replay of contract {} not finished",
                replay.contract_idx
            )));
        }
        let Some(idx) = self.pending_replay.pop_front() else {
            return Ok(None);
        };

        debug!(slot = self.slot, contract_idx = idx, "[qc-18] Rerunning contract");
        let footprint = self.cache.footprint(idx);
        self.cache.reset_contract_data(idx);
        self.in_flight = Some(InFlightReplay {
            contract_idx: idx,
            footprint,
        });
        Ok(Some(idx))
    }

    /// Verify a replayed contract reproduced its footprint and record its status.
    pub fn finish_replay(&mut self, contract_idx: ContractIndex, status: ExecutionStatus) -> Result<()> {
        self.require_phase("finish_replay", &[Phase::Replaying])?;
        let replay = match self.in_flight.take() {
            Some(replay) if replay.contract_idx == contract_idx => replay,
            other => {
                self.in_flight = other;
                return Err(CrError::InvariantViolation(format!(
                    "contract {contract_idx} is not being replayed"
                )));
            }
        };

        let actual = self.cache.footprint(contract_idx);
        if actual != replay.footprint {
            let err = CrError::ReplayDivergence {
                contract_idx,
                expected: replay.footprint.to_string(),
                actual: actual.to_string(),
            };
            // stays in flight: the sub-block can no longer be merged
            self.in_flight = Some(replay);
            return Err(err);
        }
        self.update_contract_result(contract_idx, status)
    }

    /// Replay every pending contract through `executor`, ascending.
    pub fn replay_all<E>(&mut self, executor: &mut E) -> Result<usize>
    where
        E: ContractExecutor<C>,
    {
        let mut replayed = 0;
        while let Some(idx) = self.next_replay()? {
            let len = self.contracts.len();
            let contract = self
                .contracts
                .get(idx)
                .ok_or(CrError::ContractIndexOutOfBounds { index: idx, len })?;
            let mut access = ContractAccess::new(&mut self.cache, idx);
            let outcome = executor.execute(contract, &mut access)?;
            self.finish_replay(idx, outcome.status)?;
            replayed += 1;
        }
        Ok(replayed)
    }

    /// All replay work done.
    pub fn is_resolved(&self) -> bool {
        self.phase == Phase::Replaying && self.pending_replay.is_empty() && self.in_flight.is_none()
    }

    /// Write every locally modified key into the common store. Once only.
    pub fn merge_to_common(&mut self) -> Result<usize> {
        if self.merged_to_common {
            return Err(CrError::AlreadyMerged);
        }
        self.require_phase("merge_to_common", &[Phase::Replaying])?;
        if !self.is_resolved() {
            return Err(CrError::ReplayUnresolved {
                pending: self.pending_replay.len() + usize::from(self.in_flight.is_some()),
            });
        }

        let merged = self.cache.merge_to_common()?;
        self.merged_to_common = true;
        self.phase = Phase::MergedToCommon;
        info!(slot = self.slot, merged, "[qc-18] Merged sub-block to common");
        Ok(merged)
    }

    pub fn get_state_rep(&self) -> Result<String> {
        self.cache.get_state_rep()
    }

    pub fn get_state_for_idx(&self, contract_idx: ContractIndex) -> Result<String> {
        self.check_index(contract_idx)?;
        self.cache.get_state_for_idx(contract_idx)
    }

    /// (contract, status, state) per contract, in index order.
    pub fn get_subblock_representation(&self) -> Result<Vec<SubblockEntry<'_, C>>> {
        self.check_aligned()?;
        if !self.merged_to_common {
            return Err(CrError::NotMerged);
        }
        self.contracts
            .iter()
            .zip(&self.results)
            .enumerate()
            .map(|(idx, (contract, status))| {
                Ok(SubblockEntry {
                    contract,
                    status: *status,
                    state: self.cache.get_state_for_idx(idx)?,
                })
            })
            .collect()
    }

    /// Drop all per-run data and return to `Idle`.
    pub fn reset(&mut self) {
        debug!(slot = self.slot, "[qc-18] Resetting run data");
        self.contracts.clear();
        self.results.clear();
        self.merged_to_common = false;
        self.input_hash = None;
        self.pending_replay.clear();
        self.in_flight = None;
        self.cache = LayeredCache::new(
            self.common.clone(),
            self.master.clone(),
            self.excluded_keys.clone(),
        );
        self.phase = Phase::Idle;
    }

    /// Check that no per-run data survived a reset.
    pub fn assert_reset(&self) -> Result<()> {
        let mut leftover = self.cache.leftover_bookkeeping();
        if !self.contracts.is_empty() {
            leftover.push(format!("contracts: {}", self.contracts.len()));
        }
        if !self.results.is_empty() {
            leftover.push(format!("results: {:?}", self.results));
        }
        if self.merged_to_common {
            leftover.push("merged_to_common is set".into());
        }
        if let Some(hash) = &self.input_hash {
            leftover.push(format!("input hash: {}", hex::encode(hash)));
        }
        if !self.pending_replay.is_empty() || self.in_flight.is_some() {
            leftover.push("replay queue not empty".into());
        }
        if self.phase != Phase::Idle {
            leftover.push(format!("phase: {}", self.phase.as_str()));
        }

        if leftover.is_empty() {
            Ok(())
        } else {
            Err(CrError::NotReset(leftover.join("; ")))
        }
    }
}

impl<C> fmt::Display for ConflictResolutionContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hash = self
            .input_hash
            .map(|h| hex::encode(&h[..8]))
            .unwrap_or_else(|| "none".to_string());
        write!(
            f,
            "CrContext(slot={}, input_hash={}.., contracts={}, phase={})",
            self.slot,
            hash,
            self.contracts.len(),
            self.phase.as_str()
        )
    }
}
