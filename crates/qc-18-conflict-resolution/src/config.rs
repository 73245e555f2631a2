//! Configuration for Conflict Resolution Subsystem

use crate::domain::{CrError, Key, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;

/// Fee sink debited by nearly every contract.
pub const STAMPS_KEY: &str = "currency:balances:black_hole";

/// Stamp exchange rate read by nearly every contract.
pub const XRATE_KEY: &str = "currency:xrate:TAU_STP";

/// Phase bookkeeping keys written into the common store by the pipeline.
pub const DEFAULT_PHASE_MARKER_KEYS: [&str; 4] = [
    "_execution_phase",
    "_conflict_resolution_phase",
    "_merge_phase",
    "_sub_block_ready",
];

/// Conflict resolution configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConflictResolutionConfig {
    /// Keys removed from conflict detection (high-contention, append-like).
    ///
    /// These keys are never re-based before replay. A replayed contract
    /// applies its update on top of the value it already wrote, so an
    /// accumulator such as the fee sink is credited again.
    pub excluded_keys: BTreeSet<Key>,
    /// Common-store keys never copied to the ledger
    pub phase_marker_keys: BTreeSet<Key>,
    /// Number of pooled sub-block contexts
    pub num_slots: usize,
    /// Replay contracts that read a key in the closure, not only writers
    pub replay_readers: bool,
}

impl Default for ConflictResolutionConfig {
    fn default() -> Self {
        Self {
            excluded_keys: [STAMPS_KEY, XRATE_KEY]
                .into_iter()
                .map(String::from)
                .collect(),
            phase_marker_keys: DEFAULT_PHASE_MARKER_KEYS
                .into_iter()
                .map(String::from)
                .collect(),
            num_slots: 4,
            replay_readers: true,
        }
    }
}

impl ConflictResolutionConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_CR_EXCLUDED_KEYS`: comma-separated excluded keys
    /// - `QC_CR_PHASE_KEYS`: comma-separated phase marker keys
    /// - `QC_CR_NUM_SLOTS`: pooled contexts (default: 4)
    /// - `QC_CR_REPLAY_READERS`: replay readers of closure keys (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            excluded_keys: env::var("QC_CR_EXCLUDED_KEYS")
                .map(|v| parse_key_list(&v))
                .unwrap_or(defaults.excluded_keys),

            phase_marker_keys: env::var("QC_CR_PHASE_KEYS")
                .map(|v| parse_key_list(&v))
                .unwrap_or(defaults.phase_marker_keys),

            num_slots: env::var("QC_CR_NUM_SLOTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.num_slots),

            replay_readers: env::var("QC_CR_REPLAY_READERS")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.replay_readers),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_slots == 0 {
            return Err(CrError::InvalidConfig("num_slots must be at least 1".into()));
        }
        if let Some(key) = self.excluded_keys.intersection(&self.phase_marker_keys).next() {
            return Err(CrError::InvalidConfig(format!(
                "key {key} is both excluded and a phase marker"
            )));
        }
        Ok(())
    }
}

fn parse_key_list(raw: &str) -> BTreeSet<Key> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    raw.to_lowercase() != "false" && raw != "0"
}
