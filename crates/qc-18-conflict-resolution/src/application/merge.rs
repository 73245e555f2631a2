//! Merge of the common store into the ledger at block end.

use crate::domain::{CrError, Key, Result};
use crate::ports::KeyValueStore;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Copy one key from the common store to the ledger.
///
/// The key must already exist in the common store.
pub fn merge_key_to_master(
    common: &dyn KeyValueStore,
    master: &dyn KeyValueStore,
    key: &str,
) -> Result<()> {
    if !common.exists(key)? {
        return Err(CrError::MissingFromCommon { key: key.to_string() });
    }
    let value = common
        .get(key)?
        .ok_or_else(|| CrError::MissingFromCommon { key: key.to_string() })?;
    master.set(key, value)?;
    Ok(())
}

/// Copy every common-store key except phase markers into the ledger, in
/// sorted key order. Returns the number of keys merged.
pub fn merge_to_master(
    common: &dyn KeyValueStore,
    master: &dyn KeyValueStore,
    phase_marker_keys: &BTreeSet<Key>,
) -> Result<usize> {
    let mut keys = common.keys()?;
    keys.sort();

    let mut merged = 0;
    for key in &keys {
        if phase_marker_keys.contains(key) {
            debug!(key = %key, "[qc-18] Skipping phase marker key");
            continue;
        }
        merge_key_to_master(common, master, key)?;
        merged += 1;
    }

    info!(merged, "[qc-18] Merged common store to master");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;

    #[test]
    fn test_merge_skips_phase_markers() {
        let common = InMemoryStore::with_entries([
            ("a", "1"),
            ("b", "2"),
            ("_merge_phase", "1"),
        ]);
        let master = InMemoryStore::with_entries([("a", "0"), ("z", "26")]);
        let phase_keys: BTreeSet<Key> = ["_merge_phase".to_string()].into_iter().collect();

        let merged = merge_to_master(&common, &master, &phase_keys).unwrap();

        assert_eq!(merged, 2);
        assert_eq!(master.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(master.get("b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(master.get("z").unwrap(), Some(b"26".to_vec()));
        assert!(!master.exists("_merge_phase").unwrap());
    }

    #[test]
    fn test_merge_key_requires_common_presence() {
        let common = InMemoryStore::new();
        let master = InMemoryStore::new();

        let err = merge_key_to_master(&common, &master, "ghost").unwrap_err();
        assert!(matches!(err, CrError::MissingFromCommon { key } if key == "ghost"));
        assert!(master.is_empty().unwrap());
    }
}
