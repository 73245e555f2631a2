//! Property tests over randomly generated sub-blocks.

mod support;

use proptest::prelude::*;
use qc_18_conflict_resolution::config::{STAMPS_KEY, XRATE_KEY};
use qc_18_conflict_resolution::{
    ConflictResolutionConfig, ConflictResolutionContext, InMemoryStore, KeyValueStore,
};
use std::sync::Arc;
use support::{interpret, Contract};

const KEYS: [&str; 6] = ["a", "b", "c", "d", STAMPS_KEY, XRATE_KEY];

fn contract_strategy() -> impl Strategy<Value = Contract> {
    (proptest::sample::subsequence(KEYS.to_vec(), 1..4), 0i64..100)
        .prop_map(|(keys, value)| Contract::Put { keys, value })
}

proptest! {
    #[test]
    fn prop_excluded_keys_never_rerun(
        contracts in proptest::collection::vec(contract_strategy(), 1..8),
        external in proptest::sample::subsequence(KEYS.to_vec(), 0..6),
    ) {
        let common = Arc::new(InMemoryStore::new());
        let master = Arc::new(InMemoryStore::new());
        let mut ctx: ConflictResolutionContext<Contract> = ConflictResolutionContext::new(
            0,
            common.clone(),
            master,
            Arc::new(ConflictResolutionConfig::default()),
        );
        ctx.begin([0; 32]).unwrap();
        for c in contracts {
            // every contract also pays the fee
            let mut keys = match &c { Contract::Put { keys, .. } => keys.clone(), _ => vec![] };
            keys.push(STAMPS_KEY);
            ctx.run_contract(Contract::Put { keys, value: 1 }, &mut interpret).unwrap();
        }
        for key in &external {
            common.set(key, b"external".to_vec()).unwrap();
        }

        let modified = ctx.cache().get_modified_keys().unwrap();
        let closure = ctx.cache().get_modified_keys_recursive(true).unwrap();
        prop_assert!(!modified.contains(STAMPS_KEY) && !modified.contains(XRATE_KEY));
        prop_assert!(!closure.contains(STAMPS_KEY) && !closure.contains(XRATE_KEY));

        let rerun = ctx.detect_conflicts().unwrap();
        prop_assert!(rerun.windows(2).all(|w| w[0] < w[1]));
        ctx.replay_all(&mut interpret).unwrap();
        ctx.merge_to_common().unwrap();
    }

    #[test]
    fn prop_state_rep_independent_of_write_order(
        values in proptest::collection::btree_map("[a-z]{1,8}", 0i64..1000, 1..10),
    ) {
        let build = |reverse: bool| {
            let mut ctx: ConflictResolutionContext<Contract> = ConflictResolutionContext::new(
                0,
                Arc::new(InMemoryStore::new()),
                Arc::new(InMemoryStore::new()),
                Arc::new(ConflictResolutionConfig::default()),
            );
            ctx.begin([0; 32]).unwrap();
            let mut entries: Vec<_> = values.iter().collect();
            if reverse {
                entries.reverse();
            }
            for (idx, (key, value)) in entries.into_iter().enumerate() {
                let mut access = ctx.access(idx).unwrap();
                access.set(key, value.to_string()).unwrap();
                ctx.add_contract_result(Contract::Put { keys: vec![], value: *value }, qc_18_conflict_resolution::ExecutionStatus::Success).unwrap();
            }
            ctx.get_state_rep().unwrap()
        };
        prop_assert_eq!(build(false), build(true));
    }
}
