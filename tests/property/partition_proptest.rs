//! Property-based tests for the three-way set partition

use crate::common::*;
use chatmirror::client::sync::{Reconciler, SetPartition};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn id_set() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("r[0-9]{1,2}", 0..10)
}

proptest! {
    #[test]
    fn test_partition_covers_both_sides(local in id_set(), server in id_set()) {
        let partition = SetPartition::compute(&local, &server);

        let kept: BTreeSet<String> = partition.to_create.union(&partition.to_sync).cloned().collect();
        prop_assert_eq!(&kept, &server);
        prop_assert!(partition.to_create.is_disjoint(&local));
        prop_assert!(partition.to_delete.is_disjoint(&server));
        prop_assert!(partition.to_sync.is_subset(&local));

        let seen: BTreeSet<String> = kept.union(&partition.to_delete).cloned().collect();
        let all: BTreeSet<String> = local.union(&server).cloned().collect();
        prop_assert_eq!(seen, all);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_store_matches_server_after_pass(local in id_set(), server in id_set()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let stored = runtime.block_on(async {
            let test = TestStore::new().await;
            let reconciler = Reconciler::new(test.store.clone());
            let snapshot_of = |ids: &BTreeSet<String>| {
                ids.iter()
                    .fold(SnapshotBuilder::new(), |builder, id| {
                        builder.chatroom(room(id, "a@x b@x", vec![message(&format!("{}-m", id), 1, "a@x")]))
                    })
                    .build()
            };

            reconciler.reconcile(snapshot_of(&local), "p1").await;
            let report = reconciler.reconcile(snapshot_of(&server), "p2").await;
            assert!(report.is_clean());
            test.store.fetch_chatroom_ids().await.unwrap()
        });
        prop_assert_eq!(stored, server);
    }
}
