//! Property-based tests for read receipt merging

use crate::common::*;
use chatmirror::client::push::PushMerger;
use chatmirror::client::state::Projection;
use chatmirror::client::sync::Reconciler;
use chatmirror::shared::messaging::{parse_email_list, LogEntry};
use proptest::prelude::*;
use std::collections::BTreeSet;

const READERS: [&str; 5] = ["a@x", "b@x", "c@x", "d@x", "e@x"];

fn receipts() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..READERS.len(), 0..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_read_by_is_union_of_receipts(order in receipts()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let read_by = runtime.block_on(async {
            let test = TestStore::new().await;
            let snapshot = SnapshotBuilder::new()
                .chatroom(room("r1", "a@x b@x c@x d@x e@x", vec![message("m1", 1, "a@x")]))
                .build();
            let reconciler = Reconciler::new(test.store.clone());
            reconciler.reconcile(snapshot.clone(), "p1").await;

            let merger = PushMerger::new(test.store.clone());
            let mut projection = Projection::load(&test.store).await.unwrap();
            for index in &order {
                merger
                    .merge(&mut projection, read_receipt("r1", &["m1"], READERS[*index]))
                    .await;
            }
            // a pass with the stale reader list must not take any back
            reconciler.reconcile(snapshot, "p2").await;

            let stored = test.store.fetch_chatroom("r1").await.unwrap().unwrap();
            let projected = projection.chatroom("r1").unwrap().clone();
            let stored_readers = stored.entry("m1").and_then(LogEntry::as_user).unwrap().read_by.clone();
            let projected_readers = projected.entry("m1").and_then(LogEntry::as_user).unwrap().read_by.clone();
            (stored_readers, projected_readers)
        });

        let mut expected: BTreeSet<String> = parse_email_list("a@x");
        expected.extend(order.iter().map(|index| READERS[*index].to_string()));
        prop_assert_eq!(&read_by.0, &expected);
        prop_assert_eq!(&read_by.1, &expected);
    }

    #[test]
    fn test_read_by_ignores_delivery_order(order in receipts()) {
        let mut forward = Projection::new();
        let mut backward = Projection::new();
        let snapshot_room = room("r1", "a@x b@x", vec![message("m1", 1, "")])
            .to_chatroom()
            .unwrap();
        forward.ensure_chatroom(snapshot_room.clone());
        backward.ensure_chatroom(snapshot_room);

        for index in &order {
            forward
                .add_readers("r1", "m1", std::iter::once(&READERS[*index].to_string()))
                .unwrap();
        }
        for index in order.iter().rev() {
            backward
                .add_readers("r1", "m1", std::iter::once(&READERS[*index].to_string()))
                .unwrap();
        }
        prop_assert_eq!(forward, backward);
    }
}
