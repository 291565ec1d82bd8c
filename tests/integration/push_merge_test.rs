//! Push event merging against the store

use crate::common::*;
use assert_matches::assert_matches;
use chatmirror::client::push::{MergeOutcome, PushMerger};
use chatmirror::client::state::Projection;
use chatmirror::client::sync::Reconciler;
use chatmirror::shared::messaging::{parse_email_list, ChatroomKind, LogEntry};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_scenario_c_unknown_room_created() {
    let test = TestStore::new().await;
    let merger = PushMerger::new(test.store.clone());
    let mut projection = Projection::new();

    let outcome = merger
        .merge(&mut projection, message_event("r9", "m1", 1, Some("a@x b@x")))
        .await;
    assert_matches!(outcome, MergeOutcome::Applied);

    let stored = test.store.fetch_chatroom("r9").await.unwrap().unwrap();
    assert_eq!(stored.audience, parse_email_list("a@x b@x"));
    assert_eq!(stored.kind, ChatroomKind::Pair);
    assert_eq!(stored.log.len(), 1);
    assert_eq!(projection.chatroom("r9"), Some(&stored));
}

#[tokio::test]
async fn test_duplicate_delivery_is_harmless() {
    let test = TestStore::new().await;
    let merger = PushMerger::new(test.store.clone());
    let mut projection = Projection::new();
    let events = vec![
        message_event("r1", "m1", 1, Some("a@x b@x c@x")),
        system_event("r1", "enter", "s1", 2, "d@x"),
        read_receipt("r1", &["m1"], "b@x"),
    ];

    for event in events.iter().chain(events.iter()) {
        let outcome = merger.merge(&mut projection, event.clone()).await;
        assert!(!outcome.is_failure(), "unexpected {:?}", outcome);
    }

    let stored = test.store.fetch_chatroom("r1").await.unwrap().unwrap();
    let ids: Vec<&str> = stored.log.iter().map(LogEntry::id).collect();
    assert_eq!(ids, vec!["m1", "s1"]);
    assert_eq!(stored.audience, parse_email_list("a@x b@x c@x d@x"));
    assert_eq!(projection.chatroom("r1"), Some(&stored));
}

#[tokio::test]
async fn test_push_then_pass_converges() {
    let test = TestStore::new().await;
    let merger = PushMerger::new(test.store.clone());
    let reconciler = Reconciler::new(test.store.clone());
    let mut projection = Projection::new();

    merger
        .merge(&mut projection, message_event("r1", "m1", 1, Some("a@x b@x")))
        .await;
    merger
        .merge(&mut projection, system_event("r1", "exit", "s2", 2, "b@x"))
        .await;

    // the shell was created as a pair before the exit
    let mut remaining = room("r1", "a@x", vec![message("m1", 1, "a@x")]);
    remaining.kind = "pair".to_string();
    remaining.system_logs.push(system("s2", "exit", 2, "b@x"));
    let snapshot = SnapshotBuilder::new().chatroom(remaining).build();
    let report = reconciler.reconcile(snapshot, "p1").await;
    assert!(report.is_clean(), "{:?}", report.violations);
    assert_eq!(report.total_changes(), 0);

    projection.replace_with(Projection::load(&test.store).await.unwrap());
    let room = projection.chatroom("r1").unwrap();
    assert_eq!(room.audience, parse_email_list("a@x"));
    assert_eq!(room.log.len(), 2);
}

#[tokio::test]
async fn test_merge_and_pass_share_the_write_lane() {
    let test = TestStore::new().await;
    let merger = PushMerger::new(test.store.clone());
    let reconciler = Reconciler::new(test.store.clone());

    let snapshot = SnapshotBuilder::new()
        .chatroom(room("r1", "a@x b@x", vec![message("m1", 1, "a@x")]))
        .build();
    reconciler.reconcile(snapshot.clone(), "p0").await;

    let mut projection = Projection::load(&test.store).await.unwrap();
    let pass = reconciler.reconcile(snapshot, "p1");
    let merge = merger.merge(&mut projection, read_receipt("r1", &["m1"], "b@x"));
    let (report, outcome) = tokio::join!(pass, merge);

    assert!(report.is_clean());
    assert!(!outcome.is_failure());
    let stored = test.store.fetch_chatroom("r1").await.unwrap().unwrap();
    let m1 = stored.entry("m1").and_then(LogEntry::as_user).unwrap();
    assert_eq!(m1.read_by, parse_email_list("a@x b@x"));
}
