//! Reconciliation scenarios
//!
//! Each test seeds local state, runs one or more passes and checks the
//! store and the report.

use crate::common::*;
use chatmirror::client::local_db::log_entries;
use chatmirror::client::push::PushMerger;
use chatmirror::client::state::Projection;
use chatmirror::client::sync::Reconciler;
use chatmirror::shared::error::ConsistencyViolation;
use chatmirror::shared::messaging::{parse_email_list, LogEntry};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_scenario_a_room_grows() {
    let test = TestStore::new().await;
    let reconciler = Reconciler::new(test.store.clone());

    let before = SnapshotBuilder::new()
        .chatroom(room("r1", "a@x b@x", vec![message("m1", 1, "a@x")]))
        .build();
    reconciler.reconcile(before, "p1").await;

    let after = SnapshotBuilder::new()
        .chatroom(room(
            "r1",
            "a@x b@x c@x",
            vec![message("m1", 1, "a@x"), message("m2", 2, "a@x")],
        ))
        .build();
    let report = reconciler.reconcile(after, "p2").await;
    assert!(report.is_clean());
    assert_eq!(report.entries_appended, 1);

    let stored = test.store.fetch_chatroom("r1").await.unwrap().unwrap();
    assert_eq!(stored.audience, parse_email_list("a@x b@x c@x"));
    let ids: Vec<&str> = stored.log.iter().map(LogEntry::id).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
}

#[tokio::test]
async fn test_scenario_b_room_removed() {
    let test = TestStore::new().await;
    let reconciler = Reconciler::new(test.store.clone());

    let both = SnapshotBuilder::new()
        .chatroom(room("r1", "a@x b@x", vec![]))
        .chatroom(room("r2", "a@x c@x", vec![message("m1", 1, "")]))
        .build();
    reconciler.reconcile(both, "p1").await;

    let only_r1 = SnapshotBuilder::new().chatroom(room("r1", "a@x b@x", vec![])).build();
    let report = reconciler.reconcile(only_r1, "p2").await;
    assert_eq!(report.chatrooms.deleted, 1);

    crate::assert_room_ids!(test.store.fetch_chatroom_ids().await.unwrap(), ["r1"]);
    assert_eq!(test.store.stats().await.unwrap().log_entry_count, 0);
}

#[tokio::test]
async fn test_scenario_d_read_receipt_survives_reconciliation() {
    let test = TestStore::new().await;
    let reconciler = Reconciler::new(test.store.clone());
    let merger = PushMerger::new(test.store.clone());
    let mut projection = Projection::new();

    let snapshot = SnapshotBuilder::new()
        .chatroom(room("r1", "a@x b@x c@x", vec![message("m1", 1, "a@x b@x")]))
        .build();
    reconciler.reconcile(snapshot.clone(), "p1").await;
    projection.replace_with(Projection::load(&test.store).await.unwrap());

    merger
        .merge(&mut projection, read_receipt("r1", &["m1"], "c@x"))
        .await;
    let report = reconciler.reconcile(snapshot, "p2").await;
    assert!(report.is_clean());

    let stored = test.store.fetch_chatroom("r1").await.unwrap().unwrap();
    let m1 = stored.entry("m1").and_then(LogEntry::as_user).unwrap();
    assert_eq!(m1.read_by, parse_email_list("a@x b@x c@x"));
}

#[tokio::test]
async fn test_reconciliation_is_idempotent() {
    let test = TestStore::new().await;
    let reconciler = Reconciler::new(test.store.clone());
    let snapshot = SnapshotBuilder::new()
        .chatroom(room("r1", "a@x b@x", vec![message("m1", 1, "a@x"), message("m2", 2, "")]))
        .chatroom(room("r2", "a@x b@x c@x", vec![]))
        .friend("b@x", Some("Bee"))
        .suspended(true)
        .build();

    let first = reconciler.reconcile(snapshot.clone(), "p1").await;
    assert!(first.total_changes() > 0);
    let stats = test.store.stats().await.unwrap();

    let second = reconciler.reconcile(snapshot, "p2").await;
    assert!(second.is_clean());
    assert_eq!(second.total_changes(), 0);
    assert_eq!(test.store.stats().await.unwrap(), stats);
}

#[tokio::test]
async fn test_server_behind_local_leaves_log_unchanged() {
    let test = TestStore::new().await;
    let reconciler = Reconciler::new(test.store.clone());

    let long = SnapshotBuilder::new()
        .chatroom(room("r1", "a@x b@x", vec![message("m1", 1, "a@x"), message("m2", 2, "a@x")]))
        .build();
    reconciler.reconcile(long, "p1").await;
    let before = test.store.fetch_chatroom("r1").await.unwrap().unwrap();

    let short = SnapshotBuilder::new()
        .chatroom(room("r1", "a@x b@x c@x", vec![message("m1", 1, "a@x b@x")]))
        .build();
    let report = reconciler.reconcile(short, "p2").await;

    assert_eq!(
        report.violations,
        vec![ConsistencyViolation::ServerBehindLocal {
            chatroom_id: "r1".to_string(),
            local_len: 2,
            server_len: 1,
        }]
    );
    let after = test.store.fetch_chatroom("r1").await.unwrap().unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_local_entry_missing_on_server() {
    let test = TestStore::new().await;
    let reconciler = Reconciler::new(test.store.clone());
    let merger = PushMerger::new(test.store.clone());
    let mut projection = Projection::new();

    reconciler
        .reconcile(
            SnapshotBuilder::new()
                .chatroom(room("r1", "a@x b@x", vec![message("m1", 1, "")]))
                .build(),
            "p1",
        )
        .await;
    projection.replace_with(Projection::load(&test.store).await.unwrap());
    merger
        .merge(&mut projection, message_event("r1", "local-only", 2, None))
        .await;

    let snapshot = SnapshotBuilder::new()
        .chatroom(room("r1", "a@x b@x", vec![message("m1", 1, ""), message("m3", 3, "")]))
        .build();
    let report = reconciler.reconcile(snapshot, "p2").await;
    assert_eq!(
        report.violations,
        vec![ConsistencyViolation::LogEntryNotFoundOnServer {
            chatroom_id: "r1".to_string(),
            entry_id: "local-only".to_string(),
        }]
    );

    let stored = test.store.fetch_chatroom("r1").await.unwrap().unwrap();
    assert!(!stored.contains_entry("m3"));
}

#[tokio::test]
async fn test_duplicate_insert_rejected() {
    let test = TestStore::new().await;
    Reconciler::new(test.store.clone())
        .reconcile(
            SnapshotBuilder::new()
                .chatroom(room("r1", "a@x b@x", vec![message("m1", 1, "a@x")]))
                .build(),
            "p1",
        )
        .await;
    let before = test.store.fetch_chatroom("r1").await.unwrap().unwrap();

    let duplicate = message("m1", 5, "").to_entry("r1").unwrap();
    let result = test
        .store
        .mutate("duplicate", move |conn| {
            Box::pin(async move { log_entries::insert_entry(conn, "r1", &duplicate).await })
        })
        .await;

    crate::assert_violation!(result, ConsistencyViolation::DuplicateLogEntryId { .. });
    assert_eq!(test.store.fetch_chatroom("r1").await.unwrap().unwrap(), before);
}
