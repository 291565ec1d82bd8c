//! Local store behaviour visible through its public surface

use crate::common::*;
use chatmirror::client::local_db::{log_entries, LocalStore};
use chatmirror::client::sync::Reconciler;
use chatmirror::shared::error::ConsistencyViolation;
use chatmirror::shared::messaging::ChatroomBundle;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

async fn two_rooms(test: &TestStore) {
    Reconciler::new(test.store.clone())
        .reconcile(
            SnapshotBuilder::new()
                .chatroom(room("r1", "a@x b@x", vec![message("m1", 1, "a@x")]))
                .chatroom(room("r2", "a@x c@x", vec![]))
                .build(),
            "seed",
        )
        .await;
}

#[tokio::test]
async fn test_bundle_membership_is_exclusive() {
    let test = TestStore::new().await;
    two_rooms(&test).await;

    test.store.upsert_bundle(ChatroomBundle::new("work", "Work")).await.unwrap();
    test.store.upsert_bundle(ChatroomBundle::new("home", "Home")).await.unwrap();
    assert!(test.store.assign_chatroom_to_bundle("work", "r1").await.unwrap());
    assert!(test.store.assign_chatroom_to_bundle("work", "r2").await.unwrap());
    assert!(test.store.assign_chatroom_to_bundle("home", "r1").await.unwrap());
    assert!(!test.store.assign_chatroom_to_bundle("nope", "r1").await.unwrap());

    let bundles = test.store.fetch_bundles().await.unwrap();
    let members: Vec<(&str, Vec<&str>)> = bundles
        .iter()
        .map(|bundle| (bundle.id.as_str(), bundle.member_chatroom_ids.iter().map(String::as_str).collect()))
        .collect();
    assert_eq!(members, vec![("home", vec!["r1"]), ("work", vec!["r2"])]);
}

#[tokio::test]
async fn test_delete_chatroom_clears_bundles() {
    let test = TestStore::new().await;
    two_rooms(&test).await;
    test.store.upsert_bundle(ChatroomBundle::new("work", "Work")).await.unwrap();
    test.store.assign_chatroom_to_bundle("work", "r1").await.unwrap();

    assert!(test.store.delete_chatroom("r1").await.unwrap());
    assert!(!test.store.delete_chatroom("r1").await.unwrap());

    crate::assert_room_ids!(test.store.fetch_chatroom_ids().await.unwrap(), ["r2"]);
    assert!(test.store.fetch_bundles().await.unwrap()[0].member_chatroom_ids.is_empty());
}

#[tokio::test]
async fn test_local_settings_survive_reconciliation() {
    let test = TestStore::new().await;
    two_rooms(&test).await;
    test.store
        .set_title_override("r1", Some("Team".to_string()))
        .await
        .unwrap();

    two_rooms(&test).await;
    let stored = test.store.fetch_chatroom("r1").await.unwrap().unwrap();
    assert_eq!(stored.title_override.as_deref(), Some("Team"));
}

#[tokio::test]
async fn test_fetch_chatrooms_where() {
    let test = TestStore::new().await;
    two_rooms(&test).await;

    let with_c = test
        .store
        .fetch_chatrooms_where(|room| room.audience.contains("c@x"))
        .await
        .unwrap();
    let ids: Vec<&str> = with_c.iter().map(|room| room.id.as_str()).collect();
    assert_eq!(ids, vec!["r2"]);
}

#[tokio::test]
async fn test_missing_chatroom_rejected() {
    let test = TestStore::new().await;
    let entry = message("m1", 1, "").to_entry("ghost").unwrap();
    let result = test
        .store
        .mutate("append", move |conn| {
            Box::pin(async move { log_entries::insert_entry(conn, "ghost", &entry).await })
        })
        .await;
    crate::assert_violation!(
        result,
        ConsistencyViolation::ChatroomNotFoundLocally { .. }
    );
}

#[tokio::test]
async fn test_state_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("mirror.db");
    {
        let store = LocalStore::open(&path).await.unwrap();
        Reconciler::new(store.clone())
            .reconcile(
                SnapshotBuilder::new()
                    .chatroom(room("r1", "a@x b@x", vec![message("m1", 1, "a@x")]))
                    .friend("b@x", None)
                    .build(),
                "p1",
            )
            .await;
    }

    let reopened = LocalStore::open(&path).await.unwrap();
    let stats = crate::assert_ok!(reopened.stats().await);
    assert_eq!(stats.chatroom_count, 1);
    assert_eq!(stats.log_entry_count, 1);
    assert_eq!(stats.friend_count, 1);
    assert!(reopened.last_sync_time().await.unwrap().is_some());
}
