//! Engine loop driven through its handle

use crate::common::*;
use chatmirror::client::config::Session;
use chatmirror::client::engine::{LocalChange, SyncEngine, SyncHandle};
use chatmirror::client::sync::SyncPhase;
use chatmirror::shared::config::EngineConfig;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

async fn start(dir: &TempDir, source: FakeSource) -> (SyncHandle, JoinHandle<()>) {
    let config = EngineConfig::builder()
        .server_url("http://127.0.0.1:9".to_string())
        .database_path(dir.path().join("engine.db"))
        .build()
        .unwrap();
    let session = Session::new(config, "a@x".to_string());
    let (engine, handle) = SyncEngine::open(session, source).await.unwrap();
    (handle, tokio::spawn(engine.run()))
}

async fn wait_for_passes(handle: &SyncHandle, finished: u64) {
    let mut status = handle.subscribe_status();
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|status| {
            status.phase == SyncPhase::Idle
                && status.metrics.successful_passes + status.metrics.failed_passes >= finished
        }),
    )
    .await
    .expect("pass did not finish in time")
    .unwrap();
}

#[tokio::test]
async fn test_stale_pass_is_cancelled() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::new()
        .reply_after(
            Duration::from_millis(300),
            SnapshotBuilder::new().chatroom(room("stale", "a@x b@x", vec![])).build(),
        )
        .reply(SnapshotBuilder::new().chatroom(room("fresh", "a@x b@x", vec![])).build());
    let (handle, task) = start(&dir, source.clone()).await;

    handle.request_reconcile();
    handle.request_reconcile();
    wait_for_passes(&handle, 1).await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(source.fetches(), 2);
    crate::assert_room_ids!(handle.projection().chatrooms.keys(), ["fresh"]);
    let status = handle.status();
    assert_eq!(status.metrics.successful_passes, 1);
    assert!(status.current_pass.is_none());
    assert!(status.last_sync.is_some());

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn test_fetch_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let (handle, task) = start(&dir, FakeSource::new().fail_with(500)).await;

    handle.request_reconcile();
    wait_for_passes(&handle, 1).await;

    let status = handle.status();
    assert_eq!(status.metrics.failed_passes, 1);
    assert!(status.last_error.unwrap().contains("500"));

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn test_pushes_and_local_changes_flow_through_handle() {
    let dir = TempDir::new().unwrap();
    let source = FakeSource::new()
        .reply(SnapshotBuilder::new().chatroom(room("r1", "a@x b@x", vec![message("m1", 1, "a@x")])).build());
    let (handle, task) = start(&dir, source).await;

    handle.request_reconcile();
    wait_for_passes(&handle, 1).await;

    assert!(handle.push(read_receipt("r1", &["m1"], "b@x")));
    assert!(handle
        .push_json(
            r#"{"eventKind": "friendRequest", "fromemail": "z@x", "timestamp": "2024-03-01T12:00:00Z"}"#
        )
        .unwrap());
    handle.local_change(LocalChange::SetNotificationMuted {
        chatroom_id: "r1".to_string(),
        muted: true,
    });

    let mut projection = handle.subscribe_projection();
    tokio::time::timeout(
        Duration::from_secs(5),
        projection.wait_for(|projection| {
            projection
                .chatroom("r1")
                .is_some_and(|room| room.notification_muted)
        }),
    )
    .await
    .unwrap()
    .unwrap();

    let projection = handle.projection();
    let room = projection.chatroom("r1").unwrap();
    let readers = &room.entry("m1").and_then(|entry| entry.as_user()).unwrap().read_by;
    assert_eq!(readers.len(), 2);
    assert_eq!(projection.pending_requests().count(), 1);
    assert_eq!(handle.status().metrics.events_applied, 2);

    handle.shutdown();
    task.await.unwrap();
    assert!(!handle.request_reconcile());
}
