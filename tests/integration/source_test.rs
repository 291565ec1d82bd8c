//! HTTP snapshot source against a mock server

use assert_matches::assert_matches;
use chatmirror::client::config::Session;
use chatmirror::client::sync::{FetchError, HttpSnapshotSource, SnapshotSource};
use chatmirror::shared::config::EngineConfig;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_for(server: &MockServer, token: Option<&str>) -> Session {
    let config = EngineConfig::builder()
        .server_url(server.uri())
        .build()
        .unwrap();
    let mut session = Session::new(config, "a@x".to_string());
    session.set_token(token.map(str::to_string));
    session
}

#[tokio::test]
async fn test_fetch_snapshot_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sync/snapshot"))
        .and(header("authorization", "Bearer t0k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "friends": [{"email": "b@x", "nickname": "Bee"}],
            "chatrooms": [{
                "id": "r1",
                "audience": "a@x b@x",
                "kind": "pair",
                "muted": false,
                "messageLogs": [{
                    "id": "m1", "kind": "text", "writer": "b@x", "detail": "hi",
                    "timestamp": "2024-03-01T12:00:00Z", "readBy": "b@x"
                }],
                "systemLogs": []
            }],
            "friendNotifications": [],
            "whisperTargets": [],
            "accountSuspended": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpSnapshotSource::new(&session_for(&server, Some("t0k"))).unwrap();
    let snapshot = source.fetch_snapshot().await.unwrap();

    assert_eq!(snapshot.chatrooms.len(), 1);
    assert_eq!(snapshot.chatrooms[0].message_logs[0].read_by, "b@x");
    assert_eq!(snapshot.friends()[0].display_name(), "Bee");
}

#[tokio::test]
async fn test_fetch_snapshot_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let source = HttpSnapshotSource::new(&session_for(&server, None)).unwrap();
    assert_matches!(source.fetch_snapshot().await, Err(FetchError::Unauthorized(401)));
}

#[tokio::test]
async fn test_fetch_snapshot_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let source = HttpSnapshotSource::new(&session_for(&server, None)).unwrap();
    assert_matches!(source.fetch_snapshot().await, Err(FetchError::Status(503)));
}

#[tokio::test]
async fn test_fetch_snapshot_bad_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{ not json"))
        .mount(&server)
        .await;

    let source = HttpSnapshotSource::new(&session_for(&server, None)).unwrap();
    assert_matches!(source.fetch_snapshot().await, Err(FetchError::Decode(_)));
}
