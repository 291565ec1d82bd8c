//! Local store test fixtures
//!
//! Every test gets its own SQLite file inside a temporary directory that is
//! removed when the fixture is dropped.

use chatmirror::client::local_db::{chatrooms, LocalStore};
use chatmirror::shared::messaging::Chatroom;
use tempfile::TempDir;

/// Test store fixture
///
/// Keep it alive for the duration of the test; dropping it deletes the file.
pub struct TestStore {
    pub store: LocalStore,
    _dir: TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStore::open(dir.path().join("mirror.db"))
            .await
            .expect("Failed to open test store");
        Self { store, _dir: dir }
    }

    /// Insert a chatroom with its log, bypassing reconciliation
    pub async fn seed_chatroom(&self, room: Chatroom) {
        self.store
            .mutate("seed_chatroom", move |conn| {
                Box::pin(async move { chatrooms::insert(conn, &room).await })
            })
            .await
            .expect("Failed to seed chatroom");
    }
}
