//! # Local Database Module
//!
//! The durable, offline-capable mirror of chat state, kept in SQLite.
//!
//! ## Architecture
//!
//! - **Read view**: a WAL-mode connection pool. Reads never wait on the writer
//!   and see every transaction committed before they started.
//! - **Write lane**: one tokio task owning one connection. Every mutation is a
//!   job on its FIFO queue, runs inside its own transaction, and hands its
//!   result back through a oneshot owned by the job.
//!
//! A job that returns `Err` is rolled back in full; callers observe either
//! "applied" or "not applied".
//!
//! ## Key Components
//!
//! - `LocalStore`: read view, write lane, and the typed fetch/mutate surface
//! - `schema.rs`: schema creation and migrations
//! - `chatrooms.rs`: chatrooms, audience and local settings
//! - `log_entries.rs`: log entries, read receipts, reactions, whisper targets
//! - `friends.rs`: friends and friend notifications
//! - `bundles.rs`: chatroom bundles
//! - `sync.rs`: synchronization metadata
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chatmirror::client::local_db::{chatrooms, LocalStore};
//!
//! # async fn demo() -> Result<(), chatmirror::shared::StoreError> {
//! let store = LocalStore::open("/tmp/chatmirror.db").await?;
//!
//! store
//!     .mutate("mute", |conn| Box::pin(async move {
//!         chatrooms::set_notification_muted(conn, "r1", true).await
//!     }))
//!     .await?;
//!
//! let muted = store.fetch_chatrooms_where(|room| room.notification_muted).await?;
//! # Ok(())
//! # }
//! ```

pub mod schema;
pub mod chatrooms;
pub mod log_entries;
pub mod friends;
pub mod bundles;
pub mod sync;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Connection, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::shared::error::StoreError;
use crate::shared::messaging::{Chatroom, ChatroomBundle, Friend, FriendNotification, WhisperTarget};

/// Maximum concurrent readers
const READ_POOL_SIZE: u32 = 4;

/// A queued unit of work for the write lane
type WriteJob = Box<dyn for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, ()> + Send>;

fn write_job<F>(job: F) -> WriteJob
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, ()> + Send + 'static,
{
    Box::new(job)
}

/// Local store handle
///
/// Cheap to clone; all clones share the read view and the write lane. The
/// write lane stops once every handle has been dropped and its queue drained.
#[derive(Debug, Clone)]
pub struct LocalStore {
    read_pool: SqlitePool,
    write_tx: mpsc::UnboundedSender<WriteJob>,
    path: PathBuf,
}

impl LocalStore {
    /// Open or create the store at `path`
    ///
    /// Creates the parent directory and the database file if missing, runs
    /// the schema on the write connection, then starts the write lane.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let mut write_conn = options.connect().await?;
        schema::initialize(&mut write_conn).await?;

        let read_pool = SqlitePoolOptions::new()
            .max_connections(READ_POOL_SIZE)
            .connect_with(options)
            .await?;

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_worker(write_conn, write_rx));

        tracing::info!(path = %path.display(), "local store opened");
        Ok(Self {
            read_pool,
            write_tx,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` as one transaction on the write lane
    ///
    /// Jobs run strictly one at a time in submission order. `Ok` commits,
    /// `Err` rolls back everything `f` did. Once submitted, the job runs to
    /// completion even if the returned future is dropped.
    pub async fn mutate<T, F>(&self, label: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>>
            + Send
            + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = write_job(move |conn| {
            Box::pin(async move {
                let result = run_in_transaction(conn, label, f).await;
                if reply_tx.send(result).is_err() {
                    tracing::debug!(label, "mutation caller went away before the result");
                }
            })
        });

        self.write_tx
            .send(job)
            .map_err(|_| StoreError::WorkerGone)?;
        reply_rx.await.map_err(|_| StoreError::WorkerGone)?
    }

    /// Run `f` inside one read transaction on the read view
    ///
    /// Every query `f` issues sees the same committed state, even when the
    /// write lane commits in between. Nothing is written; the transaction is
    /// rolled back when `f` returns.
    pub async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>>,
    {
        let mut conn = self.read_pool.acquire().await?;
        let mut tx = conn.begin().await?;
        let result = f(&mut *tx).await;
        tx.rollback().await?;
        result
    }

    /// All chatrooms with audience and log
    pub async fn fetch_chatrooms(&self) -> Result<Vec<Chatroom>, StoreError> {
        self.read(|conn| Box::pin(async move { chatrooms::load_all(conn).await }))
            .await
    }

    /// Chatrooms matching `predicate`
    pub async fn fetch_chatrooms_where<P>(&self, predicate: P) -> Result<Vec<Chatroom>, StoreError>
    where
        P: Fn(&Chatroom) -> bool,
    {
        let rooms = self.fetch_chatrooms().await?;
        Ok(rooms.into_iter().filter(|room| predicate(room)).collect())
    }

    pub async fn fetch_chatroom(&self, chatroom_id: &str) -> Result<Option<Chatroom>, StoreError> {
        let chatroom_id = chatroom_id.to_string();
        self.read(move |conn| Box::pin(async move { chatrooms::load(conn, &chatroom_id).await }))
            .await
    }

    pub async fn fetch_chatroom_ids(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut conn = self.read_pool.acquire().await?;
        chatrooms::ids(&mut conn).await
    }

    pub async fn fetch_friends(&self) -> Result<Vec<Friend>, StoreError> {
        let mut conn = self.read_pool.acquire().await?;
        friends::load(&mut conn).await
    }

    pub async fn fetch_friend_notifications(&self) -> Result<Vec<FriendNotification>, StoreError> {
        let mut conn = self.read_pool.acquire().await?;
        friends::load_notifications(&mut conn).await
    }

    pub async fn fetch_whisper_targets(&self) -> Result<Vec<WhisperTarget>, StoreError> {
        let mut conn = self.read_pool.acquire().await?;
        log_entries::load_whisper_targets(&mut conn).await
    }

    pub async fn fetch_bundles(&self) -> Result<Vec<ChatroomBundle>, StoreError> {
        let mut conn = self.read_pool.acquire().await?;
        bundles::load_all(&mut conn).await
    }

    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut conn = self.read_pool.acquire().await?;
        sync::get_last_sync_time(&mut conn).await
    }

    pub async fn account_suspended(&self) -> Result<bool, StoreError> {
        let mut conn = self.read_pool.acquire().await?;
        sync::account_suspended(&mut conn).await
    }

    /// Insert or update a bundle
    pub async fn upsert_bundle(&self, bundle: ChatroomBundle) -> Result<(), StoreError> {
        self.mutate("upsert_bundle", move |conn| {
            Box::pin(async move { bundles::upsert(conn, &bundle).await })
        })
        .await
    }

    pub async fn delete_bundle(&self, bundle_id: &str) -> Result<bool, StoreError> {
        let bundle_id = bundle_id.to_string();
        self.mutate("delete_bundle", move |conn| {
            Box::pin(async move { bundles::delete(conn, &bundle_id).await })
        })
        .await
    }

    /// Move a chatroom into a bundle; it leaves any bundle it was in before
    pub async fn assign_chatroom_to_bundle(
        &self,
        bundle_id: &str,
        chatroom_id: &str,
    ) -> Result<bool, StoreError> {
        let bundle_id = bundle_id.to_string();
        let chatroom_id = chatroom_id.to_string();
        self.mutate("assign_chatroom_to_bundle", move |conn| {
            Box::pin(async move { bundles::assign_chatroom(conn, &bundle_id, &chatroom_id).await })
        })
        .await
    }

    pub async fn set_title_override(
        &self,
        chatroom_id: &str,
        title: Option<String>,
    ) -> Result<(), StoreError> {
        let chatroom_id = chatroom_id.to_string();
        self.mutate("set_title_override", move |conn| {
            Box::pin(async move {
                chatrooms::set_title_override(conn, &chatroom_id, title.as_deref()).await
            })
        })
        .await
    }

    pub async fn set_notification_muted(
        &self,
        chatroom_id: &str,
        muted: bool,
    ) -> Result<(), StoreError> {
        let chatroom_id = chatroom_id.to_string();
        self.mutate("set_notification_muted", move |conn| {
            Box::pin(async move { chatrooms::set_notification_muted(conn, &chatroom_id, muted).await })
        })
        .await
    }

    /// Delete a chatroom and drop it from any bundle
    pub async fn delete_chatroom(&self, chatroom_id: &str) -> Result<bool, StoreError> {
        let chatroom_id = chatroom_id.to_string();
        self.mutate("delete_chatroom", move |conn| {
            Box::pin(async move {
                bundles::unassign_chatroom(conn, &chatroom_id).await?;
                chatrooms::delete(conn, &chatroom_id).await
            })
        })
        .await
    }

    /// Get database statistics
    ///
    /// Returns basic statistics about the local store for debugging.
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.read(|conn| Box::pin(count_rows(conn))).await
    }
}

async fn count_rows(conn: &mut SqliteConnection) -> Result<StoreStats, StoreError> {
    let (chatroom_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chatrooms")
        .fetch_one(&mut *conn)
        .await?;
    let (log_entry_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM log_entries")
        .fetch_one(&mut *conn)
        .await?;
    let (friend_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM friends")
        .fetch_one(&mut *conn)
        .await?;
    let (notification_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM friend_notifications")
            .fetch_one(&mut *conn)
            .await?;
    let (bundle_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bundles")
        .fetch_one(&mut *conn)
        .await?;

    Ok(StoreStats {
        chatroom_count: chatroom_count as u64,
        log_entry_count: log_entry_count as u64,
        friend_count: friend_count as u64,
        notification_count: notification_count as u64,
        bundle_count: bundle_count as u64,
    })
}

async fn run_in_transaction<T, F>(
    conn: &mut SqliteConnection,
    label: &'static str,
    f: F,
) -> Result<T, StoreError>
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>>,
{
    let mut tx = conn.begin().await?;
    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::error!(label, error = %rollback_error, "rollback failed");
            }
            tracing::debug!(label, error = %error, "transaction rolled back");
            Err(error)
        }
    }
}

async fn write_worker(mut conn: SqliteConnection, mut jobs: mpsc::UnboundedReceiver<WriteJob>) {
    while let Some(job) = jobs.recv().await {
        job(&mut conn).await;
    }
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "closing write connection failed");
    }
    tracing::debug!("local store write lane stopped");
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub chatroom_count: u64,
    pub log_entry_count: u64,
    pub friend_count: u64,
    pub notification_count: u64,
    pub bundle_count: u64,
}
