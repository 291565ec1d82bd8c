//! Scripted snapshot source
//!
//! Stands in for the network collaborator: each fetch pops the next
//! scripted reply and resolves it after its delay.

use chatmirror::client::sync::{FetchError, SnapshotSource};
use chatmirror::shared::snapshot::Snapshot;
use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub enum Reply {
    Snapshot(Snapshot),
    Status(u16),
}

#[derive(Clone, Default)]
pub struct FakeSource {
    replies: Arc<Mutex<VecDeque<(Duration, Reply)>>>,
    fetches: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, snapshot: Snapshot) -> Self {
        self.reply_after(Duration::ZERO, snapshot)
    }

    pub fn reply_after(self, delay: Duration, snapshot: Snapshot) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back((delay, Reply::Snapshot(snapshot)));
        self
    }

    pub fn fail_with(self, status: u16) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back((Duration::ZERO, Reply::Status(status)));
        self
    }

    /// Number of fetches started so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for FakeSource {
    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<Snapshot, FetchError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some((delay, reply)) => {
                    tokio::time::sleep(delay).await;
                    match reply {
                        Reply::Snapshot(snapshot) => Ok(snapshot),
                        Reply::Status(status) => Err(FetchError::Status(status)),
                    }
                }
                None => Err(FetchError::Status(503)),
            }
        })
    }
}
