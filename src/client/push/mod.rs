//! # Push Event Merger
//!
//! Applies push-delivered events to the projection and then to the local
//! store. The projection update is synchronous and always happens first; the
//! store update is one `mutate` transaction. A store failure is logged and the
//! event is dropped without undoing the projection change; the next
//! reconciliation pass converges the two.
//!
//! Replays are harmless: receipts and reactions are set unions, and a
//! replayed message or system entry hits the store's duplicate-id guard,
//! which is reported as [`MergeOutcome::AlreadyApplied`].

mod message;
mod receipts;
mod system_log;
mod friends;

use crate::client::local_db::LocalStore;
use crate::client::state::Projection;
use crate::shared::error::{ConsistencyViolation, StoreError};
use crate::shared::event::PushEvent;

/// What merging one event did
#[derive(Debug)]
pub enum MergeOutcome {
    /// The store changed
    Applied,
    /// Everything the event carries was already stored
    AlreadyApplied,
    /// The event referenced nothing that exists locally
    Ignored,
    /// The store transaction failed; the event was dropped
    Dropped(StoreError),
}

impl MergeOutcome {
    /// Whether this outcome counts against sync health
    pub fn is_failure(&self) -> bool {
        matches!(self, MergeOutcome::Dropped(_))
    }

    pub fn violation(&self) -> Option<&ConsistencyViolation> {
        match self {
            MergeOutcome::Dropped(error) => error.violation(),
            _ => None,
        }
    }

    fn from_store<T>(result: Result<T, StoreError>, changed: impl FnOnce(T) -> bool) -> Self {
        match result {
            Ok(value) => {
                if changed(value) {
                    MergeOutcome::Applied
                } else {
                    MergeOutcome::AlreadyApplied
                }
            }
            Err(error) if error.is_already_applied() => MergeOutcome::AlreadyApplied,
            Err(error) => MergeOutcome::Dropped(error),
        }
    }
}

/// Push event merger
#[derive(Debug, Clone)]
pub struct PushMerger {
    store: LocalStore,
}

impl PushMerger {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Merge one event into `projection` and the store
    pub async fn merge(&self, projection: &mut Projection, event: PushEvent) -> MergeOutcome {
        let kind = event.kind();
        let chatroom_id = event.chatroom_id().map(str::to_string);

        let outcome = match event {
            PushEvent::Message(event) => self.merge_message(projection, event).await,
            PushEvent::ReadReceipt(event) => self.merge_read_receipt(projection, event).await,
            PushEvent::Reaction(event) => self.merge_reaction(projection, event).await,
            PushEvent::SystemLog(event) => self.merge_system_log(projection, event).await,
            PushEvent::FriendRequest(event) => self.merge_friend_request(projection, event).await,
            PushEvent::FriendAccept(event) => self.merge_friend_accept(projection, event).await,
            PushEvent::FriendRemove(event) => self.merge_friend_remove(projection, event).await,
        };

        match &outcome {
            MergeOutcome::Dropped(error) => tracing::warn!(
                event_kind = kind.as_str(),
                chatroom_id = chatroom_id.as_deref().unwrap_or("-"),
                error = %error,
                "dropping push event"
            ),
            other => tracing::debug!(
                event_kind = kind.as_str(),
                chatroom_id = chatroom_id.as_deref().unwrap_or("-"),
                outcome = ?other,
                "push event merged"
            ),
        }
        outcome
    }
}
