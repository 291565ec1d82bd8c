use crate::client::local_db::{chatrooms, log_entries};
use crate::client::state::Projection;
use crate::shared::error::ConsistencyViolation;
use crate::shared::event::MessageEvent;
use crate::shared::messaging::Chatroom;

use super::{MergeOutcome, PushMerger};

impl PushMerger {
    /// Append a message, creating a shell chatroom for an unknown room
    ///
    /// The shell is built from the event's audience list. Without one, an
    /// unknown room fails with `ChatroomNotFoundLocally`.
    pub(super) async fn merge_message(
        &self,
        projection: &mut Projection,
        event: MessageEvent,
    ) -> MergeOutcome {
        let entry = match event.to_entry() {
            Ok(entry) => entry,
            Err(violation) => return MergeOutcome::Dropped(violation.into()),
        };
        let shell = event.audience().map(|audience| {
            let kind = event.chatroom_kind(&audience);
            Chatroom::new(event.roomid.clone(), audience, kind)
        });

        if let Some(shell) = &shell {
            projection.ensure_chatroom(shell.clone());
        }
        if let Err(violation) = projection.append_entry(&event.roomid, entry.clone()) {
            tracing::debug!(error = %violation, "projection skipped message");
        }

        let chatroom_id = event.roomid;
        let result = self
            .store
            .mutate("merge_message", move |conn| {
                Box::pin(async move {
                    if !chatrooms::exists(conn, &chatroom_id).await? {
                        let Some(shell) = shell else {
                            return Err(ConsistencyViolation::ChatroomNotFoundLocally { chatroom_id }.into());
                        };
                        chatrooms::insert(conn, &shell).await?;
                        tracing::info!(chatroom_id = %chatroom_id, "created shell chatroom");
                    }
                    log_entries::insert_entry(conn, &chatroom_id, &entry).await
                })
            })
            .await;

        MergeOutcome::from_store(result, |written| written)
    }
}
