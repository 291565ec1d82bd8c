use std::iter;

use crate::client::local_db::{chatrooms, log_entries};
use crate::client::state::Projection;
use crate::shared::error::{ConsistencyViolation, StoreError};
use crate::shared::event::{ReactionEvent, ReadReceiptEvent};
use crate::shared::messaging::Reaction;

use super::{MergeOutcome, PushMerger};

/// Messages matched locally and stored values that changed
type Tally = (usize, usize);

fn tally_outcome(result: Result<Tally, StoreError>) -> MergeOutcome {
    match result {
        Ok((0, _)) => MergeOutcome::Ignored,
        other => MergeOutcome::from_store(other, |(_, changed)| changed > 0),
    }
}

impl PushMerger {
    /// Union the reader into every listed message's read set
    ///
    /// Ids that are not user messages in the room are skipped.
    pub(super) async fn merge_read_receipt(
        &self,
        projection: &mut Projection,
        event: ReadReceiptEvent,
    ) -> MergeOutcome {
        for entry_id in &event.idlist {
            if let Err(violation) =
                projection.add_readers(&event.chatroomid, entry_id, iter::once(&event.who))
            {
                tracing::debug!(error = %violation, "projection skipped read receipt");
                break;
            }
        }

        let ReadReceiptEvent { chatroomid: chatroom_id, idlist, who } = event;
        let result = self
            .store
            .mutate("merge_read_receipt", move |conn| {
                Box::pin(async move {
                    if !chatrooms::exists(conn, &chatroom_id).await? {
                        return Err(ConsistencyViolation::ChatroomNotFoundLocally { chatroom_id }.into());
                    }
                    let mut matched = 0;
                    let mut added = 0;
                    for entry_id in &idlist {
                        if log_entries::entry_variant(conn, &chatroom_id, entry_id).await?.as_deref()
                            != Some("user")
                        {
                            tracing::debug!(chatroom_id = %chatroom_id, entry_id = %entry_id, "read receipt for unknown message");
                            continue;
                        }
                        matched += 1;
                        added += log_entries::add_readers(conn, &chatroom_id, entry_id, iter::once(&who)).await?;
                    }
                    Ok((matched, added))
                })
            })
            .await;

        tally_outcome(result)
    }

    /// Add a `(who, emoji)` reaction to a user message
    pub(super) async fn merge_reaction(
        &self,
        projection: &mut Projection,
        event: ReactionEvent,
    ) -> MergeOutcome {
        let reaction = Reaction {
            who: event.who,
            emoji: event.emoji,
        };
        if let Err(violation) = projection.add_reaction(&event.roomid, &event.chatid, reaction.clone()) {
            tracing::debug!(error = %violation, "projection skipped reaction");
        }

        let chatroom_id = event.roomid;
        let entry_id = event.chatid;
        let result = self
            .store
            .mutate("merge_reaction", move |conn| {
                Box::pin(async move {
                    if !chatrooms::exists(conn, &chatroom_id).await? {
                        return Err(ConsistencyViolation::ChatroomNotFoundLocally { chatroom_id }.into());
                    }
                    if log_entries::entry_variant(conn, &chatroom_id, &entry_id).await?.as_deref() != Some("user") {
                        return Ok((0, 0));
                    }
                    let added = log_entries::add_reaction(conn, &chatroom_id, &entry_id, &reaction).await?;
                    Ok((1, usize::from(added)))
                })
            })
            .await;

        tally_outcome(result)
    }
}
