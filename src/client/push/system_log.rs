use crate::client::local_db::{chatrooms, log_entries};
use crate::client::state::Projection;
use crate::shared::error::ConsistencyViolation;
use crate::shared::event::SystemLogEvent;
use crate::shared::messaging::{LogEntry, SystemMessage, SystemMessageKind};

use super::{MergeOutcome, PushMerger};

fn apply_to_projection(
    projection: &mut Projection,
    chatroom_id: &str,
    kind: SystemMessageKind,
    member: &str,
    entry: &SystemMessage,
) -> Result<(), ConsistencyViolation> {
    match kind {
        SystemMessageKind::Enter => {
            if projection
                .chatroom(chatroom_id)
                .is_some_and(|room| room.contains_entry(&entry.id))
            {
                return Ok(());
            }
            projection.add_member(chatroom_id, member)?;
            projection.append_entry(chatroom_id, LogEntry::System(entry.clone()))
        }
        SystemMessageKind::Exit => {
            projection.append_entry(chatroom_id, LogEntry::System(entry.clone()))?;
            for participant in entry.participants() {
                projection.remove_member(chatroom_id, participant)?;
            }
            Ok(())
        }
        SystemMessageKind::Start => {
            projection.append_entry(chatroom_id, LogEntry::System(entry.clone()))
        }
    }
}

impl PushMerger {
    /// Record a membership change and apply it to the audience
    ///
    /// `enter` adds each entered member and appends one entry per member,
    /// skipping entries already present. `exit` appends then removes the
    /// participants. `start` only appends.
    pub(super) async fn merge_system_log(
        &self,
        projection: &mut Projection,
        event: SystemLogEvent,
    ) -> MergeOutcome {
        let (kind, entries) = match event.system_kind().and_then(|kind| Ok((kind, event.to_entries()?))) {
            Ok(converted) => converted,
            Err(violation) => return MergeOutcome::Dropped(violation.into()),
        };
        if entries.is_empty() {
            return MergeOutcome::Ignored;
        }

        for (member, entry) in &entries {
            if let Err(violation) = apply_to_projection(projection, &event.roomid, kind, member, entry) {
                tracing::debug!(error = %violation, "projection skipped system entry");
                break;
            }
        }

        let chatroom_id = event.roomid;
        let result = self
            .store
            .mutate("merge_system_log", move |conn| {
                Box::pin(async move {
                    if !chatrooms::exists(conn, &chatroom_id).await? {
                        return Err(ConsistencyViolation::ChatroomNotFoundLocally { chatroom_id }.into());
                    }
                    let mut changed = 0usize;
                    for (member, entry) in entries {
                        match kind {
                            SystemMessageKind::Enter => {
                                if log_entries::entry_exists(conn, &chatroom_id, &entry.id).await? {
                                    continue;
                                }
                                chatrooms::add_member(conn, &chatroom_id, &member).await?;
                                log_entries::insert_entry(conn, &chatroom_id, &LogEntry::System(entry)).await?;
                            }
                            SystemMessageKind::Exit => {
                                let participants: Vec<String> =
                                    entry.participants().into_iter().map(str::to_string).collect();
                                log_entries::insert_entry(conn, &chatroom_id, &LogEntry::System(entry)).await?;
                                for participant in &participants {
                                    chatrooms::remove_member(conn, &chatroom_id, participant).await?;
                                }
                            }
                            SystemMessageKind::Start => {
                                log_entries::insert_entry(conn, &chatroom_id, &LogEntry::System(entry)).await?;
                            }
                        }
                        changed += 1;
                    }
                    Ok(changed)
                })
            })
            .await;

        MergeOutcome::from_store(result, |changed| changed > 0)
    }
}
