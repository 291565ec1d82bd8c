//! Projection State
//!
//! The in-memory view of chat state consumed by the UI. It is owned by the
//! engine loop and only ever mutated from there, so none of it is behind a
//! lock. Mutation methods mirror the local store operations; after every
//! reconciliation pass the projection is rebuilt from the store.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::client::local_db::{bundles, chatrooms, friends, log_entries, sync, LocalStore};
use crate::shared::error::{ConsistencyViolation, StoreError};
use crate::shared::messaging::{
    Chatroom, ChatroomBundle, Friend, FriendNotification, LogEntry, Reaction, UserMessage,
    WhisperTarget,
};

/// In-memory projection of the local mirror
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    /// Chatrooms by id
    pub chatrooms: BTreeMap<String, Chatroom>,
    /// Friends by email
    pub friends: BTreeMap<String, Friend>,
    pub friend_notifications: Vec<FriendNotification>,
    pub whisper_targets: Vec<WhisperTarget>,
    pub bundles: Vec<ChatroomBundle>,
    pub account_suspended: bool,
    /// Completion time of the last successful reconciliation pass
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a projection from the store's read view
    ///
    /// All families come from one read transaction, so the projection never
    /// mixes two commits.
    pub async fn load(store: &LocalStore) -> Result<Self, StoreError> {
        store
            .read(|conn| {
                Box::pin(async move {
                    let rooms = chatrooms::load_all(conn)
                        .await?
                        .into_iter()
                        .map(|room| (room.id.clone(), room))
                        .collect();
                    let contacts = friends::load(conn)
                        .await?
                        .into_iter()
                        .map(|friend| (friend.email.clone(), friend))
                        .collect();

                    Ok(Self {
                        chatrooms: rooms,
                        friends: contacts,
                        friend_notifications: friends::load_notifications(conn).await?,
                        whisper_targets: log_entries::load_whisper_targets(conn).await?,
                        bundles: bundles::load_all(conn).await?,
                        account_suspended: sync::account_suspended(conn).await?,
                        last_sync_time: sync::get_last_sync_time(conn).await?,
                    })
                })
            })
            .await
    }

    /// Replace everything with a fresh load, carrying over entries still
    /// pending delivery in rooms that survived.
    pub fn replace_with(&mut self, mut fresh: Projection) {
        for (chatroom_id, room) in &self.chatrooms {
            let Some(target) = fresh.chatrooms.get_mut(chatroom_id) else {
                continue;
            };
            for entry in room.log.iter().filter(|entry| entry.is_pending_delivery()) {
                if !target.contains_entry(entry.id()) {
                    // Ids of pending entries are client-generated and cannot
                    // collide with acknowledged ones.
                    let _ = target.insert_entry(entry.clone());
                }
            }
        }
        *self = fresh;
    }

    pub fn chatroom(&self, chatroom_id: &str) -> Option<&Chatroom> {
        self.chatrooms.get(chatroom_id)
    }

    pub fn contains_chatroom(&self, chatroom_id: &str) -> bool {
        self.chatrooms.contains_key(chatroom_id)
    }

    fn chatroom_mut(&mut self, chatroom_id: &str) -> Result<&mut Chatroom, ConsistencyViolation> {
        self.chatrooms
            .get_mut(chatroom_id)
            .ok_or_else(|| ConsistencyViolation::ChatroomNotFoundLocally {
                chatroom_id: chatroom_id.to_string(),
            })
    }

    /// Chatrooms ordered by most recent activity first
    pub fn chatrooms_by_activity(&self) -> Vec<&Chatroom> {
        let mut rooms: Vec<&Chatroom> = self.chatrooms.values().collect();
        rooms.sort_by(|a, b| {
            let a = a.last_entry().map(LogEntry::timestamp);
            let b = b.last_entry().map(LogEntry::timestamp);
            b.cmp(&a)
        });
        rooms
    }

    /// Insert a shell chatroom unless one with the same id exists
    pub fn ensure_chatroom(&mut self, shell: Chatroom) -> bool {
        if self.chatrooms.contains_key(&shell.id) {
            return false;
        }
        self.chatrooms.insert(shell.id.clone(), shell);
        true
    }

    /// Append an acknowledged entry
    ///
    /// A pending entry with the same id is replaced by the acknowledged copy.
    pub fn append_entry(
        &mut self,
        chatroom_id: &str,
        entry: LogEntry,
    ) -> Result<(), ConsistencyViolation> {
        let room = self.chatroom_mut(chatroom_id)?;
        if let Some(index) = room.log.iter().position(|existing| existing.id() == entry.id()) {
            if room.log[index].is_pending_delivery() {
                room.log.remove(index);
            }
        }
        room.insert_entry(entry)
    }

    /// Show a message the user has sent but the server has not acknowledged
    pub fn append_pending(
        &mut self,
        chatroom_id: &str,
        mut message: UserMessage,
    ) -> Result<(), ConsistencyViolation> {
        message.pending_delivery = true;
        self.chatroom_mut(chatroom_id)?
            .insert_entry(LogEntry::User(message))
    }

    /// Union readers into a user message's read set. Returns how many were new.
    pub fn add_readers<'a>(
        &mut self,
        chatroom_id: &str,
        entry_id: &str,
        readers: impl IntoIterator<Item = &'a String>,
    ) -> Result<usize, ConsistencyViolation> {
        Ok(self
            .chatroom_mut(chatroom_id)?
            .user_message_mut(entry_id)
            .map(|message| message.merge_read_by(readers))
            .unwrap_or(0))
    }

    pub fn add_reaction(
        &mut self,
        chatroom_id: &str,
        entry_id: &str,
        reaction: Reaction,
    ) -> Result<bool, ConsistencyViolation> {
        Ok(self
            .chatroom_mut(chatroom_id)?
            .user_message_mut(entry_id)
            .is_some_and(|message| message.add_reaction(reaction)))
    }

    pub fn add_member(&mut self, chatroom_id: &str, email: &str) -> Result<bool, ConsistencyViolation> {
        Ok(self.chatroom_mut(chatroom_id)?.audience.insert(email.to_string()))
    }

    pub fn remove_member(&mut self, chatroom_id: &str, email: &str) -> Result<bool, ConsistencyViolation> {
        Ok(self.chatroom_mut(chatroom_id)?.audience.remove(email))
    }

    pub fn set_title_override(
        &mut self,
        chatroom_id: &str,
        title: Option<String>,
    ) -> Result<(), ConsistencyViolation> {
        self.chatroom_mut(chatroom_id)?.title_override = title;
        Ok(())
    }

    pub fn set_notification_muted(
        &mut self,
        chatroom_id: &str,
        muted: bool,
    ) -> Result<(), ConsistencyViolation> {
        self.chatroom_mut(chatroom_id)?.notification_muted = muted;
        Ok(())
    }

    /// Drop a chatroom and its bundle membership
    pub fn remove_chatroom(&mut self, chatroom_id: &str) -> bool {
        for bundle in &mut self.bundles {
            bundle.remove_member(chatroom_id);
        }
        self.chatrooms.remove(chatroom_id).is_some()
    }

    /// Insert a friend or replace its nickname. Returns true if anything changed.
    pub fn upsert_friend(&mut self, friend: Friend) -> bool {
        match self.friends.get(&friend.email) {
            Some(existing) if existing == &friend => false,
            _ => {
                self.friends.insert(friend.email.clone(), friend);
                true
            }
        }
    }

    pub fn remove_friend(&mut self, email: &str) -> bool {
        self.friends.remove(email).is_some()
    }

    /// Record a notification; a repeat of the same sender and kind refreshes it
    pub fn add_notification(&mut self, notification: FriendNotification) {
        self.friend_notifications.retain(|existing| {
            !(existing.from_email == notification.from_email && existing.kind == notification.kind)
        });
        self.friend_notifications.push(notification);
    }

    pub fn remove_notifications_from(&mut self, email: &str) -> usize {
        let before = self.friend_notifications.len();
        self.friend_notifications
            .retain(|notification| notification.from_email != email);
        before - self.friend_notifications.len()
    }

    /// Pending incoming friend requests
    pub fn pending_requests(&self) -> impl Iterator<Item = &FriendNotification> {
        self.friend_notifications
            .iter()
            .filter(|notification| notification.is_pending_request())
    }

    /// Recipients of a whisper message
    pub fn whisper_recipients(&self, message_id: &str) -> BTreeSet<&str> {
        self.whisper_targets
            .iter()
            .filter(|target| target.message_id == message_id)
            .map(|target| target.recipient_email.as_str())
            .collect()
    }

    /// Messages `me` has not read, across unmuted chatrooms
    pub fn unread_total(&self, me: &str) -> usize {
        self.chatrooms
            .values()
            .filter(|room| !room.notification_muted)
            .flat_map(|room| room.user_messages())
            .filter(|message| message.writer != me && !message.read_by.contains(me))
            .count()
    }
}
