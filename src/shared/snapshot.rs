//! Authoritative Snapshot
//!
//! Wire format of the server's full view of a user's chat state, and its
//! conversion into the messaging model. Conversion is done per chatroom so a
//! single malformed room does not spoil the rest of the snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::shared::error::ConsistencyViolation;
use crate::shared::messaging::{
    parse_email_list, Chatroom, ChatroomKind, Friend, FriendNotification,
    FriendNotificationKind, LogEntry, SystemMessage, SystemMessageKind, UserMessage,
    UserMessageKind, WhisperTarget,
};

/// Full snapshot response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub friends: Vec<SnapshotFriend>,
    #[serde(default)]
    pub chatrooms: Vec<SnapshotChatroom>,
    #[serde(default)]
    pub friend_notifications: Vec<SnapshotFriendNotification>,
    #[serde(default)]
    pub whisper_targets: Vec<SnapshotWhisperTarget>,
    #[serde(default)]
    pub account_suspended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotFriend {
    pub email: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotChatroom {
    pub id: String,
    /// Space-delimited emails
    #[serde(default)]
    pub audience: String,
    pub kind: String,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub message_logs: Vec<SnapshotMessageLog>,
    #[serde(default)]
    pub system_logs: Vec<SnapshotSystemLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMessageLog {
    pub id: String,
    pub kind: String,
    pub writer: String,
    #[serde(default)]
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    /// Space-delimited emails
    #[serde(default)]
    pub read_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotSystemLog {
    pub id: String,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFriendNotification {
    pub from_email: String,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotWhisperTarget {
    pub message_id: String,
    pub recipient_email: String,
}

impl Snapshot {
    /// Parse a snapshot from a JSON body
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn chatroom_ids(&self) -> BTreeSet<String> {
        self.chatrooms.iter().map(|room| room.id.clone()).collect()
    }

    pub fn friends(&self) -> Vec<Friend> {
        self.friends
            .iter()
            .map(|friend| Friend::new(friend.email.clone(), friend.nickname.clone()))
            .collect()
    }

    /// Notifications with a known kind; unknown kinds are dropped
    pub fn friend_notifications(&self) -> Vec<FriendNotification> {
        self.friend_notifications
            .iter()
            .filter_map(|raw| {
                let kind = FriendNotificationKind::from_str(&raw.kind);
                if kind.is_none() {
                    tracing::warn!(kind = %raw.kind, from = %raw.from_email, "dropping friend notification of unknown kind");
                }
                kind.map(|kind| FriendNotification {
                    from_email: raw.from_email.clone(),
                    kind,
                    timestamp: raw.timestamp,
                })
            })
            .collect()
    }

    pub fn whisper_targets(&self) -> Vec<WhisperTarget> {
        self.whisper_targets
            .iter()
            .map(|raw| WhisperTarget {
                message_id: raw.message_id.clone(),
                recipient_email: raw.recipient_email.clone(),
            })
            .collect()
    }
}

impl SnapshotChatroom {
    pub fn audience(&self) -> BTreeSet<String> {
        parse_email_list(&self.audience)
    }

    pub fn kind(&self) -> ChatroomKind {
        ChatroomKind::from_str(&self.kind).unwrap_or_else(|| ChatroomKind::infer(&self.audience()))
    }

    /// Total number of authoritative log entries, both variants
    pub fn log_len(&self) -> usize {
        self.message_logs.len() + self.system_logs.len()
    }

    /// Convert both log partitions into model entries, ordered by timestamp
    pub fn log_entries(&self) -> Result<Vec<LogEntry>, ConsistencyViolation> {
        let mut room = Chatroom::new(self.id.clone(), BTreeSet::new(), ChatroomKind::Group);
        for raw in &self.message_logs {
            room.insert_entry(raw.to_entry(&self.id)?)?;
        }
        for raw in &self.system_logs {
            room.insert_entry(raw.to_entry(&self.id)?)?;
        }
        Ok(room.log)
    }

    /// Convert into a full chatroom
    pub fn to_chatroom(&self) -> Result<Chatroom, ConsistencyViolation> {
        let mut room = Chatroom::new(self.id.clone(), self.audience(), self.kind());
        room.notification_muted = self.muted;
        room.log = self.log_entries()?;
        Ok(room)
    }
}

impl SnapshotMessageLog {
    pub fn to_entry(&self, chatroom_id: &str) -> Result<LogEntry, ConsistencyViolation> {
        let kind = UserMessageKind::from_str(&self.kind).ok_or_else(|| {
            ConsistencyViolation::UnconvertibleLogEntry {
                chatroom_id: chatroom_id.to_string(),
                entry_id: self.id.clone(),
                kind: self.kind.clone(),
            }
        })?;
        Ok(LogEntry::User(UserMessage {
            id: self.id.clone(),
            kind,
            writer: self.writer.clone(),
            timestamp: self.timestamp,
            detail: self.detail.clone(),
            read_by: parse_email_list(&self.read_by),
            reactions: BTreeSet::new(),
            pending_delivery: false,
        }))
    }
}

impl SnapshotSystemLog {
    pub fn to_entry(&self, chatroom_id: &str) -> Result<LogEntry, ConsistencyViolation> {
        let kind = SystemMessageKind::from_str(&self.kind).ok_or_else(|| {
            ConsistencyViolation::UnconvertibleLogEntry {
                chatroom_id: chatroom_id.to_string(),
                entry_id: self.id.clone(),
                kind: self.kind.clone(),
            }
        })?;
        Ok(LogEntry::System(SystemMessage {
            id: self.id.clone(),
            kind,
            timestamp: self.timestamp,
            detail: self.detail.clone(),
        }))
    }
}
