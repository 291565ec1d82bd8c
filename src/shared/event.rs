//! Push Event System
//!
//! Typed payloads for incremental state changes delivered asynchronously by
//! the push-delivery collaborator. The set of event kinds is closed; every
//! consumer matches on [`PushEvent`] exhaustively.
//!
//! On the wire an event is a JSON object tagged by `eventKind`:
//!
//! ```json
//! {"eventKind": "readReceipt", "chatroomid": "r1", "idlist": "m1 m2", "who": "c@x"}
//! ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

use crate::shared::error::ConsistencyViolation;
use crate::shared::messaging::{
    parse_email_list, ChatroomKind, LogEntry, SystemMessage, SystemMessageKind, UserMessage,
    UserMessageKind,
};

/// Kind of push event, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEventKind {
    Message,
    ReadReceipt,
    Reaction,
    SystemLog,
    FriendRequest,
    FriendAccept,
    FriendRemove,
}

impl PushEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushEventKind::Message => "message",
            PushEventKind::ReadReceipt => "readReceipt",
            PushEventKind::Reaction => "reaction",
            PushEventKind::SystemLog => "systemLog",
            PushEventKind::FriendRequest => "friendRequest",
            PushEventKind::FriendAccept => "friendAccept",
            PushEventKind::FriendRemove => "friendRemove",
        }
    }
}

/// Incremental event delivered by push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventKind", rename_all = "camelCase")]
pub enum PushEvent {
    Message(MessageEvent),
    ReadReceipt(ReadReceiptEvent),
    Reaction(ReactionEvent),
    SystemLog(SystemLogEvent),
    FriendRequest(FriendEvent),
    FriendAccept(FriendEvent),
    FriendRemove(FriendEvent),
}

/// A new user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub roomid: String,
    pub chatid: String,
    pub sender: String,
    #[serde(default)]
    pub detail: String,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    /// Space-delimited emails
    #[serde(default)]
    pub readusers: String,
    /// Space-delimited emails; present when the room may be unknown to the client
    #[serde(default)]
    pub audiencelist: Option<String>,
    #[serde(default)]
    pub roomtype: Option<String>,
}

/// Read receipt for one or more messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceiptEvent {
    pub chatroomid: String,
    #[serde(deserialize_with = "deserialize_id_list")]
    pub idlist: Vec<String>,
    pub who: String,
}

/// Reaction added to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub roomid: String,
    pub chatid: String,
    pub who: String,
    pub emoji: String,
}

/// Membership change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLogEvent {
    pub roomid: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sysid: String,
    pub timestamp: DateTime<Utc>,
    /// Space-delimited emails
    #[serde(default)]
    pub detail: String,
}

/// Friend request lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendEvent {
    #[serde(alias = "audience")]
    pub fromemail: String,
    #[serde(default)]
    pub nickname: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdList {
    Joined(String),
    Items(Vec<String>),
}

/// Accepts either `"m1 m2"` or `["m1", "m2"]`
fn deserialize_id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match IdList::deserialize(deserializer)? {
        IdList::Joined(raw) => raw.split_whitespace().map(str::to_string).collect(),
        IdList::Items(items) => items,
    })
}

impl PushEvent {
    /// Parse an event from a JSON payload
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn kind(&self) -> PushEventKind {
        match self {
            PushEvent::Message(_) => PushEventKind::Message,
            PushEvent::ReadReceipt(_) => PushEventKind::ReadReceipt,
            PushEvent::Reaction(_) => PushEventKind::Reaction,
            PushEvent::SystemLog(_) => PushEventKind::SystemLog,
            PushEvent::FriendRequest(_) => PushEventKind::FriendRequest,
            PushEvent::FriendAccept(_) => PushEventKind::FriendAccept,
            PushEvent::FriendRemove(_) => PushEventKind::FriendRemove,
        }
    }

    /// Chatroom the event targets, if any
    pub fn chatroom_id(&self) -> Option<&str> {
        match self {
            PushEvent::Message(event) => Some(&event.roomid),
            PushEvent::ReadReceipt(event) => Some(&event.chatroomid),
            PushEvent::Reaction(event) => Some(&event.roomid),
            PushEvent::SystemLog(event) => Some(&event.roomid),
            PushEvent::FriendRequest(_) | PushEvent::FriendAccept(_) | PushEvent::FriendRemove(_) => {
                None
            }
        }
    }

    /// Identity of the delivered fact, for deduplication by the delivery layer
    pub fn dedup_key(&self) -> String {
        match self {
            PushEvent::Message(event) => format!("message:{}:{}", event.roomid, event.chatid),
            PushEvent::ReadReceipt(event) => format!(
                "readReceipt:{}:{}:{}",
                event.chatroomid,
                event.who,
                event.idlist.join(",")
            ),
            PushEvent::Reaction(event) => format!(
                "reaction:{}:{}:{}:{}",
                event.roomid, event.chatid, event.who, event.emoji
            ),
            PushEvent::SystemLog(event) => format!("systemLog:{}:{}", event.roomid, event.sysid),
            PushEvent::FriendRequest(event) => {
                format!("friendRequest:{}:{}", event.fromemail, event.timestamp.timestamp_millis())
            }
            PushEvent::FriendAccept(event) => {
                format!("friendAccept:{}:{}", event.fromemail, event.timestamp.timestamp_millis())
            }
            PushEvent::FriendRemove(event) => {
                format!("friendRemove:{}:{}", event.fromemail, event.timestamp.timestamp_millis())
            }
        }
    }
}

impl MessageEvent {
    /// The log entry carried by this event
    pub fn to_entry(&self) -> Result<LogEntry, ConsistencyViolation> {
        let kind = UserMessageKind::from_str(&self.kind).ok_or_else(|| {
            ConsistencyViolation::UnconvertibleLogEntry {
                chatroom_id: self.roomid.clone(),
                entry_id: self.chatid.clone(),
                kind: self.kind.clone(),
            }
        })?;
        Ok(LogEntry::User(UserMessage {
            id: self.chatid.clone(),
            kind,
            writer: self.sender.clone(),
            timestamp: self.timestamp,
            detail: self.detail.clone(),
            read_by: parse_email_list(&self.readusers),
            reactions: BTreeSet::new(),
            pending_delivery: false,
        }))
    }

    /// Audience for a shell chatroom, when the event carries one
    pub fn audience(&self) -> Option<BTreeSet<String>> {
        self.audiencelist
            .as_deref()
            .map(parse_email_list)
            .filter(|audience| !audience.is_empty())
    }

    /// Kind for a shell chatroom: explicit `roomtype`, otherwise inferred
    pub fn chatroom_kind(&self, audience: &BTreeSet<String>) -> ChatroomKind {
        self.roomtype
            .as_deref()
            .and_then(ChatroomKind::from_str)
            .unwrap_or_else(|| ChatroomKind::infer(audience))
    }
}

impl SystemLogEvent {
    pub fn system_kind(&self) -> Result<SystemMessageKind, ConsistencyViolation> {
        SystemMessageKind::from_str(&self.kind).ok_or_else(|| {
            ConsistencyViolation::UnconvertibleLogEntry {
                chatroom_id: self.roomid.clone(),
                entry_id: self.sysid.clone(),
                kind: self.kind.clone(),
            }
        })
    }

    pub fn members(&self) -> Vec<String> {
        self.detail.split_whitespace().map(str::to_string).collect()
    }

    /// Entries to append for this event.
    ///
    /// `enter` fans out to one entry per entered member. With a single member
    /// the server id is used as is; otherwise each entry gets `<sysid>#<n>`.
    pub fn to_entries(&self) -> Result<Vec<(String, SystemMessage)>, ConsistencyViolation> {
        let kind = self.system_kind()?;
        if kind != SystemMessageKind::Enter {
            return Ok(vec![(
                self.detail.trim().to_string(),
                SystemMessage {
                    id: self.sysid.clone(),
                    kind,
                    timestamp: self.timestamp,
                    detail: self.detail.clone(),
                },
            )]);
        }

        let members = self.members();
        let fan_out = members.len() > 1;
        Ok(members
            .into_iter()
            .enumerate()
            .map(|(index, member)| {
                let id = if fan_out {
                    format!("{}#{}", self.sysid, index + 1)
                } else {
                    self.sysid.clone()
                };
                let entry = SystemMessage {
                    id,
                    kind,
                    timestamp: self.timestamp,
                    detail: member.clone(),
                };
                (member, entry)
            })
            .collect())
    }
}
