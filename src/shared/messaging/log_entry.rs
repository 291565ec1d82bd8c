//! Log Entry Data Structures
//!
//! A chatroom log is an ordered sequence of entries, each either a message
//! written by a user or a system message recording a membership change.
//! Entry ids are unique per chatroom across both variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of user message content
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserMessageKind {
    Text,
    Photo,
    Video,
    /// Only visible to the recipients listed as whisper targets
    Whisper,
    /// Placeholder for a message from a blocked user
    Blocked,
}

impl UserMessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserMessageKind::Text => "text",
            UserMessageKind::Photo => "photo",
            UserMessageKind::Video => "video",
            UserMessageKind::Whisper => "whisper",
            UserMessageKind::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(UserMessageKind::Text),
            "photo" => Some(UserMessageKind::Photo),
            "video" => Some(UserMessageKind::Video),
            "whisper" => Some(UserMessageKind::Whisper),
            "blocked" => Some(UserMessageKind::Blocked),
            _ => None,
        }
    }
}

/// Kind of system message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemMessageKind {
    /// Chatroom was started; detail lists the initial audience
    Start,
    /// A member entered; detail is that member's email
    Enter,
    /// A member left; detail is that member's email
    Exit,
}

impl SystemMessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemMessageKind::Start => "start",
            SystemMessageKind::Enter => "enter",
            SystemMessageKind::Exit => "exit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "start" => Some(SystemMessageKind::Start),
            "enter" => Some(SystemMessageKind::Enter),
            "exit" => Some(SystemMessageKind::Exit),
            _ => None,
        }
    }
}

/// A reaction left on a user message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reaction {
    /// Who reacted
    pub who: String,
    /// Reaction glyph
    pub emoji: String,
}

/// A message written by a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserMessage {
    /// Unique within the chatroom
    pub id: String,
    pub kind: UserMessageKind,
    /// Email of the author
    pub writer: String,
    pub timestamp: DateTime<Utc>,
    /// Text, or a media reference for photo/video
    pub detail: String,
    /// Readers; only ever grows
    #[serde(default)]
    pub read_by: BTreeSet<String>,
    #[serde(default)]
    pub reactions: BTreeSet<Reaction>,
    /// Set while the server has not acknowledged the message; never persisted
    #[serde(skip)]
    pub pending_delivery: bool,
}

impl UserMessage {
    /// Add one reader. Returns true if the reader was new.
    pub fn mark_read_by(&mut self, who: impl Into<String>) -> bool {
        self.read_by.insert(who.into())
    }

    /// Union `readers` into `read_by`, returning how many were new.
    pub fn merge_read_by<'a>(&mut self, readers: impl IntoIterator<Item = &'a String>) -> usize {
        readers
            .into_iter()
            .filter(|reader| self.read_by.insert((*reader).clone()))
            .count()
    }

    /// Add a reaction. Returns true if it was new.
    pub fn add_reaction(&mut self, reaction: Reaction) -> bool {
        self.reactions.insert(reaction)
    }

    /// Number of audience members, other than the writer, who have not read it yet
    pub fn unread_count(&self, audience: &BTreeSet<String>) -> usize {
        audience
            .iter()
            .filter(|member| **member != self.writer && !self.read_by.contains(*member))
            .count()
    }
}

/// A membership change recorded in the log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemMessage {
    /// Unique within the chatroom
    pub id: String,
    pub kind: SystemMessageKind,
    pub timestamp: DateTime<Utc>,
    /// Space-delimited participant emails
    pub detail: String,
}

impl SystemMessage {
    /// Participants named by this entry
    pub fn participants(&self) -> Vec<&str> {
        self.detail.split_whitespace().collect()
    }
}

/// One entry of a chatroom log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum LogEntry {
    User(UserMessage),
    System(SystemMessage),
}

impl LogEntry {
    pub fn id(&self) -> &str {
        match self {
            LogEntry::User(message) => &message.id,
            LogEntry::System(message) => &message.id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LogEntry::User(message) => message.timestamp,
            LogEntry::System(message) => message.timestamp,
        }
    }

    /// Storage discriminator
    pub fn variant_name(&self) -> &'static str {
        match self {
            LogEntry::User(_) => "user",
            LogEntry::System(_) => "system",
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            LogEntry::User(message) => message.kind.as_str(),
            LogEntry::System(message) => message.kind.as_str(),
        }
    }

    pub fn as_user(&self) -> Option<&UserMessage> {
        match self {
            LogEntry::User(message) => Some(message),
            LogEntry::System(_) => None,
        }
    }

    pub fn as_user_mut(&mut self) -> Option<&mut UserMessage> {
        match self {
            LogEntry::User(message) => Some(message),
            LogEntry::System(_) => None,
        }
    }

    pub fn is_pending_delivery(&self) -> bool {
        matches!(self, LogEntry::User(message) if message.pending_delivery)
    }
}

impl From<UserMessage> for LogEntry {
    fn from(message: UserMessage) -> Self {
        LogEntry::User(message)
    }
}

impl From<SystemMessage> for LogEntry {
    fn from(message: SystemMessage) -> Self {
        LogEntry::System(message)
    }
}

/// A recipient of a whisper message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct WhisperTarget {
    pub message_id: String,
    pub recipient_email: String,
}
