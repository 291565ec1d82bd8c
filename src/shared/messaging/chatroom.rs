//! Chatroom Data Structure
//!
//! A chatroom owns its audience and its log. The log is kept ordered by
//! entry timestamp, not by arrival order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::log_entry::{LogEntry, SystemMessage, UserMessage};
use crate::shared::error::ConsistencyViolation;

/// Kind of chatroom
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatroomKind {
    /// Any number of members
    Group,
    /// Exactly two members
    Pair,
}

impl ChatroomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatroomKind::Group => "group",
            ChatroomKind::Pair => "pair",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "group" => Some(ChatroomKind::Group),
            "pair" => Some(ChatroomKind::Pair),
            _ => None,
        }
    }

    /// Kind implied by an audience when the server did not say
    pub fn infer(audience: &BTreeSet<String>) -> Self {
        if audience.len() == 2 {
            ChatroomKind::Pair
        } else {
            ChatroomKind::Group
        }
    }
}

/// Represents a chatroom
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chatroom {
    /// Unique chatroom ID
    pub id: String,
    /// Member emails
    pub audience: BTreeSet<String>,
    pub kind: ChatroomKind,
    /// Entries ordered by timestamp
    pub log: Vec<LogEntry>,
    /// Local display title, never sent by the server
    pub title_override: Option<String>,
    pub notification_muted: bool,
}

impl Chatroom {
    /// Create an empty chatroom
    pub fn new(id: impl Into<String>, audience: BTreeSet<String>, kind: ChatroomKind) -> Self {
        Self {
            id: id.into(),
            audience,
            kind,
            log: Vec::new(),
            title_override: None,
            notification_muted: false,
        }
    }

    pub fn contains_entry(&self, entry_id: &str) -> bool {
        self.log.iter().any(|entry| entry.id() == entry_id)
    }

    pub fn entry(&self, entry_id: &str) -> Option<&LogEntry> {
        self.log.iter().find(|entry| entry.id() == entry_id)
    }

    pub fn entry_mut(&mut self, entry_id: &str) -> Option<&mut LogEntry> {
        self.log.iter_mut().find(|entry| entry.id() == entry_id)
    }

    pub fn user_message_mut(&mut self, entry_id: &str) -> Option<&mut UserMessage> {
        self.entry_mut(entry_id).and_then(LogEntry::as_user_mut)
    }

    /// Insert an entry at its timestamp position.
    ///
    /// Entries with equal timestamps keep arrival order. An id already present
    /// in either variant is rejected.
    pub fn insert_entry(&mut self, entry: LogEntry) -> Result<(), ConsistencyViolation> {
        if self.contains_entry(entry.id()) {
            return Err(ConsistencyViolation::DuplicateLogEntryId {
                chatroom_id: self.id.clone(),
                entry_id: entry.id().to_string(),
            });
        }
        let timestamp = entry.timestamp();
        let position = self.log.partition_point(|existing| existing.timestamp() <= timestamp);
        self.log.insert(position, entry);
        Ok(())
    }

    pub fn user_messages(&self) -> impl Iterator<Item = &UserMessage> {
        self.log.iter().filter_map(LogEntry::as_user)
    }

    pub fn system_messages(&self) -> impl Iterator<Item = &SystemMessage> {
        self.log.iter().filter_map(|entry| match entry {
            LogEntry::System(message) => Some(message),
            LogEntry::User(_) => None,
        })
    }

    /// Most recent entry, for list previews
    pub fn last_entry(&self) -> Option<&LogEntry> {
        self.log.last()
    }

    /// Title shown in lists: the override, or the other members' emails
    pub fn display_title(&self, me: &str) -> String {
        if let Some(title) = &self.title_override {
            return title.clone();
        }
        self.audience
            .iter()
            .filter(|member| member.as_str() != me)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
