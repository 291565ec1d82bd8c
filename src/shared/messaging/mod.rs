//! Messaging Module
//!
//! This module contains the chat entities mirrored by the client:
//!
//! - `Friend` - A confirmed friend, keyed by email
//! - `FriendNotification` - A pending friend-request notification
//! - `Chatroom` - A chatroom with its audience and ordered log
//! - `LogEntry` - Either a user message or a system message
//! - `ChatroomBundle` - A user-defined grouping of chatrooms
//!
//! # Usage
//!
//! ```rust
//! use chatmirror::shared::messaging::{Chatroom, ChatroomKind, parse_email_list};
//!
//! let room = Chatroom::new("r1", parse_email_list("a@x b@x"), ChatroomKind::Pair);
//! assert_eq!(room.audience.len(), 2);
//! ```

pub mod friend;
pub mod friend_request;
pub mod chatroom;
pub mod log_entry;
pub mod bundle;

// Re-export all types
pub use friend::Friend;
pub use friend_request::{FriendNotification, FriendNotificationKind};
pub use chatroom::{Chatroom, ChatroomKind};
pub use log_entry::{
    LogEntry, Reaction, SystemMessage, SystemMessageKind, UserMessage, UserMessageKind,
    WhisperTarget,
};
pub use bundle::{BundlePosition, ChatroomBundle};

use std::collections::BTreeSet;

/// Parse a space-delimited email list as used on the wire.
///
/// Repeated whitespace and empty input are tolerated.
pub fn parse_email_list(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Inverse of [`parse_email_list`], in sorted order.
pub fn join_email_list<'a>(emails: impl IntoIterator<Item = &'a String>) -> String {
    emails
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
