//! Shared Error Types
//!
//! This module defines the consistency violations raised by reconciliation and
//! push merging, and the error surfaced by every local store transaction.
//!
//! # Error Categories
//!
//! - `ConsistencyViolation` - the local mirror and the authoritative view disagree
//!   in a way that must abort the transaction rather than be auto-healed
//! - `StoreError` - a violation, or an underlying persistence failure
//!
//! Both abort the transaction that raised them; neither is fatal to the process.
//!
//! # Usage
//!
//! ```rust
//! use chatmirror::shared::error::{ConsistencyViolation, StoreError};
//!
//! let error: StoreError = ConsistencyViolation::DuplicateLogEntryId {
//!     chatroom_id: "r1".to_string(),
//!     entry_id: "m1".to_string(),
//! }
//! .into();
//! assert!(error.is_already_applied());
//! ```
use thiserror::Error;

/// The local mirror disagrees with authoritative truth
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsistencyViolation {
    /// Authoritative log is shorter than the local one
    #[error("chatroom {chatroom_id}: server log has {server_len} entries but local has {local_len}")]
    ServerBehindLocal {
        chatroom_id: String,
        local_len: usize,
        server_len: usize,
    },

    /// A local entry has no authoritative counterpart
    #[error("chatroom {chatroom_id}: local entry {entry_id} is missing on the server")]
    LogEntryNotFoundOnServer {
        chatroom_id: String,
        entry_id: String,
    },

    /// A server entry is not a known user or system message
    #[error("chatroom {chatroom_id}: entry {entry_id} has unknown kind '{kind}'")]
    UnconvertibleLogEntry {
        chatroom_id: String,
        entry_id: String,
        kind: String,
    },

    /// Insert of an entry id already present in the chatroom
    #[error("chatroom {chatroom_id}: entry {entry_id} already exists")]
    DuplicateLogEntryId {
        chatroom_id: String,
        entry_id: String,
    },

    /// The target chatroom is not in the local store
    #[error("chatroom {chatroom_id} not found locally")]
    ChatroomNotFoundLocally {
        chatroom_id: String,
    },
}

impl ConsistencyViolation {
    /// Chatroom the violation was raised for
    pub fn chatroom_id(&self) -> &str {
        match self {
            ConsistencyViolation::ServerBehindLocal { chatroom_id, .. }
            | ConsistencyViolation::LogEntryNotFoundOnServer { chatroom_id, .. }
            | ConsistencyViolation::UnconvertibleLogEntry { chatroom_id, .. }
            | ConsistencyViolation::DuplicateLogEntryId { chatroom_id, .. }
            | ConsistencyViolation::ChatroomNotFoundLocally { chatroom_id } => chatroom_id,
        }
    }

    /// Short stable code for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            ConsistencyViolation::ServerBehindLocal { .. } => "server_behind_local",
            ConsistencyViolation::LogEntryNotFoundOnServer { .. } => "log_entry_not_found_on_server",
            ConsistencyViolation::UnconvertibleLogEntry { .. } => "unconvertible_log_entry",
            ConsistencyViolation::DuplicateLogEntryId { .. } => "duplicate_log_entry_id",
            ConsistencyViolation::ChatroomNotFoundLocally { .. } => "chatroom_not_found_locally",
        }
    }
}

/// Error returned by a local store transaction
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("consistency violation: {0}")]
    Consistency(#[from] ConsistencyViolation),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be read back as a model value
    #[error("corrupt row in {table}: {message}")]
    CorruptRow {
        table: &'static str,
        message: String,
    },

    /// The write lane has shut down
    #[error("local store write worker is gone")]
    WorkerGone,
}

impl StoreError {
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::CorruptRow {
            table,
            message: message.into(),
        }
    }

    pub fn violation(&self) -> Option<&ConsistencyViolation> {
        match self {
            StoreError::Consistency(violation) => Some(violation),
            _ => None,
        }
    }

    /// Duplicate insert: the change was already applied earlier
    pub fn is_already_applied(&self) -> bool {
        matches!(
            self,
            StoreError::Consistency(ConsistencyViolation::DuplicateLogEntryId { .. })
        )
    }
}
