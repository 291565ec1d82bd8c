//! # Local Log Entry Operations
//!
//! Storage of chatroom log entries, read receipts, reactions and whisper
//! targets. Both log entry variants share the `log_entries` table, keyed by
//! `(chatroom_id, id)`.
//!
//! ## Invariants
//!
//! - Inserting an id that already exists in the chatroom fails with
//!   `DuplicateLogEntryId` and writes nothing.
//! - Read receipts and reactions are only ever added here, never removed.
//! - Entries still pending delivery are never persisted.
//!
//! All functions take the connection they run on; on the write side that is
//! the open transaction handed out by [`LocalStore::mutate`](super::LocalStore::mutate).

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::chatrooms;
use crate::shared::error::{ConsistencyViolation, StoreError};
use crate::shared::messaging::{
    LogEntry, Reaction, SystemMessage, SystemMessageKind, UserMessage, UserMessageKind,
    WhisperTarget,
};

pub(crate) fn to_micros(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_micros()
}

/// A timestamp as it reads back after a round trip through the store
pub(crate) fn stored_precision(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(to_micros(timestamp)).unwrap_or(timestamp)
}

pub(crate) fn from_micros(table: &'static str, micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::corrupt(table, format!("timestamp {} out of range", micros)))
}

/// Check whether an entry id exists in a chatroom, in either variant
pub async fn entry_exists(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    entry_id: &str,
) -> Result<bool, StoreError> {
    let row = sqlx::query("SELECT 1 FROM log_entries WHERE chatroom_id = ? AND id = ?")
        .bind(chatroom_id)
        .bind(entry_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Number of persisted entries in a chatroom
pub async fn count(conn: &mut SqliteConnection, chatroom_id: &str) -> Result<usize, StoreError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM log_entries WHERE chatroom_id = ?")
        .bind(chatroom_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count as usize)
}

/// Ids of all persisted entries in a chatroom
pub async fn entry_ids(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
) -> Result<HashSet<String>, StoreError> {
    let rows = sqlx::query("SELECT id FROM log_entries WHERE chatroom_id = ?")
        .bind(chatroom_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("id").map_err(StoreError::from))
        .collect()
}

/// Append an entry to a chatroom's log
///
/// Returns `Ok(false)` without writing when the entry is still pending
/// delivery.
pub async fn insert_entry(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    entry: &LogEntry,
) -> Result<bool, StoreError> {
    if entry.is_pending_delivery() {
        tracing::debug!(chatroom_id, entry_id = entry.id(), "skipping unacknowledged entry");
        return Ok(false);
    }
    if !chatrooms::exists(conn, chatroom_id).await? {
        return Err(ConsistencyViolation::ChatroomNotFoundLocally {
            chatroom_id: chatroom_id.to_string(),
        }
        .into());
    }
    if entry_exists(conn, chatroom_id, entry.id()).await? {
        return Err(ConsistencyViolation::DuplicateLogEntryId {
            chatroom_id: chatroom_id.to_string(),
            entry_id: entry.id().to_string(),
        }
        .into());
    }

    let (seq,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(seq), 0) + 1 FROM log_entries WHERE chatroom_id = ?")
            .bind(chatroom_id)
            .fetch_one(&mut *conn)
            .await?;

    let (writer, detail) = match entry {
        LogEntry::User(message) => (Some(message.writer.as_str()), message.detail.as_str()),
        LogEntry::System(message) => (None, message.detail.as_str()),
    };

    sqlx::query(
        "INSERT INTO log_entries (
            chatroom_id, id, variant, kind, writer, timestamp, detail, seq
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(chatroom_id)
    .bind(entry.id())
    .bind(entry.variant_name())
    .bind(entry.kind_name())
    .bind(writer)
    .bind(to_micros(entry.timestamp()))
    .bind(detail)
    .bind(seq)
    .execute(&mut *conn)
    .await?;

    if let LogEntry::User(message) = entry {
        add_readers(conn, chatroom_id, &message.id, &message.read_by).await?;
        for reaction in &message.reactions {
            add_reaction(conn, chatroom_id, &message.id, reaction).await?;
        }
    }

    Ok(true)
}

/// Union readers into an entry's read set, returning how many were new
pub async fn add_readers<'a>(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    entry_id: &str,
    readers: impl IntoIterator<Item = &'a String>,
) -> Result<usize, StoreError> {
    let mut added = 0;
    for reader in readers {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO read_receipts (chatroom_id, entry_id, reader) VALUES (?, ?, ?)",
        )
        .bind(chatroom_id)
        .bind(entry_id)
        .bind(reader)
        .execute(&mut *conn)
        .await?;
        added += result.rows_affected() as usize;
    }
    Ok(added)
}

/// Readers recorded for one entry
pub async fn read_by(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    entry_id: &str,
) -> Result<BTreeSet<String>, StoreError> {
    let rows = sqlx::query("SELECT reader FROM read_receipts WHERE chatroom_id = ? AND entry_id = ?")
        .bind(chatroom_id)
        .bind(entry_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("reader").map_err(StoreError::from))
        .collect()
}

/// Record a reaction. Returns true if it was new.
pub async fn add_reaction(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    entry_id: &str,
    reaction: &Reaction,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO reactions (chatroom_id, entry_id, who, emoji) VALUES (?, ?, ?, ?)",
    )
    .bind(chatroom_id)
    .bind(entry_id)
    .bind(&reaction.who)
    .bind(&reaction.emoji)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Variant of a stored entry, if it exists
pub async fn entry_variant(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    entry_id: &str,
) -> Result<Option<String>, StoreError> {
    let row = sqlx::query("SELECT variant FROM log_entries WHERE chatroom_id = ? AND id = ?")
        .bind(chatroom_id)
        .bind(entry_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|row| row.try_get::<String, _>("variant").map_err(StoreError::from))
        .transpose()
}

/// Load a chatroom's full log, ordered by timestamp then arrival
pub async fn load_log(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
) -> Result<Vec<LogEntry>, StoreError> {
    let mut receipts: HashMap<String, BTreeSet<String>> = HashMap::new();
    let rows = sqlx::query("SELECT entry_id, reader FROM read_receipts WHERE chatroom_id = ?")
        .bind(chatroom_id)
        .fetch_all(&mut *conn)
        .await?;
    for row in rows {
        receipts
            .entry(row.try_get("entry_id")?)
            .or_default()
            .insert(row.try_get("reader")?);
    }

    let mut reactions: HashMap<String, BTreeSet<Reaction>> = HashMap::new();
    let rows = sqlx::query("SELECT entry_id, who, emoji FROM reactions WHERE chatroom_id = ?")
        .bind(chatroom_id)
        .fetch_all(&mut *conn)
        .await?;
    for row in rows {
        reactions
            .entry(row.try_get("entry_id")?)
            .or_default()
            .insert(Reaction {
                who: row.try_get("who")?,
                emoji: row.try_get("emoji")?,
            });
    }

    let rows = sqlx::query(
        "SELECT id, variant, kind, writer, timestamp, detail
         FROM log_entries
         WHERE chatroom_id = ?
         ORDER BY timestamp ASC, seq ASC",
    )
    .bind(chatroom_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| row_to_entry(row, &mut receipts, &mut reactions))
        .collect()
}

/// Convert database row to LogEntry
fn row_to_entry(
    row: &SqliteRow,
    receipts: &mut HashMap<String, BTreeSet<String>>,
    reactions: &mut HashMap<String, BTreeSet<Reaction>>,
) -> Result<LogEntry, StoreError> {
    let id: String = row.try_get("id")?;
    let variant: String = row.try_get("variant")?;
    let kind: String = row.try_get("kind")?;
    let timestamp = from_micros("log_entries", row.try_get("timestamp")?)?;
    let detail: String = row.try_get("detail")?;

    match variant.as_str() {
        "user" => {
            let kind = UserMessageKind::from_str(&kind)
                .ok_or_else(|| StoreError::corrupt("log_entries", format!("user kind '{}'", kind)))?;
            let writer: Option<String> = row.try_get("writer")?;
            let writer = writer
                .ok_or_else(|| StoreError::corrupt("log_entries", format!("entry {} has no writer", id)))?;
            Ok(LogEntry::User(UserMessage {
                read_by: receipts.remove(&id).unwrap_or_default(),
                reactions: reactions.remove(&id).unwrap_or_default(),
                id,
                kind,
                writer,
                timestamp,
                detail,
                pending_delivery: false,
            }))
        }
        "system" => {
            let kind = SystemMessageKind::from_str(&kind)
                .ok_or_else(|| StoreError::corrupt("log_entries", format!("system kind '{}'", kind)))?;
            Ok(LogEntry::System(SystemMessage {
                id,
                kind,
                timestamp,
                detail,
            }))
        }
        other => Err(StoreError::corrupt("log_entries", format!("variant '{}'", other))),
    }
}

/// Replace all whisper targets with the given set
pub async fn replace_whisper_targets(
    conn: &mut SqliteConnection,
    targets: &[WhisperTarget],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM whisper_targets")
        .execute(&mut *conn)
        .await?;
    for target in targets {
        sqlx::query(
            "INSERT OR IGNORE INTO whisper_targets (message_id, recipient_email) VALUES (?, ?)",
        )
        .bind(&target.message_id)
        .bind(&target.recipient_email)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// All whisper targets
pub async fn load_whisper_targets(
    conn: &mut SqliteConnection,
) -> Result<Vec<WhisperTarget>, StoreError> {
    let rows = sqlx::query(
        "SELECT message_id, recipient_email FROM whisper_targets
         ORDER BY message_id, recipient_email",
    )
    .fetch_all(&mut *conn)
    .await?;
    let mut targets = Vec::with_capacity(rows.len());
    for row in rows {
        targets.push(WhisperTarget {
            message_id: row.try_get("message_id")?,
            recipient_email: row.try_get("recipient_email")?,
        });
    }
    Ok(targets)
}
