//! # Local Chatroom Operations
//!
//! Chatroom rows, their audience, and user-local settings. Deleting a
//! chatroom cascades to its log, read receipts and reactions.

use sqlx::{Row, SqliteConnection};
use std::collections::BTreeSet;

use super::log_entries;
use crate::shared::error::{ConsistencyViolation, StoreError};
use crate::shared::messaging::{Chatroom, ChatroomKind};

/// Check whether a chatroom exists locally
pub async fn exists(conn: &mut SqliteConnection, chatroom_id: &str) -> Result<bool, StoreError> {
    let row = sqlx::query("SELECT 1 FROM chatrooms WHERE id = ?")
        .bind(chatroom_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

async fn require(conn: &mut SqliteConnection, chatroom_id: &str) -> Result<(), StoreError> {
    if exists(conn, chatroom_id).await? {
        Ok(())
    } else {
        Err(ConsistencyViolation::ChatroomNotFoundLocally {
            chatroom_id: chatroom_id.to_string(),
        }
        .into())
    }
}

/// Ids of every local chatroom
pub async fn ids(conn: &mut SqliteConnection) -> Result<BTreeSet<String>, StoreError> {
    let rows = sqlx::query("SELECT id FROM chatrooms")
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("id").map_err(StoreError::from))
        .collect()
}

/// Insert a chatroom with its audience and full log
///
/// Fails if a chatroom with the same id already exists.
pub async fn insert(conn: &mut SqliteConnection, room: &Chatroom) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO chatrooms (id, kind, title_override, notification_muted)
         VALUES (?, ?, ?, ?)",
    )
    .bind(&room.id)
    .bind(room.kind.as_str())
    .bind(&room.title_override)
    .bind(room.notification_muted)
    .execute(&mut *conn)
    .await?;

    set_audience(conn, &room.id, &room.audience).await?;

    for entry in &room.log {
        log_entries::insert_entry(conn, &room.id, entry).await?;
    }
    Ok(())
}

/// Audience of one chatroom
pub async fn audience(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
) -> Result<BTreeSet<String>, StoreError> {
    let rows = sqlx::query("SELECT email FROM chatroom_audience WHERE chatroom_id = ?")
        .bind(chatroom_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("email").map_err(StoreError::from))
        .collect()
}

/// Replace a chatroom's audience. Returns true if it changed.
pub async fn set_audience(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    members: &BTreeSet<String>,
) -> Result<bool, StoreError> {
    let current = audience(conn, chatroom_id).await?;
    if &current == members {
        return Ok(false);
    }
    sqlx::query("DELETE FROM chatroom_audience WHERE chatroom_id = ?")
        .bind(chatroom_id)
        .execute(&mut *conn)
        .await?;
    for email in members {
        sqlx::query("INSERT INTO chatroom_audience (chatroom_id, email) VALUES (?, ?)")
            .bind(chatroom_id)
            .bind(email)
            .execute(&mut *conn)
            .await?;
    }
    Ok(true)
}

pub async fn add_member(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    email: &str,
) -> Result<bool, StoreError> {
    require(conn, chatroom_id).await?;
    let result =
        sqlx::query("INSERT OR IGNORE INTO chatroom_audience (chatroom_id, email) VALUES (?, ?)")
            .bind(chatroom_id)
            .bind(email)
            .execute(&mut *conn)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_member(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    email: &str,
) -> Result<bool, StoreError> {
    require(conn, chatroom_id).await?;
    let result = sqlx::query("DELETE FROM chatroom_audience WHERE chatroom_id = ? AND email = ?")
        .bind(chatroom_id)
        .bind(email)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Overwrite the server-owned attributes of a chatroom
///
/// Returns true if kind or muted flag changed.
pub async fn update_attributes(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    kind: ChatroomKind,
    notification_muted: bool,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE chatrooms SET kind = ?, notification_muted = ?
         WHERE id = ? AND (kind != ? OR notification_muted != ?)",
    )
    .bind(kind.as_str())
    .bind(notification_muted)
    .bind(chatroom_id)
    .bind(kind.as_str())
    .bind(notification_muted)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_title_override(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    title: Option<&str>,
) -> Result<(), StoreError> {
    require(conn, chatroom_id).await?;
    sqlx::query("UPDATE chatrooms SET title_override = ? WHERE id = ?")
        .bind(title)
        .bind(chatroom_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_notification_muted(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
    muted: bool,
) -> Result<(), StoreError> {
    require(conn, chatroom_id).await?;
    sqlx::query("UPDATE chatrooms SET notification_muted = ? WHERE id = ?")
        .bind(muted)
        .bind(chatroom_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete a chatroom and everything it owns. Returns true if it existed.
pub async fn delete(conn: &mut SqliteConnection, chatroom_id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM chatrooms WHERE id = ?")
        .bind(chatroom_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load one chatroom with audience and log
pub async fn load(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
) -> Result<Option<Chatroom>, StoreError> {
    let row = sqlx::query(
        "SELECT id, kind, title_override, notification_muted FROM chatrooms WHERE id = ?",
    )
    .bind(chatroom_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let kind: String = row.try_get("kind")?;
    let kind = ChatroomKind::from_str(&kind)
        .ok_or_else(|| StoreError::corrupt("chatrooms", format!("kind '{}'", kind)))?;

    let mut room = Chatroom::new(row.try_get::<String, _>("id")?, BTreeSet::new(), kind);
    room.title_override = row.try_get("title_override")?;
    room.notification_muted = row.try_get("notification_muted")?;
    room.audience = audience(conn, chatroom_id).await?;
    room.log = log_entries::load_log(conn, chatroom_id).await?;
    Ok(Some(room))
}

/// Load every chatroom, ordered by id
pub async fn load_all(conn: &mut SqliteConnection) -> Result<Vec<Chatroom>, StoreError> {
    let mut rooms = Vec::new();
    for id in ids(conn).await? {
        if let Some(room) = load(conn, &id).await? {
            rooms.push(room);
        }
    }
    Ok(rooms)
}
