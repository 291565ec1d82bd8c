//! # Local Friend Operations
//!
//! Friends and pending friend notifications. Friends are keyed by email and
//! only their nickname is mutable; notifications are keyed by
//! `(from_email, kind)` so a repeated request collapses onto one row.

use sqlx::{Row, SqliteConnection};
use std::collections::BTreeSet;

use super::log_entries::{from_micros, to_micros};
use crate::shared::error::StoreError;
use crate::shared::messaging::{Friend, FriendNotification, FriendNotificationKind};

/// Insert a friend or update its nickname. Returns true if anything changed.
pub async fn upsert(conn: &mut SqliteConnection, friend: &Friend) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO friends (email, nickname) VALUES (?, ?)
         ON CONFLICT(email) DO UPDATE SET nickname = excluded.nickname
         WHERE friends.nickname IS NOT excluded.nickname",
    )
    .bind(&friend.email)
    .bind(&friend.nickname)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(conn: &mut SqliteConnection, email: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM friends WHERE email = ?")
        .bind(email)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn emails(conn: &mut SqliteConnection) -> Result<BTreeSet<String>, StoreError> {
    let rows = sqlx::query("SELECT email FROM friends")
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("email").map_err(StoreError::from))
        .collect()
}

/// All friends, ordered by email
pub async fn load(conn: &mut SqliteConnection) -> Result<Vec<Friend>, StoreError> {
    let rows = sqlx::query("SELECT email, nickname FROM friends ORDER BY email ASC")
        .fetch_all(&mut *conn)
        .await?;

    let mut friends = Vec::with_capacity(rows.len());
    for row in rows {
        friends.push(Friend {
            email: row.try_get("email")?,
            nickname: row.try_get("nickname")?,
        });
    }
    Ok(friends)
}

/// Record a notification; a repeat of the same sender and kind refreshes its timestamp.
/// Returns true if a row was added or its timestamp moved.
pub async fn add_notification(
    conn: &mut SqliteConnection,
    notification: &FriendNotification,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO friend_notifications (from_email, kind, timestamp) VALUES (?, ?, ?)
         ON CONFLICT(from_email, kind) DO UPDATE SET timestamp = excluded.timestamp
         WHERE friend_notifications.timestamp IS NOT excluded.timestamp",
    )
    .bind(&notification.from_email)
    .bind(notification.kind.as_str())
    .bind(to_micros(notification.timestamp))
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Drop every notification from one sender
pub async fn remove_notifications_from(
    conn: &mut SqliteConnection,
    from_email: &str,
) -> Result<usize, StoreError> {
    let result = sqlx::query("DELETE FROM friend_notifications WHERE from_email = ?")
        .bind(from_email)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() as usize)
}

/// Replace the whole notification set
pub async fn replace_notifications(
    conn: &mut SqliteConnection,
    notifications: &[FriendNotification],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM friend_notifications")
        .execute(&mut *conn)
        .await?;
    for notification in notifications {
        add_notification(conn, notification).await?;
    }
    Ok(())
}

/// All notifications, oldest first
pub async fn load_notifications(
    conn: &mut SqliteConnection,
) -> Result<Vec<FriendNotification>, StoreError> {
    let rows = sqlx::query(
        "SELECT from_email, kind, timestamp FROM friend_notifications
         ORDER BY timestamp ASC, from_email ASC",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut notifications = Vec::with_capacity(rows.len());
    for row in rows {
        let kind: String = row.try_get("kind")?;
        let kind = FriendNotificationKind::from_str(&kind)
            .ok_or_else(|| StoreError::corrupt("friend_notifications", format!("kind '{}'", kind)))?;
        notifications.push(FriendNotification {
            from_email: row.try_get("from_email")?,
            kind,
            timestamp: from_micros("friend_notifications", row.try_get("timestamp")?)?,
        });
    }
    Ok(notifications)
}
