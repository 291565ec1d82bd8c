//! # Local Bundle Operations
//!
//! User-defined groupings of chatrooms. Member order is kept through an
//! explicit ordinal; a chatroom belongs to at most one bundle.

use sqlx::{Row, SqliteConnection};
use std::collections::BTreeSet;

use crate::shared::error::StoreError;
use crate::shared::messaging::{BundlePosition, ChatroomBundle};

/// Insert or update a bundle including its member list
pub async fn upsert(conn: &mut SqliteConnection, bundle: &ChatroomBundle) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO bundles (id, name, icon_ref, position) VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            icon_ref = excluded.icon_ref,
            position = excluded.position",
    )
    .bind(&bundle.id)
    .bind(&bundle.name)
    .bind(&bundle.icon_ref)
    .bind(bundle.position.as_str())
    .execute(&mut *conn)
    .await?;

    set_members(conn, &bundle.id, &bundle.member_chatroom_ids).await
}

/// Delete a bundle. Its chatrooms are left untouched.
pub async fn delete(conn: &mut SqliteConnection, bundle_id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM bundles WHERE id = ?")
        .bind(bundle_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Replace a bundle's members, keeping the given order
pub async fn set_members(
    conn: &mut SqliteConnection,
    bundle_id: &str,
    member_chatroom_ids: &[String],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM bundle_members WHERE bundle_id = ?")
        .bind(bundle_id)
        .execute(&mut *conn)
        .await?;
    for (ordinal, chatroom_id) in member_chatroom_ids.iter().enumerate() {
        sqlx::query(
            "INSERT OR IGNORE INTO bundle_members (bundle_id, chatroom_id, ordinal) VALUES (?, ?, ?)",
        )
        .bind(bundle_id)
        .bind(chatroom_id)
        .bind(ordinal as i64)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Move a chatroom into a bundle, taking it out of any other bundle first
///
/// Returns false if the bundle does not exist.
pub async fn assign_chatroom(
    conn: &mut SqliteConnection,
    bundle_id: &str,
    chatroom_id: &str,
) -> Result<bool, StoreError> {
    let bundle_exists = sqlx::query("SELECT 1 FROM bundles WHERE id = ?")
        .bind(bundle_id)
        .fetch_optional(&mut *conn)
        .await?
        .is_some();
    if !bundle_exists {
        return Ok(false);
    }

    sqlx::query("DELETE FROM bundle_members WHERE chatroom_id = ? AND bundle_id != ?")
        .bind(chatroom_id)
        .bind(bundle_id)
        .execute(&mut *conn)
        .await?;

    let (next,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(MAX(ordinal), -1) + 1 FROM bundle_members WHERE bundle_id = ?",
    )
    .bind(bundle_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO bundle_members (bundle_id, chatroom_id, ordinal) VALUES (?, ?, ?)",
    )
    .bind(bundle_id)
    .bind(chatroom_id)
    .bind(next)
    .execute(&mut *conn)
    .await?;
    Ok(true)
}

/// Remove a chatroom from whichever bundle holds it
pub async fn unassign_chatroom(
    conn: &mut SqliteConnection,
    chatroom_id: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM bundle_members WHERE chatroom_id = ?")
        .bind(chatroom_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Drop member ids that are not in `live_chatroom_ids`, keeping order
///
/// Returns the number of member ids removed across all bundles.
pub async fn prune(
    conn: &mut SqliteConnection,
    live_chatroom_ids: &BTreeSet<String>,
) -> Result<usize, StoreError> {
    let mut removed = 0;
    for mut bundle in load_all(conn).await? {
        let dropped = bundle.retain_members(|id| live_chatroom_ids.contains(id));
        if dropped.is_empty() {
            continue;
        }
        tracing::debug!(bundle_id = %bundle.id, dropped = ?dropped, "pruning bundle members");
        removed += dropped.len();
        set_members(conn, &bundle.id, &bundle.member_chatroom_ids).await?;
    }
    Ok(removed)
}

/// All bundles with their members in order
pub async fn load_all(conn: &mut SqliteConnection) -> Result<Vec<ChatroomBundle>, StoreError> {
    let rows = sqlx::query("SELECT id, name, icon_ref, position FROM bundles ORDER BY id ASC")
        .fetch_all(&mut *conn)
        .await?;

    let mut bundles = Vec::with_capacity(rows.len());
    for row in rows {
        let position: String = row.try_get("position")?;
        let position = BundlePosition::from_str(&position)
            .ok_or_else(|| StoreError::corrupt("bundles", format!("position '{}'", position)))?;
        bundles.push(ChatroomBundle {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            icon_ref: row.try_get("icon_ref")?,
            position,
            member_chatroom_ids: Vec::new(),
        });
    }

    for bundle in &mut bundles {
        let rows = sqlx::query(
            "SELECT chatroom_id FROM bundle_members WHERE bundle_id = ? ORDER BY ordinal ASC",
        )
        .bind(&bundle.id)
        .fetch_all(&mut *conn)
        .await?;
        for row in rows {
            bundle.member_chatroom_ids.push(row.try_get("chatroom_id")?);
        }
    }
    Ok(bundles)
}
