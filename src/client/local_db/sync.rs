//! # Sync Metadata Operations
//!
//! Key/value bookkeeping for reconciliation: when the last pass completed,
//! which pass that was, and account-level flags carried by the snapshot.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use crate::shared::error::StoreError;

pub const LAST_SYNC_TIME: &str = "last_sync_time";
pub const LAST_PASS_ID: &str = "last_pass_id";
pub const ACCOUNT_SUSPENDED: &str = "account_suspended";

/// Set sync metadata
pub async fn set_sync_metadata(
    conn: &mut SqliteConnection,
    key: &str,
    value: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
         VALUES (?, ?, ?)",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Get sync metadata
pub async fn get_sync_metadata(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Option<String>, StoreError> {
    let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(row.try_get("value")?)),
        None => Ok(None),
    }
}

/// Get last sync timestamp
pub async fn get_last_sync_time(
    conn: &mut SqliteConnection,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    match get_sync_metadata(conn, LAST_SYNC_TIME).await? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|time| Some(time.with_timezone(&Utc)))
            .map_err(|e| StoreError::corrupt("sync_metadata", format!("{}: {}", LAST_SYNC_TIME, e))),
        None => Ok(None),
    }
}

/// Record a completed pass
pub async fn record_pass(
    conn: &mut SqliteConnection,
    pass_id: &str,
    completed_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    set_sync_metadata(conn, LAST_SYNC_TIME, &completed_at.to_rfc3339()).await?;
    set_sync_metadata(conn, LAST_PASS_ID, pass_id).await
}

pub async fn set_account_suspended(
    conn: &mut SqliteConnection,
    suspended: bool,
) -> Result<(), StoreError> {
    set_sync_metadata(conn, ACCOUNT_SUSPENDED, if suspended { "true" } else { "false" }).await
}

pub async fn account_suspended(conn: &mut SqliteConnection) -> Result<bool, StoreError> {
    Ok(get_sync_metadata(conn, ACCOUNT_SUSPENDED)
        .await?
        .is_some_and(|value| value == "true"))
}
