//! Database Schema Definitions
//!
//! Schema creation and the version ledger for the local mirror.

use sqlx::SqliteConnection;

use crate::shared::error::StoreError;

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Create all tables and record the schema version
///
/// Runs on the write connection before the write worker starts. A file
/// written by a newer schema is refused rather than read with the wrong
/// layout.
pub async fn initialize(conn: &mut SqliteConnection) -> Result<i64, StoreError> {
    sqlx::raw_sql(include_str!("schema.sql"))
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(&mut *conn)
    .await?;

    let (stored_version,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(&mut *conn)
            .await?;

    if stored_version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::corrupt(
            "schema_migrations",
            format!(
                "schema version {} is newer than supported version {}",
                stored_version, CURRENT_SCHEMA_VERSION
            ),
        ));
    }

    if stored_version < CURRENT_SCHEMA_VERSION {
        tracing::info!(from = stored_version, to = CURRENT_SCHEMA_VERSION, "recording local store schema version");
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(CURRENT_SCHEMA_VERSION)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *conn)
            .await?;
    }

    Ok(CURRENT_SCHEMA_VERSION)
}
