//! DDL for the relational backend.
//!
//! Uses `IF NOT EXISTS` throughout so [`apply_schema`] is idempotent and an
//! empty database needs no manual migration.

use crate::error::{ShortenerError, ShortenerResult};
use sqlx::SqlitePool;

/// Statements applied in order at startup.
pub(crate) const SCHEMA_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS short_urls (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id      TEXT    NOT NULL,
        short_key    TEXT    NOT NULL,
        original_url TEXT    NOT NULL,
        is_deleted   BOOLEAN NOT NULL DEFAULT 0
    )"#,
    // Live keys are unique per owner; deleted rows drop out of the index.
    r#"CREATE UNIQUE INDEX IF NOT EXISTS ux_short_urls_user_key
        ON short_urls (user_id, short_key, is_deleted) WHERE is_deleted = 0"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS ux_short_urls_user_url
        ON short_urls (user_id, original_url, is_deleted) WHERE is_deleted = 0"#,
    // Anonymous lookups by key.
    r#"CREATE INDEX IF NOT EXISTS idx_short_urls_key ON short_urls (short_key)"#,
];

/// Apply the full schema to the pool.
pub(crate) async fn apply_schema(pool: &SqlitePool) -> ShortenerResult<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(*statement)
            .execute(pool)
            .await
            .map_err(|e| ShortenerError::Schema(e.to_string()))?;
    }
    Ok(())
}
