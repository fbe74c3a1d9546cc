//! Database schema migrations.
//!
//! One row per call in `sessions`; reuse of a caller key inserts a new
//! row and closes the previous one, so the table doubles as a call log.

use rusqlite::Connection;
use tracing::info;

use voxflow_core::error::VoxflowError;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), VoxflowError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| VoxflowError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| VoxflowError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: sessions_schema");
    }

    Ok(())
}

/// Version 1: sessions table.
fn apply_v1(conn: &Connection) -> Result<(), VoxflowError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            id                TEXT PRIMARY KEY NOT NULL,
            session_key       TEXT NOT NULL,
            contact_id        TEXT,
            qualified         TEXT NOT NULL DEFAULT 'unknown'
                              CHECK (qualified IN ('yes', 'no', 'unknown')),
            current_phase     TEXT NOT NULL DEFAULT '',
            data              TEXT NOT NULL DEFAULT '{}',
            call_count        INTEGER NOT NULL DEFAULT 1,
            status            TEXT NOT NULL DEFAULT 'active'
                              CHECK (status IN ('active', 'completed')),
            started_at        INTEGER NOT NULL,
            last_activity_at  INTEGER NOT NULL,
            ended_at          INTEGER,
            end_reason        TEXT,
            topics            TEXT NOT NULL DEFAULT '[]',
            created_at        INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_key
            ON sessions (session_key, last_activity_at DESC);

        -- The one-active-row-per-key invariant is maintained by the
        -- repository (start force-completes the old row first); this
        -- partial index keeps the active-row lookup cheap.
        CREATE INDEX IF NOT EXISTS idx_sessions_active
            ON sessions (session_key)
            WHERE status = 'active';

        INSERT OR IGNORE INTO schema_migrations (version, name)
            VALUES (1, 'sessions_schema');
        ",
    )
    .map_err(|e| VoxflowError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
