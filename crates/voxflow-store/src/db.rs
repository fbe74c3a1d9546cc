//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex. WAL mode keeps reads
//! cheap while a turn's read-merge-write is in progress.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use voxflow_core::error::VoxflowError;

use crate::migrations;

/// Thread-safe SQLite wrapper for the session store.
///
/// rusqlite's Connection is not Sync, so every access goes through the
/// mutex via [`Database::with_conn`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the session database at the given path.
    ///
    /// Configures WAL mode and pragmas, then runs pending migrations.
    pub fn open(path: &Path) -> Result<Self, VoxflowError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| VoxflowError::Storage(format!("Failed to open database: {}", e)))?;
        configure(&conn)?;

        info!("Session database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self, VoxflowError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| VoxflowError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        configure(&conn)?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Run a closure against the connection while holding the lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, VoxflowError>
    where
        F: FnOnce(&Connection) -> Result<T, VoxflowError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| VoxflowError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

fn configure(conn: &Connection) -> Result<(), VoxflowError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )
    .map_err(|e| VoxflowError::Storage(format!("Failed to set pragmas: {}", e)))
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
                .map_err(|e| VoxflowError::Storage(e.to_string()))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let db = Database::open(&path).unwrap();

        db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
                .map_err(|e| VoxflowError::Storage(e.to_string()))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("sessions.db");
        Database::open(&path).unwrap();
        assert!(path.exists());
    }
}
