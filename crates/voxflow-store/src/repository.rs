//! Session repository over the SQLite database.
//!
//! One row per call. `start` closes any previous active row for the key
//! and inserts a fresh one carrying the durable fields forward; `update`
//! is read-merge-write; `complete` is idempotent. Absence is `Ok(None)`,
//! never an error.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use serde_json::Map;
use tracing::info;
use uuid::Uuid;

use voxflow_core::error::VoxflowError;
use voxflow_core::types::{
    Session, SessionPatch, SessionSeed, SessionStatus, TriState, END_REASON_REPLACED,
};

use crate::db::Database;
use crate::merge::merge_data;
use crate::transient::strip_transient;

/// Repository for durable caller sessions.
pub struct SessionRepository {
    db: Arc<Database>,
    extra_transient: Vec<String>,
}

impl SessionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            extra_transient: Vec::new(),
        }
    }

    /// Add deployment-specific transient `data` keys (from config) to the
    /// built-in set cleared on reuse.
    pub fn with_extra_transient(mut self, keys: Vec<String>) -> Self {
        self.extra_transient = keys;
        self
    }

    /// Start a session for a caller key.
    ///
    /// First contact creates a fresh record (`call_count = 1`). If any
    /// record exists the key is being reused: a still-active row is
    /// force-completed with [`END_REASON_REPLACED`] first, then the new
    /// row carries over `contact_id`, `qualified`, `topics`, and the
    /// non-transient `data` entries, with `call_count` incremented.
    pub fn start(&self, key: &str, seed: &SessionSeed) -> Result<Session, VoxflowError> {
        self.db.with_conn(|conn| {
            let previous = fetch_latest(conn, key)?;

            if let Some(prev) = previous.as_ref().filter(|p| p.is_active()) {
                close_row(conn, prev.id, END_REASON_REPLACED)?;
                info!(
                    session_key = key,
                    "force-completed active session before restart"
                );
            }

            let now = now_secs();
            let session = match previous {
                Some(prev) => {
                    let carried = strip_transient(&prev.data, &self.extra_transient);
                    Session {
                        id: Uuid::new_v4(),
                        session_key: key.to_string(),
                        contact_id: seed.contact_id.clone().or(prev.contact_id),
                        qualified: prev.qualified,
                        current_phase: String::new(),
                        data: merge_data(&carried, &seed.data),
                        call_count: prev.call_count + 1,
                        status: SessionStatus::Active,
                        started_at: now,
                        last_activity_at: now,
                        ended_at: None,
                        end_reason: None,
                        topics: prev.topics,
                    }
                }
                None => Session {
                    id: Uuid::new_v4(),
                    session_key: key.to_string(),
                    contact_id: seed.contact_id.clone(),
                    qualified: TriState::Unknown,
                    current_phase: String::new(),
                    data: merge_data(&Map::new(), &seed.data),
                    call_count: 1,
                    status: SessionStatus::Active,
                    started_at: now,
                    last_activity_at: now,
                    ended_at: None,
                    end_reason: None,
                    topics: Vec::new(),
                },
            };

            insert_row(conn, &session)?;
            info!(
                session_key = key,
                call_count = session.call_count,
                "session started"
            );
            Ok(session)
        })
    }

    /// Latest session for a key, preferring the active row.
    pub fn get(&self, key: &str) -> Result<Option<Session>, VoxflowError> {
        self.db.with_conn(|conn| fetch_latest(conn, key))
    }

    /// Deep-merge a partial update into the stored session.
    ///
    /// Scalar fields overwrite, `data` merges (null deletes), `topics`
    /// append-unique. Returns `Ok(None)` if no record exists for the key
    /// (callers must `start` first).
    pub fn update(&self, key: &str, patch: &SessionPatch) -> Result<Option<Session>, VoxflowError> {
        self.db.with_conn(|conn| {
            let Some(mut session) = fetch_latest(conn, key)? else {
                return Ok(None);
            };

            if let Some(contact_id) = &patch.contact_id {
                session.contact_id = Some(contact_id.clone());
            }
            if let Some(qualified) = patch.qualified {
                session.qualified = qualified;
            }
            if let Some(phase) = &patch.current_phase {
                session.current_phase = phase.clone();
            }
            session.data = merge_data(&session.data, &patch.data);
            for topic in &patch.topics {
                if !session.topics.contains(topic) {
                    session.topics.push(topic.clone());
                }
            }
            session.last_activity_at = now_secs();

            write_row(conn, &session)?;
            Ok(Some(session))
        })
    }

    /// Complete the session for a key.
    ///
    /// Idempotent: only `Active -> Completed` changes anything; calling
    /// on an already-completed record returns it unchanged.
    pub fn complete(&self, key: &str, reason: &str) -> Result<Option<Session>, VoxflowError> {
        self.db.with_conn(|conn| {
            let Some(mut session) = fetch_latest(conn, key)? else {
                return Ok(None);
            };
            if !session.is_active() {
                return Ok(Some(session));
            }

            let now = now_secs();
            session.status = SessionStatus::Completed;
            session.ended_at = Some(now);
            session.end_reason = Some(reason.to_string());
            session.last_activity_at = now;

            write_row(conn, &session)?;
            info!(session_key = key, reason, "session completed");
            Ok(Some(session))
        })
    }

    /// Move the session into a final phase and complete it in one step.
    ///
    /// Both fields land in a single row write, so a failure leaves the
    /// stored phase untouched; there is no window where the session sits
    /// in the final phase but still active. Idempotent like [`complete`]:
    /// an already-completed record is returned unchanged.
    ///
    /// [`complete`]: SessionRepository::complete
    pub fn complete_in_phase(
        &self,
        key: &str,
        phase: &str,
        reason: &str,
    ) -> Result<Option<Session>, VoxflowError> {
        self.db.with_conn(|conn| {
            let Some(mut session) = fetch_latest(conn, key)? else {
                return Ok(None);
            };
            if !session.is_active() {
                return Ok(Some(session));
            }

            let now = now_secs();
            session.current_phase = phase.to_string();
            session.status = SessionStatus::Completed;
            session.ended_at = Some(now);
            session.end_reason = Some(reason.to_string());
            session.last_activity_at = now;

            write_row(conn, &session)?;
            info!(session_key = key, phase, reason, "session completed");
            Ok(Some(session))
        })
    }

    /// All rows for a key, newest first. Reuse keeps closed rows around,
    /// so this is the caller's call log.
    pub fn history(&self, key: &str) -> Result<Vec<Session>, VoxflowError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "{} WHERE session_key = ?1
                     ORDER BY started_at DESC, created_at DESC",
                    SELECT_COLUMNS
                ))
                .map_err(|e| VoxflowError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![key], |row| Ok(row_to_session(row)))
                .map_err(|e| VoxflowError::Storage(e.to_string()))?;

            let mut sessions = Vec::new();
            for row in rows {
                let session = row.map_err(|e| VoxflowError::Storage(e.to_string()))??;
                sessions.push(session);
            }
            Ok(sessions)
        })
    }
}

// ============================================================================
// SQL helpers
// ============================================================================

const SELECT_COLUMNS: &str = "SELECT id, session_key, contact_id, qualified, current_phase, data,
            call_count, status, started_at, last_activity_at, ended_at, end_reason, topics
     FROM sessions";

/// UTC now truncated to whole seconds, matching column precision so a
/// written session reads back identical.
fn now_secs() -> DateTime<Utc> {
    Utc.timestamp_opt(Utc::now().timestamp(), 0)
        .single()
        .unwrap_or_default()
}

fn fetch_latest(conn: &Connection, key: &str) -> Result<Option<Session>, VoxflowError> {
    let mut stmt = conn
        .prepare(&format!(
            "{} WHERE session_key = ?1
             ORDER BY CASE status WHEN 'active' THEN 0 ELSE 1 END,
                      last_activity_at DESC, created_at DESC
             LIMIT 1",
            SELECT_COLUMNS
        ))
        .map_err(|e| VoxflowError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(rusqlite::params![key], |row| Ok(row_to_session(row)))
        .optional()
        .map_err(|e| VoxflowError::Storage(e.to_string()))?;

    match result {
        Some(session) => Ok(Some(session?)),
        None => Ok(None),
    }
}

fn insert_row(conn: &Connection, session: &Session) -> Result<(), VoxflowError> {
    conn.execute(
        "INSERT INTO sessions (id, session_key, contact_id, qualified, current_phase, data,
                               call_count, status, started_at, last_activity_at, ended_at,
                               end_reason, topics)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        rusqlite::params![
            session.id.to_string(),
            session.session_key,
            session.contact_id,
            session.qualified.as_str(),
            session.current_phase,
            serde_json::to_string(&session.data)
                .map_err(|e| VoxflowError::Serialization(e.to_string()))?,
            session.call_count,
            session.status.as_str(),
            session.started_at.timestamp(),
            session.last_activity_at.timestamp(),
            session.ended_at.map(|t| t.timestamp()),
            session.end_reason,
            serde_json::to_string(&session.topics)
                .map_err(|e| VoxflowError::Serialization(e.to_string()))?,
        ],
    )
    .map_err(|e| VoxflowError::Storage(format!("Failed to insert session: {}", e)))?;
    Ok(())
}

fn write_row(conn: &Connection, session: &Session) -> Result<(), VoxflowError> {
    conn.execute(
        "UPDATE sessions
         SET contact_id = ?2, qualified = ?3, current_phase = ?4, data = ?5,
             call_count = ?6, status = ?7, last_activity_at = ?8, ended_at = ?9,
             end_reason = ?10, topics = ?11
         WHERE id = ?1",
        rusqlite::params![
            session.id.to_string(),
            session.contact_id,
            session.qualified.as_str(),
            session.current_phase,
            serde_json::to_string(&session.data)
                .map_err(|e| VoxflowError::Serialization(e.to_string()))?,
            session.call_count,
            session.status.as_str(),
            session.last_activity_at.timestamp(),
            session.ended_at.map(|t| t.timestamp()),
            session.end_reason,
            serde_json::to_string(&session.topics)
                .map_err(|e| VoxflowError::Serialization(e.to_string()))?,
        ],
    )
    .map_err(|e| VoxflowError::Storage(format!("Failed to update session: {}", e)))?;
    Ok(())
}

fn close_row(conn: &Connection, id: Uuid, reason: &str) -> Result<(), VoxflowError> {
    conn.execute(
        "UPDATE sessions
         SET status = 'completed', ended_at = ?2, end_reason = ?3, last_activity_at = ?2
         WHERE id = ?1 AND status = 'active'",
        rusqlite::params![id.to_string(), Utc::now().timestamp(), reason],
    )
    .map_err(|e| VoxflowError::Storage(format!("Failed to close session: {}", e)))?;
    Ok(())
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session, VoxflowError> {
    let id_str: String = row.get(0).map_err(storage_err)?;
    let session_key: String = row.get(1).map_err(storage_err)?;
    let contact_id: Option<String> = row.get(2).map_err(storage_err)?;
    let qualified_str: String = row.get(3).map_err(storage_err)?;
    let current_phase: String = row.get(4).map_err(storage_err)?;
    let data_str: String = row.get(5).map_err(storage_err)?;
    let call_count: u32 = row.get(6).map_err(storage_err)?;
    let status_str: String = row.get(7).map_err(storage_err)?;
    let started_at: i64 = row.get(8).map_err(storage_err)?;
    let last_activity_at: i64 = row.get(9).map_err(storage_err)?;
    let ended_at: Option<i64> = row.get(10).map_err(storage_err)?;
    let end_reason: Option<String> = row.get(11).map_err(storage_err)?;
    let topics_str: String = row.get(12).map_err(storage_err)?;

    Ok(Session {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| VoxflowError::Storage(format!("Invalid UUID: {}", e)))?,
        session_key,
        contact_id,
        qualified: TriState::parse(&qualified_str)
            .ok_or_else(|| VoxflowError::Storage(format!("Invalid tri-state: {}", qualified_str)))?,
        current_phase,
        data: serde_json::from_str(&data_str)
            .map_err(|e| VoxflowError::Serialization(e.to_string()))?,
        call_count,
        status: SessionStatus::parse(&status_str)
            .ok_or_else(|| VoxflowError::Storage(format!("Invalid status: {}", status_str)))?,
        started_at: epoch_to_utc(started_at),
        last_activity_at: epoch_to_utc(last_activity_at),
        ended_at: ended_at.map(epoch_to_utc),
        end_reason,
        topics: serde_json::from_str(&topics_str)
            .map_err(|e| VoxflowError::Serialization(e.to_string()))?,
    })
}

fn epoch_to_utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn storage_err(e: rusqlite::Error) -> VoxflowError {
    VoxflowError::Storage(e.to_string())
}

/// Extension trait for rusqlite to support optional query results.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
