//! Async facade over the blocking repository.
//!
//! Store calls run on the blocking pool under a per-operation deadline so
//! a slow disk can never stall a conversational turn. Callers that can
//! tolerate stale-or-empty state use [`StoreHandle::get_or_fresh`], which
//! degrades to an in-memory default instead of surfacing the failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use voxflow_core::error::VoxflowError;
use voxflow_core::types::{Session, SessionPatch, SessionSeed};

use crate::repository::SessionRepository;

/// Cloneable async handle to the session store.
#[derive(Clone)]
pub struct StoreHandle {
    repo: Arc<SessionRepository>,
    deadline: Duration,
}

impl StoreHandle {
    pub fn new(repo: Arc<SessionRepository>, op_deadline_ms: u64) -> Self {
        Self {
            repo,
            deadline: Duration::from_millis(op_deadline_ms),
        }
    }

    pub async fn start(&self, key: &str, seed: SessionSeed) -> Result<Session, VoxflowError> {
        let key = key.to_string();
        self.run(move |repo| repo.start(&key, &seed)).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Session>, VoxflowError> {
        let key = key.to_string();
        self.run(move |repo| repo.get(&key)).await
    }

    pub async fn update(
        &self,
        key: &str,
        patch: SessionPatch,
    ) -> Result<Option<Session>, VoxflowError> {
        let key = key.to_string();
        self.run(move |repo| repo.update(&key, &patch)).await
    }

    pub async fn complete(
        &self,
        key: &str,
        reason: &str,
    ) -> Result<Option<Session>, VoxflowError> {
        let key = key.to_string();
        let reason = reason.to_string();
        self.run(move |repo| repo.complete(&key, &reason)).await
    }

    /// Fetch the session for a key, falling back to [`Session::fresh`] when
    /// there is no record or the store does not answer within its deadline.
    ///
    /// The fallback is not persisted; the next successful store call sees
    /// the durable record again.
    pub async fn get_or_fresh(&self, key: &str) -> Session {
        match self.get(key).await {
            Ok(Some(session)) => session,
            Ok(None) => Session::fresh(key),
            Err(e) => {
                warn!(
                    session_key = key,
                    error = %e,
                    "store unavailable, proceeding with a fresh session view"
                );
                Session::fresh(key)
            }
        }
    }

    async fn run<T, F>(&self, op: F) -> Result<T, VoxflowError>
    where
        F: FnOnce(&SessionRepository) -> Result<T, VoxflowError> + Send + 'static,
        T: Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        let task = tokio::task::spawn_blocking(move || op(&repo));
        match tokio::time::timeout(self.deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(VoxflowError::Storage(format!(
                "Store task failed: {}",
                join
            ))),
            Err(_) => Err(VoxflowError::StoreDeadline(self.deadline.as_millis() as u64)),
        }
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;
    use voxflow_core::types::SessionStatus;

    fn make_handle() -> StoreHandle {
        let db = Arc::new(Database::in_memory().unwrap());
        StoreHandle::new(Arc::new(SessionRepository::new(db)), 800)
    }

    const KEY: &str = "+15550001111";

    #[tokio::test]
    async fn test_start_and_get() {
        let handle = make_handle();
        let started = handle.start(KEY, SessionSeed::default()).await.unwrap();
        let fetched = handle.get(KEY).await.unwrap().unwrap();
        assert_eq!(fetched.id, started.id);
    }

    #[tokio::test]
    async fn test_update_and_complete() {
        let handle = make_handle();
        handle.start(KEY, SessionSeed::default()).await.unwrap();

        let updated = handle
            .update(KEY, SessionPatch::new().entry("greeted", json!(true)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.data.get("greeted"), Some(&json!(true)));

        let completed = handle.complete(KEY, "done").await.unwrap().unwrap();
        assert_eq!(completed.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_get_or_fresh_unknown_key() {
        let handle = make_handle();
        let session = handle.get_or_fresh("+15559990000").await;
        assert_eq!(session.session_key, "+15559990000");
        assert_eq!(session.call_count, 1);
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn test_get_or_fresh_prefers_stored_session() {
        let handle = make_handle();
        handle
            .start(KEY, SessionSeed::with_contact("crm-42"))
            .await
            .unwrap();
        let session = handle.get_or_fresh(KEY).await;
        assert_eq!(session.contact_id.as_deref(), Some("crm-42"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_surfaces_as_error() {
        let db = Arc::new(Database::in_memory().unwrap());
        let handle = StoreHandle::new(
            Arc::new(SessionRepository::new(Arc::clone(&db))),
            50,
        );

        // Hold the database lock from another thread past the deadline.
        let blocker = std::thread::spawn(move || {
            db.with_conn(|_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
        });
        // Give the blocker time to take the lock.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = handle.get(KEY).await;
        assert!(matches!(result, Err(VoxflowError::StoreDeadline(50))));

        blocker.join().unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_get_or_fresh_degrades_on_deadline() {
        let db = Arc::new(Database::in_memory().unwrap());
        let repo = Arc::new(SessionRepository::new(Arc::clone(&db)));
        repo.start(KEY, &SessionSeed::default()).unwrap();
        let handle = StoreHandle::new(repo, 50);

        let blocker = std::thread::spawn(move || {
            db.with_conn(|_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let session = handle.get_or_fresh(KEY).await;
        // The stored record was unreachable; we still got a usable view.
        assert_eq!(session.session_key, KEY);

        blocker.join().unwrap().unwrap();
    }
}
