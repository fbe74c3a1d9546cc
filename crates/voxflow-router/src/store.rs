//! Store seam used by the router.

use voxflow_core::error::VoxflowError;
use voxflow_core::types::{Session, SessionPatch, SessionSeed};
use voxflow_store::SessionRepository;

/// The slice of the session store the router drives.
///
/// [`SessionRepository`] is the production implementation; substituting a
/// failing store is how the fail-closed commit paths are pinned down in
/// tests.
pub trait SessionStore: Send + Sync {
    fn start(&self, key: &str, seed: &SessionSeed) -> Result<Session, VoxflowError>;

    fn get(&self, key: &str) -> Result<Option<Session>, VoxflowError>;

    fn update(&self, key: &str, patch: &SessionPatch) -> Result<Option<Session>, VoxflowError>;

    fn complete(&self, key: &str, reason: &str) -> Result<Option<Session>, VoxflowError>;

    /// Atomically set the final phase and complete the session; partial
    /// application is not allowed (see the repository implementation).
    fn complete_in_phase(
        &self,
        key: &str,
        phase: &str,
        reason: &str,
    ) -> Result<Option<Session>, VoxflowError>;
}

impl SessionStore for SessionRepository {
    fn start(&self, key: &str, seed: &SessionSeed) -> Result<Session, VoxflowError> {
        SessionRepository::start(self, key, seed)
    }

    fn get(&self, key: &str) -> Result<Option<Session>, VoxflowError> {
        SessionRepository::get(self, key)
    }

    fn update(&self, key: &str, patch: &SessionPatch) -> Result<Option<Session>, VoxflowError> {
        SessionRepository::update(self, key, patch)
    }

    fn complete(&self, key: &str, reason: &str) -> Result<Option<Session>, VoxflowError> {
        SessionRepository::complete(self, key, reason)
    }

    fn complete_in_phase(
        &self,
        key: &str,
        phase: &str,
        reason: &str,
    ) -> Result<Option<Session>, VoxflowError> {
        SessionRepository::complete_in_phase(self, key, phase, reason)
    }
}
