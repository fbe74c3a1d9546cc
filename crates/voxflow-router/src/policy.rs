//! Phase proposal policies.
//!
//! The router decides *whether* a phase may hand off (completion met,
//! target allowed); the policy decides *where* to. The production policy
//! is typically a closure over the host's dialogue model; [`StaticPolicy`]
//! covers linear flows and tests.

use std::collections::HashMap;

use voxflow_core::types::Session;

/// Chooses the next phase for a session whose current phase has met its
/// completion expression.
///
/// Proposals are untrusted: the router validates them against the
/// catalog's `allowed_next` and rejects anything outside it. Proposing
/// the current phase means "stay".
pub trait PhasePolicy: Send + Sync {
    fn propose(&self, session: &Session) -> String;
}

impl<F> PhasePolicy for F
where
    F: Fn(&Session) -> String + Send + Sync,
{
    fn propose(&self, session: &Session) -> String {
        self(session)
    }
}

/// Fixed phase-to-phase mapping. Phases without an entry stay put.
#[derive(Clone, Debug, Default)]
pub struct StaticPolicy {
    next: HashMap<String, String>,
}

impl StaticPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.next.insert(from.into(), to.into());
        self
    }
}

impl PhasePolicy for StaticPolicy {
    fn propose(&self, session: &Session) -> String {
        self.next
            .get(&session.current_phase)
            .cloned()
            .unwrap_or_else(|| session.current_phase.clone())
    }
}
