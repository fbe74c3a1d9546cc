//! Phase routing over stored sessions.
//!
//! One `check_and_route` call per conversational turn: bump the turn
//! counter, evaluate the current phase's completion expression, and if it
//! holds ask the policy where to go. Every failure path converges on
//! "stay in the current phase" — a conversation must never be left in a
//! phase the catalog does not allow it to reach.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use voxflow_core::error::VoxflowError;
use voxflow_core::events::{EventSink, OrchestratorEvent, TracingSink};
use voxflow_core::types::{
    PhaseCatalog, RouteOutcome, Session, SessionPatch, SessionSeed, SkipReason,
    END_REASON_COMPLETED, TERMINAL_PHASE,
};
use crate::guard::SingleFlight;
use crate::policy::PhasePolicy;
use crate::store::SessionStore;

/// The conversation state machine.
///
/// Owns no session state itself; every decision reads the durable record
/// and commits back through the repository, so concurrent hosts sharing a
/// store see the same phase.
pub struct Router {
    store: Arc<dyn SessionStore>,
    catalog: PhaseCatalog,
    policy: Arc<dyn PhasePolicy>,
    guard: SingleFlight,
    loop_sensitive: Vec<String>,
    sink: Arc<dyn EventSink>,
}

impl Router {
    pub fn new(
        store: Arc<dyn SessionStore>,
        catalog: PhaseCatalog,
        policy: Arc<dyn PhasePolicy>,
    ) -> Self {
        Self {
            store,
            catalog,
            policy,
            guard: SingleFlight::new(),
            loop_sensitive: Vec::new(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Phases whose re-entry is tracked in a `<phase>_visits` counter, so
    /// completion expressions can cap loops (e.g. objection handling).
    pub fn with_loop_sensitive(mut self, phases: Vec<String>) -> Self {
        self.loop_sensitive = phases;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Vet every completion expression and transition target in the
    /// catalog. Call at startup; a non-empty result means the catalog
    /// would silently hold sessions in place at runtime.
    pub fn validate_catalog(&self) -> Vec<(String, String)> {
        let issues = self
            .catalog
            .validate(|expr| voxflow_expr::check(expr).map_err(|e| e.to_string()));
        for (phase, problem) in &issues {
            if let Some(config) = self.catalog.get(phase) {
                self.sink.emit(&OrchestratorEvent::ExpressionRejected {
                    phase: phase.clone(),
                    expression: config.completion.clone(),
                    error: problem.clone(),
                    timestamp: Utc::now(),
                });
            }
        }
        issues
    }

    /// Start (or restart) the session for a key and emit the lifecycle
    /// event.
    pub fn start_session(&self, key: &str, seed: &SessionSeed) -> Result<Session, VoxflowError> {
        let previous = self.store.get(key)?;
        let session = self.store.start(key, seed)?;
        match previous {
            Some(prev) => self.sink.emit(&OrchestratorEvent::SessionResumed {
                session_key: key.to_string(),
                call_count: session.call_count,
                replaced_active: prev.is_active(),
                timestamp: Utc::now(),
            }),
            None => self.sink.emit(&OrchestratorEvent::SessionStarted {
                session_key: key.to_string(),
                call_count: session.call_count,
                timestamp: Utc::now(),
            }),
        }
        Ok(session)
    }

    /// Complete the session for a key (e.g. the caller hung up).
    pub fn end_session(&self, key: &str, reason: &str) -> Result<Option<Session>, VoxflowError> {
        let was_active = self.store.get(key)?.map(|s| s.is_active()).unwrap_or(false);
        let completed = self.store.complete(key, reason)?;
        if was_active && completed.is_some() {
            self.sink.emit(&OrchestratorEvent::SessionCompleted {
                session_key: key.to_string(),
                reason: reason.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(completed)
    }

    /// Run one routing check for a key.
    ///
    /// Never returns an error: a check that cannot run to a decision
    /// reports [`RouteOutcome::Skipped`] and leaves the stored session
    /// untouched beyond its turn counter.
    pub fn check_and_route(&self, key: &str) -> RouteOutcome {
        let Some(_permit) = self.guard.try_acquire(key) else {
            return self.skip(key, SkipReason::RoutingInProgress);
        };

        let session = match self.store.get(key) {
            Ok(Some(session)) => session,
            Ok(None) => return self.skip(key, SkipReason::SessionMissing),
            Err(e) => {
                warn!(session_key = key, error = %e, "routing check could not read session");
                return self.skip(key, SkipReason::HandoffFailed);
            }
        };

        if !session.is_active() || session.current_phase == TERMINAL_PHASE {
            return RouteOutcome::Stayed;
        }

        // A session that has never been routed enters the catalog's
        // designated entry phase; no completion gate applies.
        if session.current_phase.is_empty() {
            return self.enter_entry_phase(key);
        }

        let current = session.current_phase.clone();
        let Some(config) = self.catalog.get(&current) else {
            warn!(
                session_key = key,
                phase = current,
                "session is in a phase the catalog does not define"
            );
            return RouteOutcome::Stayed;
        };

        // Bump the per-phase counters first so the completion expression
        // sees this turn counted.
        let turns_key = format!("{}_turns", current);
        let mut patch =
            SessionPatch::new().entry(&turns_key, json!(counter(&session.data, &turns_key) + 1));
        if self.loop_sensitive.iter().any(|p| *p == current) {
            let visits_key = format!("{}_visits", current);
            patch = patch.entry(&visits_key, json!(counter(&session.data, &visits_key) + 1));
        }
        let session = match self.store.update(key, &patch) {
            Ok(Some(session)) => session,
            Ok(None) => return self.skip(key, SkipReason::SessionMissing),
            Err(e) => {
                warn!(session_key = key, error = %e, "turn counter update failed");
                return self.skip(key, SkipReason::HandoffFailed);
            }
        };

        if !voxflow_expr::evaluate(&config.completion, &session.data) {
            return RouteOutcome::Stayed;
        }

        let proposed = self.policy.propose(&session);
        // Checked before allowed_next on purpose: proposing the current
        // phase is the policy's way of saying "stay", not a
        // misconfiguration, so it must not raise TransitionRejected even
        // when the phase does not list itself as a target.
        if proposed == current {
            return RouteOutcome::Stayed;
        }

        if !config.allows(&proposed) {
            self.sink.emit(&OrchestratorEvent::TransitionRejected {
                session_key: key.to_string(),
                from: current.clone(),
                proposed: proposed.clone(),
                timestamp: Utc::now(),
            });
            return RouteOutcome::Stayed;
        }

        if proposed == TERMINAL_PHASE {
            return self.commit_terminal(key, &current);
        }

        self.commit_transition(key, &current, &proposed)
    }

    fn enter_entry_phase(&self, key: &str) -> RouteOutcome {
        let entry = self.catalog.entry.clone();
        if entry.is_empty() || self.catalog.get(&entry).is_none() {
            warn!(session_key = key, "catalog has no usable entry phase");
            return RouteOutcome::Stayed;
        }

        match self.store.update(key, &SessionPatch::new().phase(&entry)) {
            Ok(Some(_)) => {
                self.sink.emit(&OrchestratorEvent::PhaseEntered {
                    session_key: key.to_string(),
                    phase: entry.clone(),
                    timestamp: Utc::now(),
                });
                RouteOutcome::Transitioned(entry)
            }
            Ok(None) => self.skip(key, SkipReason::SessionMissing),
            Err(e) => self.handoff_failed(key, "", &entry, &e),
        }
    }

    fn commit_terminal(&self, key: &str, from: &str) -> RouteOutcome {
        // One store call: terminal phase and completion land together, so
        // a failure cannot strand an active session in the terminal phase.
        match self
            .store
            .complete_in_phase(key, TERMINAL_PHASE, END_REASON_COMPLETED)
        {
            Ok(Some(_)) => {
                self.sink.emit(&OrchestratorEvent::PhaseExited {
                    session_key: key.to_string(),
                    phase: from.to_string(),
                    timestamp: Utc::now(),
                });
                self.sink.emit(&OrchestratorEvent::SessionCompleted {
                    session_key: key.to_string(),
                    reason: END_REASON_COMPLETED.to_string(),
                    timestamp: Utc::now(),
                });
                RouteOutcome::Transitioned(TERMINAL_PHASE.to_string())
            }
            Ok(None) => self.skip(key, SkipReason::SessionMissing),
            Err(e) => self.handoff_failed(key, from, TERMINAL_PHASE, &e),
        }
    }

    fn commit_transition(&self, key: &str, from: &str, to: &str) -> RouteOutcome {
        match self.store.update(key, &SessionPatch::new().phase(to)) {
            Ok(Some(_)) => {
                self.sink.emit(&OrchestratorEvent::PhaseExited {
                    session_key: key.to_string(),
                    phase: from.to_string(),
                    timestamp: Utc::now(),
                });
                self.sink.emit(&OrchestratorEvent::PhaseEntered {
                    session_key: key.to_string(),
                    phase: to.to_string(),
                    timestamp: Utc::now(),
                });
                RouteOutcome::Transitioned(to.to_string())
            }
            Ok(None) => self.skip(key, SkipReason::SessionMissing),
            Err(e) => self.handoff_failed(key, from, to, &e),
        }
    }

    fn skip(&self, key: &str, reason: SkipReason) -> RouteOutcome {
        self.sink.emit(&OrchestratorEvent::RoutingSkipped {
            session_key: key.to_string(),
            reason: reason.as_str().to_string(),
            timestamp: Utc::now(),
        });
        RouteOutcome::Skipped(reason)
    }

    fn handoff_failed(
        &self,
        key: &str,
        from: &str,
        proposed: &str,
        error: &VoxflowError,
    ) -> RouteOutcome {
        self.sink.emit(&OrchestratorEvent::HandoffFailed {
            session_key: key.to_string(),
            from: from.to_string(),
            proposed: proposed.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        RouteOutcome::Skipped(SkipReason::HandoffFailed)
    }
}

fn counter(data: &serde_json::Map<String, Value>, key: &str) -> i64 {
    data.get(key).and_then(Value::as_i64).unwrap_or(0)
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("catalog", &self.catalog)
            .field("loop_sensitive", &self.loop_sensitive)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
