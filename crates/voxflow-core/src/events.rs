use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Structured events emitted by the orchestration engine.
///
/// Consumed by the host's observability layer through an [`EventSink`];
/// the engine itself only emits, it never reacts to events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum OrchestratorEvent {
    /// A session row was created for a first-contact key.
    SessionStarted {
        session_key: String,
        call_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// A session key was reused; the previous row was closed first.
    SessionResumed {
        session_key: String,
        call_count: u32,
        replaced_active: bool,
        timestamp: DateTime<Utc>,
    },

    /// A session was completed.
    SessionCompleted {
        session_key: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The router committed a transition into this phase.
    PhaseEntered {
        session_key: String,
        phase: String,
        timestamp: DateTime<Utc>,
    },

    /// The router committed a transition out of this phase.
    PhaseExited {
        session_key: String,
        phase: String,
        timestamp: DateTime<Utc>,
    },

    /// The policy proposed a phase outside `allowed_next`. The session
    /// stayed put; this usually indicates a policy or catalog bug.
    TransitionRejected {
        session_key: String,
        from: String,
        proposed: String,
        timestamp: DateTime<Utc>,
    },

    /// Committing a transition failed; the session stays in its phase.
    HandoffFailed {
        session_key: String,
        from: String,
        proposed: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A routing check was skipped (single-flight contention or a
    /// missing session). Informational, not an error.
    RoutingSkipped {
        session_key: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A completion expression failed catalog validation.
    ExpressionRejected {
        phase: String,
        expression: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl OrchestratorEvent {
    /// Short event name for logging and metrics keys.
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorEvent::SessionStarted { .. } => "session_started",
            OrchestratorEvent::SessionResumed { .. } => "session_resumed",
            OrchestratorEvent::SessionCompleted { .. } => "session_completed",
            OrchestratorEvent::PhaseEntered { .. } => "phase_entered",
            OrchestratorEvent::PhaseExited { .. } => "phase_exited",
            OrchestratorEvent::TransitionRejected { .. } => "transition_rejected",
            OrchestratorEvent::HandoffFailed { .. } => "handoff_failed",
            OrchestratorEvent::RoutingSkipped { .. } => "routing_skipped",
            OrchestratorEvent::ExpressionRejected { .. } => "expression_rejected",
        }
    }
}

/// Destination for orchestrator events.
///
/// Implementations must be cheap and non-blocking; the router emits from
/// inside the per-turn call path.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &OrchestratorEvent);
}

/// Default sink: forwards events to `tracing` at a level matching their
/// severity.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &OrchestratorEvent) {
        match event {
            OrchestratorEvent::TransitionRejected {
                session_key,
                from,
                proposed,
                ..
            } => warn!(
                session_key,
                from, proposed, "policy proposed a phase outside allowed_next"
            ),
            OrchestratorEvent::HandoffFailed {
                session_key,
                from,
                proposed,
                error: err,
                ..
            } => error!(session_key, from, proposed, error = %err, "transition commit failed"),
            OrchestratorEvent::ExpressionRejected {
                phase,
                expression,
                error: err,
                ..
            } => warn!(phase, expression, error = %err, "completion expression rejected"),
            other => info!(event = other.name(), "{:?}", other),
        }
    }
}

/// Sink that drops every event. Useful in tests and benchmarks.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &OrchestratorEvent) {}
}
