use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, VoxflowError};

// =============================================================================
// Constants
// =============================================================================

/// The designated terminal phase name. Proposing this (when allowed) ends the
/// state machine; no further routing happens for the session.
pub const TERMINAL_PHASE: &str = "__end__";

/// End reason recorded when a new call for a key force-completes the
/// previous still-active session row.
pub const END_REASON_REPLACED: &str = "interrupted_or_replaced";

/// End reason for a normally completed call.
pub const END_REASON_COMPLETED: &str = "completed";

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle status of a session row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The call is live; this is the row the router reads and writes.
    Active,
    /// The call ended (normally or by replacement). Immutable afterwards.
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }
}

/// A boolean-or-unknown business outcome.
///
/// Distinct from a plain `bool` because "we have not established this yet"
/// is a valid state the qualification phases rely on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Yes,
    No,
    #[default]
    Unknown,
}

impl TriState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriState::Yes => "yes",
            TriState::No => "no",
            TriState::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yes" => Some(TriState::Yes),
            "no" => Some(TriState::No),
            "unknown" => Some(TriState::Unknown),
            _ => None,
        }
    }
}

/// Why a routing check was skipped rather than evaluated to a stay/move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another routing check for the same key is in flight.
    RoutingInProgress,
    /// The transition commit failed; the session stays in its phase.
    HandoffFailed,
    /// No session row exists for the key (caller must `start` first).
    SessionMissing,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::RoutingInProgress => "routing_in_progress",
            SkipReason::HandoffFailed => "handoff_failed",
            SkipReason::SessionMissing => "session_missing",
        }
    }
}

/// Result of a single `check_and_route` invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOutcome {
    /// Completion not met, proposal rejected, or proposal equals the
    /// current phase. The session did not move.
    Stayed,
    /// The session moved to the named phase (possibly [`TERMINAL_PHASE`]).
    Transitioned(String),
    /// The check did not run to a decision; see the reason.
    Skipped(SkipReason),
}

// =============================================================================
// Session
// =============================================================================

/// One durable record per call for a caller identity.
///
/// Reuse of a `session_key` creates a new row: the previous row is closed
/// (force-completed if still active) and the durable fields — `contact_id`,
/// `qualified`, `topics`, non-transient `data`, `call_count` — carry over.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Row identity; unique per call, not per caller.
    pub id: Uuid,
    /// Stable caller identity (e.g. E.164 phone number).
    pub session_key: String,
    /// Opaque foreign identifier, e.g. a CRM contact record id.
    pub contact_id: Option<String>,
    /// Qualification outcome; `Unknown` until established.
    pub qualified: TriState,
    /// Name of the active phase; empty before the first transition.
    pub current_phase: String,
    /// Open working-memory bag the completion expressions read.
    /// Never contains a `null` value (null is the merge-delete sentinel).
    pub data: Map<String, Value>,
    /// Monotonic call counter for the key; incremented on every (re)start.
    pub call_count: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Set exactly once, on completion.
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
    /// Append-only topic list preserved across session reuse.
    pub topics: Vec<String>,
}

impl Session {
    /// A minimal default session view for a key.
    ///
    /// Used when the store is unreachable within its deadline: the caller
    /// proceeds with this instead of blocking the conversational turn.
    pub fn fresh(session_key: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_key: session_key.to_string(),
            contact_id: None,
            qualified: TriState::Unknown,
            current_phase: String::new(),
            data: Map::new(),
            call_count: 1,
            status: SessionStatus::Active,
            started_at: now,
            last_activity_at: now,
            ended_at: None,
            end_reason: None,
            topics: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Seed metadata supplied when starting a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSeed {
    /// Linked foreign record, if the caller was recognized upstream.
    pub contact_id: Option<String>,
    /// Initial entries merged into `data` on start.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl SessionSeed {
    pub fn with_contact(contact_id: impl Into<String>) -> Self {
        Self {
            contact_id: Some(contact_id.into()),
            data: Map::new(),
        }
    }
}

/// A partial update applied to a stored session.
///
/// Scalar fields overwrite when present; `data` entries deep-merge
/// (a `null` value deletes the key); `topics` append-unique.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    pub contact_id: Option<String>,
    pub qualified: Option<TriState>,
    pub current_phase: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.current_phase = Some(phase.into());
        self
    }

    pub fn qualified(mut self, value: TriState) -> Self {
        self.qualified = Some(value);
        self
    }

    pub fn entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Mark a `data` key for deletion (merge-delete sentinel).
    pub fn delete_entry(mut self, key: impl Into<String>) -> Self {
        self.data.insert(key.into(), Value::Null);
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.contact_id.is_none()
            && self.qualified.is_none()
            && self.current_phase.is_none()
            && self.data.is_empty()
            && self.topics.is_empty()
    }
}

// =============================================================================
// Phase configuration
// =============================================================================

/// External per-deployment definition of one conversation phase.
///
/// The engine only consumes these; content, prompts, and ordering live in
/// the configuration system that produces them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub name: String,
    /// Phases this one may hand off to. Must include [`TERMINAL_PHASE`]
    /// explicitly for the phase to be allowed to end the call.
    pub allowed_next: HashSet<String>,
    /// Completion expression evaluated against the session `data` bag.
    pub completion: String,
}

impl PhaseConfig {
    pub fn new(
        name: impl Into<String>,
        allowed_next: impl IntoIterator<Item = impl Into<String>>,
        completion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            allowed_next: allowed_next.into_iter().map(Into::into).collect(),
            completion: completion.into(),
        }
    }

    /// Whether a proposed next phase is configured as reachable from here.
    pub fn allows(&self, next: &str) -> bool {
        self.allowed_next.contains(next)
    }
}

/// The full phase map for a deployment, keyed by phase name.
///
/// Loaded from TOML and replaceable between calls without a restart: the
/// catalog is plain data, so the host reloads by rebuilding the router
/// that holds it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhaseCatalog {
    /// Designated entry phase for new sessions.
    pub entry: String,
    phases: HashMap<String, PhaseConfig>,
}

#[derive(Deserialize)]
struct RawCatalog {
    #[serde(default)]
    entry: String,
    #[serde(default)]
    phases: HashMap<String, RawPhase>,
}

#[derive(Deserialize)]
struct RawPhase {
    #[serde(default)]
    allowed_next: Vec<String>,
    #[serde(default)]
    completion: String,
}

impl PhaseCatalog {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            phases: HashMap::new(),
        }
    }

    /// Parse a catalog from TOML text.
    ///
    /// ```toml
    /// entry = "greet"
    ///
    /// [phases.greet]
    /// allowed_next = ["verify"]
    /// completion = "greet_turns >= 2 OR greeted == True"
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawCatalog = toml::from_str(text)?;
        let mut catalog = PhaseCatalog::new(raw.entry);
        for (name, phase) in raw.phases {
            catalog.insert(PhaseConfig::new(name, phase.allowed_next, phase.completion));
        }
        Ok(catalog)
    }

    /// Load a catalog from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn insert(&mut self, phase: PhaseConfig) {
        self.phases.insert(phase.name.clone(), phase);
    }

    pub fn get(&self, name: &str) -> Option<&PhaseConfig> {
        self.phases.get(name)
    }

    pub fn entry_phase(&self) -> Option<&PhaseConfig> {
        self.phases.get(&self.entry)
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn phase_names(&self) -> impl Iterator<Item = &str> {
        self.phases.keys().map(String::as_str)
    }

    pub fn phases(&self) -> impl Iterator<Item = &PhaseConfig> {
        self.phases.values()
    }

    /// Check catalog consistency, using `check_expr` to vet each
    /// completion expression (the expression crate supplies the checker;
    /// this keeps the core crate free of a parser dependency).
    ///
    /// Returns one `(phase, problem)` pair per issue found.
    pub fn validate<F>(&self, check_expr: F) -> Vec<(String, String)>
    where
        F: Fn(&str) -> std::result::Result<(), String>,
    {
        let mut issues = Vec::new();

        if !self.entry.is_empty() && !self.phases.contains_key(&self.entry) {
            issues.push((
                self.entry.clone(),
                "entry phase is not defined in the catalog".to_string(),
            ));
        }

        for phase in self.phases.values() {
            if let Err(problem) = check_expr(&phase.completion) {
                issues.push((phase.name.clone(), problem));
            }
            for next in &phase.allowed_next {
                if next != TERMINAL_PHASE && !self.phases.contains_key(next) {
                    issues.push((
                        phase.name.clone(),
                        format!("allowed_next target '{}' is not defined", next),
                    ));
                }
            }
        }

        issues
    }
}

impl TryFrom<&str> for PhaseCatalog {
    type Error = VoxflowError;

    fn try_from(text: &str) -> Result<Self> {
        Self::from_toml_str(text)
    }
}

// =============================================================================
// Tests
// =============================================================================
