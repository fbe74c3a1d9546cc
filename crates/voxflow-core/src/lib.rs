//! Shared types, errors, configuration, and domain events for Voxflow.
//!
//! Voxflow is the conversation-orchestration core of a phone voice agent:
//! it tracks durable per-caller sessions, evaluates phase-completion
//! expressions, and routes the conversation between configured phases.

pub mod config;
pub mod error;
pub mod events;
pub mod telemetry;
pub mod types;

pub use config::OrchestratorConfig;
pub use error::{Result, VoxflowError};
pub use events::{EventSink, NullSink, OrchestratorEvent, TracingSink};
pub use types::*;
