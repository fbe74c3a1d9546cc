//! Conversation phase routing for Voxflow.
//!
//! Drives a session through the phases of a [`PhaseCatalog`]: each
//! conversational turn calls [`Router::check_and_route`], which evaluates
//! the current phase's completion expression against the session `data`
//! bag and, when it holds, asks a [`PhasePolicy`] for the next phase and
//! validates the proposal against the catalog before committing it.

pub mod guard;
pub mod policy;
pub mod router;
pub mod store;

pub use guard::SingleFlight;
pub use policy::{PhasePolicy, StaticPolicy};
pub use router::Router;
pub use store::SessionStore;

pub use voxflow_core::types::{PhaseCatalog, PhaseConfig, RouteOutcome, SkipReason};
