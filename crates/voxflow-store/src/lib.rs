//! Durable session store for Voxflow.
//!
//! One SQLite row per call, keyed by caller identity. Provides the
//! start/get/update/complete lifecycle with deep-merge update semantics,
//! plus a deadline-bounded async handle for hosts with real-time latency
//! budgets.

pub mod db;
pub mod handle;
pub mod merge;
pub mod migrations;
pub mod repository;
pub mod transient;

pub use db::Database;
pub use handle::StoreHandle;
pub use merge::{merge_data, values_equal};
pub use repository::SessionRepository;
