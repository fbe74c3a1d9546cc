use thiserror::Error;

/// Top-level error type for the Voxflow orchestration engine.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates
/// construct these directly so that the `?` operator works across crate
/// boundaries. Nothing in the engine is allowed to panic in library code;
/// soft failures (a missing session, a malformed expression) are modeled
/// as `Option` / local recovery, not as errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VoxflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store deadline exceeded after {0} ms")]
    StoreDeadline(u64),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for VoxflowError {
    fn from(err: toml::de::Error) -> Self {
        VoxflowError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for VoxflowError {
    fn from(err: toml::ser::Error) -> Self {
        VoxflowError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VoxflowError {
    fn from(err: serde_json::Error) -> Self {
        VoxflowError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Voxflow operations.
pub type Result<T> = std::result::Result<T, VoxflowError>;
