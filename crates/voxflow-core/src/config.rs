use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VoxflowError};

/// Top-level configuration for the orchestration engine.
///
/// Loaded from a TOML file by the host; every section and field has a
/// default so a missing or partial file still yields a working engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OrchestratorConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is
    /// missing or unparseable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VoxflowError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the session database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.voxflow/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database filename inside `data_dir`.
    pub db_file: String,
    /// Per-operation deadline for store access, in milliseconds. On
    /// timeout the caller degrades to a fresh session view.
    pub op_deadline_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_file: "sessions.db".to_string(),
            op_deadline_ms: 800,
        }
    }
}

/// Routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Path to the phase catalog TOML, relative to `data_dir` unless
    /// absolute.
    pub catalog_file: String,
    /// Phases that keep a per-phase visit counter in addition to the
    /// turn counter (used by loop-detection expressions).
    pub loop_sensitive: Vec<String>,
    /// Extra `data` keys (beyond the built-in set) cleared when a
    /// session key is reused.
    pub extra_transient_keys: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            catalog_file: "phases.toml".to_string(),
            loop_sensitive: vec!["objection".to_string(), "quote".to_string()],
            extra_transient_keys: Vec::new(),
        }
    }
}
