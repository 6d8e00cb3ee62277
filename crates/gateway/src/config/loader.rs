use std::path::{Path, PathBuf};

use terralens_common::config::SystemConfig;

use super::validation;

/// Load the gateway configuration from a system.toml file.
///
/// A missing file falls back to defaults. A file that exists but fails
/// to parse or validate is fatal; the gateway refuses to start on it.
pub fn load_config(path: &Path) -> Result<SystemConfig, ConfigError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(SystemConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: SystemConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    validation::validate(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        path = %path.display(),
        handle_ttl_s = config.registry.handle_ttl_seconds,
        max_handles = config.registry.max_handles,
        engine = %config.engine.base_url,
        "Configuration loaded"
    );

    Ok(config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("validation failed: {0}")]
    Validation(String),
}
