//! Config file discovery and reading.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::schema::PipelineConfig;

const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolve the config directory.
/// Priority: `CIPHERBUS_CONFIG_DIR` env > `~/.cipherbus/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CIPHERBUS_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".cipherbus"))
        .unwrap_or_else(|| PathBuf::from(".cipherbus"))
}

pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Read a config file as an untyped tree, ready for env substitution.
///
/// Returns an empty object if the file doesn't exist.
pub async fn load_config(path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let value = parse_yaml(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(value)
}

/// Parse YAML text into a JSON tree. An empty document is an empty object.
pub fn parse_yaml(raw: &str) -> Result<Value> {
    let value: Value = serde_yaml::from_str(raw)?;
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}

/// Render the effective config back to YAML.
pub fn to_yaml(config: &PipelineConfig) -> Result<String> {
    serde_yaml::to_string(config).context("Failed to serialize config to YAML")
}
