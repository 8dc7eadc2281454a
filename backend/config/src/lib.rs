//! `cipherbus-config` — pipeline runtime configuration.
//!
//! Provides:
//! - Typed config schema with per-section defaults
//! - YAML loading
//! - `${ENV_VAR}` substitution and `CIPHERBUS_*` overrides
//! - Deep validation

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{
    apply_env_overrides, apply_env_overrides_with, collect_referenced_vars, resolve_env_vars,
    resolve_env_vars_with, MissingEnvVarError,
};
pub use io::{config_dir, config_file_path, load_config, parse_yaml, to_yaml};
pub use schema::{
    BusConfig, GatewayConfig, LoggingConfig, PipelineConfig, StorageConfig, WorkerConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Load, substitute, override, default and validate a config file.
///
/// With no path, `~/.cipherbus/config.yaml` is used if present.
pub async fn load_and_prepare(path: Option<&Path>) -> Result<PipelineConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path(&config_dir()),
    };
    let raw = load_config(&path).await?;
    let env: HashMap<String, String> = std::env::vars().collect();
    let (config, report) = prepare_with(raw, &env)?;
    finish(config, report)
}

/// The load pipeline minus file I/O, with an explicit environment.
pub fn prepare_with(
    raw: Value,
    env: &HashMap<String, String>,
) -> Result<(PipelineConfig, ValidationReport)> {
    let value = resolve_env_vars_with(&raw, env).context("Failed to resolve env vars in config")?;

    let config: PipelineConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;

    let config = apply_env_overrides_with(config, env)?;
    let config = apply_all_defaults(config);
    let report = validate(&config);
    Ok((config, report))
}

fn finish(config: PipelineConfig, report: ValidationReport) -> Result<PipelineConfig> {
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if !report.is_valid() {
        let summary: Vec<String> = report.errors.iter().map(|e| e.to_string()).collect();
        bail!("Invalid configuration:\n  {}", summary.join("\n  "));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn overrides_win_over_file_values() {
        let raw = parse_yaml("gateway:\n  port: 9000\nbus:\n  exchange: ${EXCHANGE}\n").unwrap();
        let (cfg, report) = prepare_with(
            raw,
            &env(&[("EXCHANGE", "images"), ("CIPHERBUS_GATEWAY_PORT", "9100")]),
        )
        .unwrap();
        assert!(report.is_valid());
        assert_eq!(cfg.gateway.port, 9100);
        assert_eq!(cfg.bus.exchange, "images");
    }

    #[test]
    fn invalid_config_fails_to_finish() {
        let raw = parse_yaml("worker:\n  replicas: 0\n").unwrap();
        let (cfg, report) = prepare_with(raw, &HashMap::new()).unwrap();
        let err = finish(cfg, report).unwrap_err();
        assert!(err.to_string().contains("worker.replicas"));
    }

    #[test]
    fn wrong_type_is_a_deserialize_error() {
        let raw = parse_yaml("gateway:\n  port: high\n").unwrap();
        assert!(prepare_with(raw, &HashMap::new()).is_err());
    }
}
