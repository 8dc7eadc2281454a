//! Environment handling for config values.
//!
//! Two mechanisms:
//! - `${VAR_NAME}` references inside string values, resolved at load time.
//!   Only uppercase `[A-Z_][A-Z0-9_]*` names are matched and `$${VAR}` escapes to a
//!   literal `${VAR}`.
//! - `CIPHERBUS_*` variables that override individual fields after the file is read.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

use crate::schema::PipelineConfig;

/// A reference, optionally preceded by the `$` escape.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

pub const ENV_PREFIX: &str = "CIPHERBUS_";

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references in a config JSON value tree using the process env.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute env vars using a provided map.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => {
            let result: Result<Vec<_>> = arr
                .iter()
                .enumerate()
                .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
                .collect();
            Ok(Value::Array(result?))
        }
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let substituted = ENV_VAR_PATTERN.replace_all(s, |caps: &regex::Captures| {
        let var_name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{var_name}}}");
        }
        match env.get(var_name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: var_name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    if let Some(err) = missing {
        bail!(err);
    }
    Ok(substituted.into_owned())
}

/// Collect all env var names referenced in a config value tree.
pub fn collect_referenced_vars(value: &Value) -> Vec<String> {
    let mut vars = Vec::new();
    collect_vars_recursive(value, &mut vars);
    vars.sort();
    vars.dedup();
    vars
}

fn collect_vars_recursive(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for caps in ENV_VAR_PATTERN.captures_iter(s) {
                if caps[1].is_empty() {
                    out.push(caps[2].to_string());
                }
            }
        }
        Value::Array(arr) => arr.iter().for_each(|v| collect_vars_recursive(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_vars_recursive(v, out)),
        _ => {}
    }
}

/// Apply `CIPHERBUS_*` overrides from the process environment.
pub fn apply_env_overrides(config: PipelineConfig) -> Result<PipelineConfig> {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply `CIPHERBUS_*` overrides from a provided map. Unparseable values are errors.
pub fn apply_env_overrides_with(
    mut config: PipelineConfig,
    env: &HashMap<String, String>,
) -> Result<PipelineConfig> {
    let var = |suffix: &str| {
        env.get(&format!("{ENV_PREFIX}{suffix}"))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = var("GATEWAY_BIND") {
        config.gateway.bind = v.to_string();
    }
    if let Some(v) = var("GATEWAY_PORT") {
        config.gateway.port = parse("GATEWAY_PORT", v)?;
    }
    if let Some(v) = var("BUS_EXCHANGE") {
        config.bus.exchange = v.to_string();
    }
    if let Some(v) = var("WORKER_PROGRAM") {
        config.worker.program = v.to_string();
    }
    if let Some(v) = var("WORKER_LAUNCHER_ARGS") {
        config.worker.launcher_args = v.split_whitespace().map(String::from).collect();
    }
    if let Some(v) = var("WORKER_WORK_DIR") {
        config.worker.work_dir = v.into();
    }
    if let Some(v) = var("WORKER_TIMEOUT_SECS") {
        config.worker.timeout_secs = parse("WORKER_TIMEOUT_SECS", v)?;
    }
    if let Some(v) = var("WORKER_MAX_CONCURRENT_JOBS") {
        config.worker.max_concurrent_jobs = parse("WORKER_MAX_CONCURRENT_JOBS", v)?;
    }
    if let Some(v) = var("WORKER_REPLICAS") {
        config.worker.replicas = parse("WORKER_REPLICAS", v)?;
    }
    if let Some(v) = var("WORKER_KEEP_ARTIFACTS") {
        config.worker.keep_artifacts = parse("WORKER_KEEP_ARTIFACTS", v)?;
    }
    if let Some(v) = var("STORAGE_URL") {
        config.storage.url = v.to_string();
    }
    if let Some(v) = var("STORAGE_ENABLED") {
        config.storage.enabled = parse("STORAGE_ENABLED", v)?;
    }
    if let Some(v) = var("STORAGE_PORT") {
        config.storage.port = parse("STORAGE_PORT", v)?;
    }
    if let Some(v) = var("LOG_LEVEL") {
        config.logging.level = v.to_string();
    }
    if let Some(v) = var("LOG_DIR") {
        config.logging.dir = Some(v.into());
    }
    Ok(config)
}

fn parse<T>(suffix: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("{ENV_PREFIX}{suffix} has invalid value '{raw}'"))
}
