//! Config validation with field paths and user-friendly messages.

use crate::schema::PipelineConfig;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// Errors are fatal at startup, warnings are only logged.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn require_positive(&mut self, path: &str, value: u64) {
        if value == 0 {
            self.error(path, "must be >= 1");
        }
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &PipelineConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_gateway(config, &mut report);
    validate_bus(config, &mut report);
    validate_worker(config, &mut report);
    validate_storage(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_gateway(config: &PipelineConfig, report: &mut ValidationReport) {
    let gw = &config.gateway;
    check_port(report, "gateway.port", gw.port);
    if gw.socket_addr().is_err() {
        report.error("gateway.bind", format!("'{}' is not an IP address", gw.bind));
    }
    report.require_positive("gateway.maxRequestBytes", gw.max_request_bytes as u64);
    report.require_positive("gateway.wsSendTimeoutMs", gw.ws_send_timeout_ms);
    report.require_positive("gateway.outboundBuffer", gw.outbound_buffer as u64);
    report.require_positive("gateway.pendingJobCapacity", gw.pending_job_capacity as u64);
}

fn validate_bus(config: &PipelineConfig, report: &mut ValidationReport) {
    if config.bus.exchange.trim().is_empty() {
        report.error("bus.exchange", "Exchange name cannot be empty");
    }
    report.require_positive("bus.bufferSize", config.bus.buffer_size as u64);
}

fn validate_worker(config: &PipelineConfig, report: &mut ValidationReport) {
    let worker = &config.worker;
    if worker.program.trim().is_empty() {
        report.error("worker.program", "Compute program is required");
    }
    report.require_positive("worker.timeoutSecs", worker.timeout_secs);
    report.require_positive("worker.maxConcurrentJobs", worker.max_concurrent_jobs as u64);
    report.require_positive("worker.replicas", worker.replicas as u64);
    if worker.keep_artifacts {
        report.warn(
            "worker.keepArtifacts",
            "Transient artifacts are kept; the work directory will grow without bound",
        );
    }
}

fn validate_storage(config: &PipelineConfig, report: &mut ValidationReport) {
    let storage = &config.storage;
    if !storage.enabled {
        report.warn("storage.enabled", "Storage is disabled; artifacts will not be persisted");
        return;
    }
    if !(storage.url.starts_with("http://") || storage.url.starts_with("https://")) {
        report.error(
            "storage.url",
            format!("'{}' must start with http:// or https://", storage.url),
        );
    }
    report.require_positive("storage.requestTimeoutSecs", storage.request_timeout_secs);
}

fn validate_logging(config: &PipelineConfig, report: &mut ValidationReport) {
    let level = config.logging.level.as_str();
    if !matches!(level, "trace" | "debug" | "info" | "warn" | "error") {
        report.warn(
            "logging.level",
            format!("Unknown level '{level}'; it is passed to the filter as a directive"),
        );
    }
}

fn check_port(report: &mut ValidationReport, path: &str, port: u16) {
    if port == 0 {
        report.error(path, "Port must be non-zero");
    } else if port < 1024 && port != 80 && port != 443 {
        report.warn(
            path,
            format!("Port {port} requires elevated privileges; consider using a port >= 1024"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let report = validate(&PipelineConfig::default());
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
    }

    #[test]
    fn zero_concurrency_is_error() {
        let mut cfg = PipelineConfig::default();
        cfg.worker.max_concurrent_jobs = 0;
        cfg.worker.replicas = 0;
        let report = validate(&cfg);
        let paths: Vec<_> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["worker.maxConcurrentJobs", "worker.replicas"]);
    }

    #[test]
    fn storage_url_scheme_is_checked_only_when_enabled() {
        let mut cfg = PipelineConfig::default();
        cfg.storage.url = "c05:3000".into();
        assert!(!validate(&cfg).is_valid());

        cfg.storage.enabled = false;
        let report = validate(&cfg);
        assert!(report.is_valid());
        assert_eq!(report.warnings[0].path, "storage.enabled");
    }

    #[test]
    fn privileged_port_is_warning() {
        let mut cfg = PipelineConfig::default();
        cfg.gateway.port = 81;
        let report = validate(&cfg);
        assert!(report.is_valid());
        assert_eq!(report.warnings[0].path, "gateway.port");
    }
}
