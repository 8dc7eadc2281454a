//! Config defaults: constants plus fix-ups for values left blank in a file.

use crate::schema::PipelineConfig;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_GATEWAY_PORT: u16 = 7777;
pub const DEFAULT_STORAGE_PORT: u16 = 3000;

/// Submissions carry whole images.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 100_000_000;

pub const DEFAULT_WS_SEND_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_OUTBOUND_BUFFER: usize = 32;
pub const DEFAULT_PENDING_JOB_CAPACITY: usize = 10_000;

pub const DEFAULT_EXCHANGE: &str = "pictures";
pub const DEFAULT_BUS_BUFFER: usize = 256;

pub const DEFAULT_WORKER_PROGRAM: &str = "mpirun";
pub const DEFAULT_LAUNCHER_ARGS: [&str; 5] = ["-np", "2", "--host", "c03,c04", "./executable_mpi"];
pub const DEFAULT_WORK_DIR: &str = "work";
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
pub const DEFAULT_WORKER_REPLICAS: usize = 1;

pub const DEFAULT_STORAGE_URL: &str = "http://localhost:3000";
pub const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: PipelineConfig) -> PipelineConfig {
    let config = apply_string_defaults(config);
    apply_logging_defaults(config)
}

/// An explicitly empty string in YAML means "use the default".
fn apply_string_defaults(mut config: PipelineConfig) -> PipelineConfig {
    fill(&mut config.gateway.bind, DEFAULT_BIND);
    fill(&mut config.bus.exchange, DEFAULT_EXCHANGE);
    fill(&mut config.worker.program, DEFAULT_WORKER_PROGRAM);
    fill(&mut config.storage.url, DEFAULT_STORAGE_URL);
    fill(&mut config.storage.bind, DEFAULT_BIND);
    if config.worker.work_dir.as_os_str().is_empty() {
        config.worker.work_dir = DEFAULT_WORK_DIR.into();
    }
    config
}

fn apply_logging_defaults(mut config: PipelineConfig) -> PipelineConfig {
    config.logging.level = config.logging.level.trim().to_lowercase();
    fill(&mut config.logging.level, DEFAULT_LOG_LEVEL);
    config
}

fn fill(field: &mut String, default: &str) {
    if field.trim().is_empty() {
        *field = default.to_string();
    }
}
