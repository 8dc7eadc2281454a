//! Pipeline runtime configuration schema.
//!
//! Every section deserializes with defaults, so an empty file (or no file) is a
//! complete configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::defaults::*;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// HTTP/WebSocket ingestion gateway
    pub gateway: GatewayConfig,

    /// Topic bus
    pub bus: BusConfig,

    /// Job dispatchers and the external compute program
    pub worker: WorkerConfig,

    /// Storage collaborator
    pub storage: StorageConfig,

    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    /// Upper bound on a submission body, images included.
    pub max_request_bytes: usize,
    /// How long a push may wait on a slow WebSocket client.
    pub ws_send_timeout_ms: u64,
    /// Outbound frames buffered per WebSocket connection.
    pub outbound_buffer: usize,
    /// Pending-job hints kept before the oldest are evicted.
    pub pending_job_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_GATEWAY_PORT,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            ws_send_timeout_ms: DEFAULT_WS_SEND_TIMEOUT_MS,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            pending_job_capacity: DEFAULT_PENDING_JOB_CAPACITY,
        }
    }
}

impl GatewayConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        socket_addr(&self.bind, self.port)
    }

    pub fn ws_send_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_send_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusConfig {
    /// Channel every job and result travels on.
    pub exchange: String,
    /// Queue depth per subscription.
    pub buffer_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE.to_string(),
            buffer_size: DEFAULT_BUS_BUFFER,
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerConfig {
    /// Executable to launch, possibly a launcher such as `mpirun`.
    pub program: String,
    /// Arguments placed before the job's positional arguments.
    pub launcher_args: Vec<String>,
    pub work_dir: PathBuf,
    pub timeout_secs: u64,
    pub max_concurrent_jobs: usize,
    /// Dispatchers sharing the job subscription.
    pub replicas: usize,
    /// Leave transient inputs and outputs on disk after a job.
    pub keep_artifacts: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_WORKER_PROGRAM.to_string(),
            launcher_args: DEFAULT_LAUNCHER_ARGS.iter().map(|s| s.to_string()).collect(),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            timeout_secs: DEFAULT_WORKER_TIMEOUT_SECS,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            replicas: DEFAULT_WORKER_REPLICAS,
            keep_artifacts: false,
        }
    }
}

impl WorkerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Where dispatchers upload finished artifacts.
    pub url: String,
    /// When false, dispatchers skip uploads entirely.
    pub enabled: bool,
    pub request_timeout_secs: u64,
    /// Listen address for `cipherbus storage`.
    pub bind: String,
    pub port: u16,
    pub max_request_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORAGE_URL.to_string(),
            enabled: true,
            request_timeout_secs: DEFAULT_STORAGE_TIMEOUT_SECS,
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_STORAGE_PORT,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl StorageConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        socket_addr(&self.bind, self.port)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for the rolling NDJSON log. Unset means console only.
    pub dir: Option<PathBuf>,
    /// Emit console logs as JSON.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            dir: None,
            json: false,
        }
    }
}

fn socket_addr(bind: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address '{bind}': {e}"))?;
    Ok(SocketAddr::new(ip, port))
}
