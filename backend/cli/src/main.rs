mod pipeline;
mod terminal_output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use cipherbus_bus::InMemoryTopicBus;
use cipherbus_config::{load_and_prepare, to_yaml, validate, PipelineConfig};
use cipherbus_gateway::{start_server, HealthReport};
use cipherbus_logging::{init_logger, LogSettings};
use cipherbus_storage::{start_storage_server, ImageStore};

use terminal_output::{note_error, note_info, note_success, note_warn, render_pairs};

#[derive(Parser)]
#[command(name = "cipherbus")]
#[command(about = "Cipherbus: image encryption jobs over a topic bus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway, result notifier and dispatchers in one process
    Serve {
        /// Config file (defaults to ~/.cipherbus/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Port to bind the gateway to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run the standalone storage service
    Storage {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Query a running gateway's health endpoint
    Status {
        #[arg(short, long, default_value_t = cipherbus_config::defaults::DEFAULT_GATEWAY_PORT)]
        port: u16,
    },
    /// Load and validate a config file
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the effective config as YAML
        #[arg(long)]
        print: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            let mut config = load(config).await?;
            if let Some(port) = port {
                config.gateway.port = port;
            }
            run_pipeline(config).await?;
        }
        Commands::Storage { config, port } => {
            let mut config = load(config).await?;
            if let Some(port) = port {
                config.storage.port = port;
            }
            run_storage(config).await?;
        }
        Commands::Status { port } => status(port).await?,
        Commands::CheckConfig { config, print } => check_config(config, print).await?,
    }

    Ok(())
}

/// Load config and start logging from its `logging` section.
async fn load(path: Option<PathBuf>) -> Result<PipelineConfig> {
    let config = load_and_prepare(path.as_deref()).await?;
    init_logger(&LogSettings {
        level: config.logging.level.clone(),
        dir: config.logging.dir.clone(),
        json_console: config.logging.json,
    });
    // Validation ran before the subscriber existed; repeat the warnings now.
    for warning in validate(&config).warnings {
        warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    Ok(config)
}

async fn run_pipeline(config: PipelineConfig) -> Result<()> {
    let addr = config.gateway.socket_addr()?;
    info!(
        addr = %addr,
        exchange = %config.bus.exchange,
        program = %config.worker.program,
        "Starting cipherbus pipeline"
    );

    let bus = Arc::new(InMemoryTopicBus::with_buffer_size(config.bus.buffer_size));
    let runner = pipeline::process_runner(&config);
    let storage = pipeline::storage_client(&config)?;
    let pipeline = pipeline::assemble(&config, bus, runner, storage).await?;

    start_server(addr, pipeline.state.clone(), config.gateway.max_request_bytes).await?;
    pipeline.shutdown();
    Ok(())
}

async fn run_storage(config: PipelineConfig) -> Result<()> {
    let addr = config.storage.socket_addr()?;
    info!(addr = %addr, "Starting storage service");
    start_storage_server(addr, ImageStore::new(), config.storage.max_request_bytes).await
}

async fn status(port: u16) -> Result<()> {
    let url = format!("http://localhost:{port}/api/health");
    let response = match reqwest::Client::new().get(&url).send().await {
        Ok(resp) => resp,
        Err(_) => {
            note_error(&format!("cipherbus is not running on port {port}"));
            return Ok(());
        }
    };
    let report: HealthReport = response
        .json()
        .await
        .context("Gateway returned an unexpected health body")?;

    note_success(&format!("gateway on port {port} is {}", report.status));
    print!(
        "{}",
        render_pairs(&[
            ("exchange", report.exchange),
            ("uptime", format!("{}s", report.uptime_seconds)),
            ("sessions", report.bound_sessions.to_string()),
            ("pending", report.pending_jobs.to_string()),
            ("checked", report.timestamp.to_rfc3339()),
        ])
    );
    Ok(())
}

async fn check_config(path: Option<PathBuf>, print: bool) -> Result<()> {
    let config = match load_and_prepare(path.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            note_error(&format!("{e:#}"));
            std::process::exit(1);
        }
    };
    for warning in validate(&config).warnings {
        note_warn(&warning.to_string());
    }
    note_success("configuration is valid");
    if print {
        note_info("effective configuration:");
        print!("{}", to_yaml(&config)?);
    }
    Ok(())
}
