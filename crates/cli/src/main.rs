//! orderfleet - parallel worker orchestrator
//!
//! Runs a batch of numbered jobs through a configured worker executable,
//! a few at a time, and keeps a status record other tools can poll.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use orderfleet_core::{
    load_config, validate_config, Config, FileStatusStore, Orchestrator, OrchestratorConfig,
    ProcessLauncher, SanitizedConfig, StatusStore,
};

/// Environment variable naming the configuration file
const CONFIG_ENV: &str = "ORDERFLEET_CONFIG";

/// Configuration file used when nothing else is given
const DEFAULT_CONFIG: &str = "orderfleet.toml";

/// Exit code for a run that was aborted
const EXIT_ABORTED: u8 = 2;

/// orderfleet - parallel worker orchestrator
#[derive(Parser, Debug)]
#[command(name = "orderfleet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every job and wait for the batch to finish
    Run {
        /// Number of jobs to run
        #[arg(long)]
        total_jobs: Option<u32>,

        /// Maximum number of workers alive at once
        #[arg(long)]
        max_parallel: Option<u32>,

        /// Seconds between consecutive launches
        #[arg(long)]
        stagger_seconds: Option<u64>,
    },

    /// Print the last persisted run status
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        Commands::Run {
            total_jobs,
            max_parallel,
            stagger_seconds,
        } => {
            let mut config = load(&config_path)?;
            if let Some(n) = total_jobs {
                config.run.total_jobs = n;
            }
            if let Some(n) = max_parallel {
                config.run.max_parallel = n;
            }
            if let Some(s) = stagger_seconds {
                config.run.stagger_seconds = s;
            }
            validate_config(&config).context("Configuration validation failed")?;
            run(config).await
        }
        Commands::Status => {
            let config = load(&config_path)?;
            status(&config)
        }
    }
}

fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

fn load(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from {:?}", config_path);
    load_config(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))
}

async fn run(config: Config) -> Result<ExitCode> {
    let sanitized = SanitizedConfig::from(&config);
    debug!(
        config = %serde_json::to_string(&sanitized).unwrap_or_default(),
        "Effective configuration"
    );
    info!("Worker program: {:?}", config.worker.program);
    info!("Status file: {:?}", config.paths.status_file);

    let status_store: Arc<dyn StatusStore> =
        Arc::new(FileStatusStore::new(config.paths.status_file.clone()));
    let launcher = ProcessLauncher::new(config.worker.clone());
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::from_config(&config),
        launcher,
        status_store,
    );

    let stop = orchestrator.stop_handle();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Interrupt received, stopping all workers...");
        stop.stop();
    });

    let result = orchestrator.run().await;
    signal_task.abort();
    let summary = result.context("Run could not start")?;

    println!(
        "Final stats: Success={}, Failure={}",
        summary.success_count, summary.failure_count
    );

    if summary.aborted {
        let reason = summary
            .abort_reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("Run aborted ({})", reason);
        return Ok(ExitCode::from(EXIT_ABORTED));
    }
    Ok(ExitCode::SUCCESS)
}

fn status(config: &Config) -> Result<ExitCode> {
    let store = FileStatusStore::new(config.paths.status_file.clone());
    let state = store
        .load()
        .with_context(|| format!("Failed to read {:?}", store.path()))?;

    match state {
        Some(state) => {
            let json = serde_json::to_string_pretty(&state).context("Failed to render status")?;
            println!("{}", json);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("No run status found at {:?}", store.path());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
