//! Orchestrator configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Resolved settings for one run.
///
/// Built from the file configuration with [`OrchestratorConfig::from_config`];
/// tests construct it directly to use sub-second delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of jobs to run.
    pub total_jobs: u32,

    /// Worker slots. Already capped to `total_jobs`.
    pub max_parallel: usize,

    /// Delay before every launch after the first one.
    pub stagger: Duration,

    /// Sleep between control loop iterations.
    pub poll_interval: Duration,

    /// How long terminated workers get before being killed.
    pub grace_period: Duration,

    /// Directory holding the combined and per-job logs.
    pub log_dir: PathBuf,

    /// Combined run log.
    pub combined_log: PathBuf,

    /// How long to wait for output readers once every job is done.
    #[serde(default = "default_reader_drain")]
    pub reader_drain_timeout: Duration,

    /// Buffered log lines between readers and the log writer.
    #[serde(default = "default_relay_buffer")]
    pub relay_buffer: usize,
}

fn default_reader_drain() -> Duration {
    Duration::from_secs(2)
}

fn default_relay_buffer() -> usize {
    1024
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            total_jobs: config.run.total_jobs,
            max_parallel: config.run.effective_parallelism(),
            stagger: Duration::from_secs(config.run.stagger_seconds),
            poll_interval: Duration::from_millis(config.run.poll_interval_ms),
            grace_period: Duration::from_secs(config.run.grace_period_secs),
            log_dir: config.paths.log_dir.clone(),
            combined_log: config.paths.combined_log_path(),
            reader_drain_timeout: default_reader_drain(),
            relay_buffer: default_relay_buffer(),
        }
    }
}
