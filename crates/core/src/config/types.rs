use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    pub worker: WorkerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Scheduling parameters for a single orchestrator run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Number of jobs to run (ids 1..=total_jobs).
    #[serde(default = "default_total_jobs")]
    pub total_jobs: u32,
    /// Maximum number of workers alive at the same time.
    /// Values above `total_jobs` are capped at run time.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: u32,
    /// Delay inserted before every launch except the first one.
    #[serde(default = "default_stagger_seconds")]
    pub stagger_seconds: u64,
    /// Sleep between control loop iterations (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long terminated workers get to exit before being killed.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

impl RunConfig {
    /// Parallelism actually used: never more slots than jobs.
    pub fn effective_parallelism(&self) -> usize {
        self.max_parallel.min(self.total_jobs) as usize
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_jobs: default_total_jobs(),
            max_parallel: default_max_parallel(),
            stagger_seconds: default_stagger_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

fn default_total_jobs() -> u32 {
    1
}

fn default_max_parallel() -> u32 {
    1
}

fn default_stagger_seconds() -> u64 {
    8
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_grace_period_secs() -> u64 {
    5
}

/// How each worker process is started
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Executable to run for every job.
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Environment variable that carries the job id.
    #[serde(default = "default_job_id_var")]
    pub job_id_var: String,
    /// Pass the orchestrator's own environment through to workers.
    #[serde(default = "default_inherit_env")]
    pub inherit_env: bool,
    /// Settings forwarded unchanged to every worker.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_job_id_var() -> String {
    "ORDER_NUMBER".to_string()
}

fn default_inherit_env() -> bool {
    true
}

/// Filesystem locations for the status record and logs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// File name of the combined log inside `log_dir`.
    #[serde(default = "default_combined_log")]
    pub combined_log: String,
}

impl PathsConfig {
    pub fn combined_log_path(&self) -> PathBuf {
        self.log_dir.join(&self.combined_log)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            status_file: default_status_file(),
            log_dir: default_log_dir(),
            combined_log: default_combined_log(),
        }
    }
}

fn default_status_file() -> PathBuf {
    PathBuf::from("automation_status.json")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_combined_log() -> String {
    "latest_logs.txt".to_string()
}

/// Sanitized config for log output (secret-looking env values redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub run: RunConfig,
    pub worker: SanitizedWorkerConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedWorkerConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub job_id_var: String,
    pub inherit_env: bool,
    pub env: BTreeMap<String, String>,
}

const SECRET_MARKERS: &[&str] = &["KEY", "TOKEN", "SECRET", "PASSWORD"];

fn looks_secret(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    SECRET_MARKERS.iter().any(|m| upper.contains(m))
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let env = config
            .worker
            .env
            .iter()
            .map(|(k, v)| {
                let shown = if looks_secret(k) {
                    "****".to_string()
                } else {
                    v.clone()
                };
                (k.clone(), shown)
            })
            .collect();

        Self {
            run: config.run.clone(),
            worker: SanitizedWorkerConfig {
                program: config.worker.program.clone(),
                args: config.worker.args.clone(),
                working_dir: config.worker.working_dir.clone(),
                job_id_var: config.worker.job_id_var.clone(),
                inherit_env: config.worker.inherit_env,
                env,
            },
            paths: config.paths.clone(),
        }
    }
}
