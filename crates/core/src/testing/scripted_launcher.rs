//! Scripted launcher for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::RwLock;

use crate::launcher::{LaunchError, Launcher, WorkerProcess};

/// What the worker for one job does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobScript {
    /// Sleep, then exit with `code`.
    Exit { code: i32, after: Duration },
    /// Write `line` to stdout and `err: line` to stderr, then exit with `code`.
    Print { line: String, code: i32 },
    /// Write `lines` numbered lines to stdout as fast as possible, then exit.
    Flood { lines: u32, code: i32 },
    /// Exit with `code` while a background helper keeps the output pipes
    /// open for `linger`.
    Detach { code: i32, linger: Duration },
    /// Run until stopped.
    Hang,
    /// Run until killed; SIGTERM is ignored.
    IgnoreStop,
    /// The launch itself fails.
    FailToStart,
}

impl JobScript {
    pub fn exit(code: i32, after: Duration) -> Self {
        Self::Exit { code, after }
    }

    fn shell(&self) -> String {
        match self {
            Self::Exit { code, after } => {
                format!("sleep {:.3}; exit {}", after.as_secs_f64(), code)
            }
            Self::Print { line, code } => {
                format!("echo '{line}'; echo 'err: {line}' >&2; exit {code}")
            }
            Self::Flood { lines, code } => format!(
                "i=1; while [ $i -le {lines} ]; do echo \"line $i\"; i=$((i+1)); done; exit {code}"
            ),
            Self::Detach { code, linger } => format!(
                "(sleep {:.3}) & echo detached; exit {}",
                linger.as_secs_f64(),
                code
            ),
            Self::Hang => "sleep 3600".to_string(),
            Self::IgnoreStop => "trap '' TERM; sleep 3600".to_string(),
            Self::FailToStart => String::new(),
        }
    }
}

/// A recorded launch attempt for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedLaunch {
    /// Job that was started.
    pub job_id: u32,
    /// When `start` was called.
    pub at: Instant,
    /// Whether a worker process was returned.
    pub started: bool,
}

/// Launcher whose workers follow a per-job script.
///
/// Workers are real `sh` processes in their own process group, so exit
/// codes, output pipes, termination and kills all behave like production.
///
/// # Example
///
/// ```rust,ignore
/// use orderfleet_core::testing::{JobScript, ScriptedLauncher};
///
/// let launcher = ScriptedLauncher::new()
///     .with_script(2, JobScript::exit(5, Duration::from_millis(50)));
///
/// // Run an orchestrator with it...
///
/// let launches = launcher.recorded_launches().await;
/// assert_eq!(launches[0].job_id, 1);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    /// Scripts by job id.
    scripts: HashMap<u32, JobScript>,
    /// Script for jobs without their own.
    default_script: JobScript,
    /// Recorded launches.
    launches: Arc<RwLock<Vec<RecordedLaunch>>>,
}

impl Default for ScriptedLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLauncher {
    /// Every job succeeds after 50ms unless scripted otherwise.
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            default_script: JobScript::exit(0, Duration::from_millis(50)),
            launches: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_script(mut self, job_id: u32, script: JobScript) -> Self {
        self.scripts.insert(job_id, script);
        self
    }

    pub fn with_default(mut self, script: JobScript) -> Self {
        self.default_script = script;
        self
    }

    fn script_for(&self, job_id: u32) -> &JobScript {
        self.scripts.get(&job_id).unwrap_or(&self.default_script)
    }

    /// Get all recorded launches, in call order.
    pub async fn recorded_launches(&self) -> Vec<RecordedLaunch> {
        self.launches.read().await.clone()
    }

    /// Job ids passed to `start`, in call order.
    pub async fn launched_ids(&self) -> Vec<u32> {
        self.launches.read().await.iter().map(|l| l.job_id).collect()
    }

    async fn record(&self, job_id: u32, at: Instant, started: bool) {
        self.launches.write().await.push(RecordedLaunch {
            job_id,
            at,
            started,
        });
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self, job_id: u32) -> Result<WorkerProcess, LaunchError> {
        let at = Instant::now();
        let script = self.script_for(job_id).clone();

        if script == JobScript::FailToStart {
            self.record(job_id, at, false).await;
            return Err(LaunchError::Spawn {
                job_id,
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "scripted launch failure",
                ),
            });
        }

        let mut cmd = Command::new("sh");
        cmd.args(["-c", &script.shell()])
            .env("ORDER_NUMBER", job_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        match cmd.spawn() {
            Ok(child) => {
                self.record(job_id, at, true).await;
                Ok(WorkerProcess::new(job_id, child))
            }
            Err(source) => {
                self.record(job_id, at, false).await;
                Err(LaunchError::Spawn { job_id, source })
            }
        }
    }
}
