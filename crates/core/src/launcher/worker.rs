use std::process::ExitStatus;

use chrono::{DateTime, Utc};
use tokio::process::{Child, ChildStderr, ChildStdout};

/// A running worker process owned by the orchestrator.
#[derive(Debug)]
pub struct WorkerProcess {
    job_id: u32,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    child: Child,
}

impl WorkerProcess {
    pub fn new(job_id: u32, child: Child) -> Self {
        Self {
            job_id,
            pid: child.id(),
            started_at: Utc::now(),
            child,
        }
    }

    pub fn job_id(&self) -> u32 {
        self.job_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Non-blocking exit check.
    pub fn try_exit(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the worker to stop (SIGTERM to its process group on Unix).
    pub fn request_stop(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                signal_group(pid, nix::sys::signal::Signal::SIGTERM);
                return;
            }
        }
        self.force_kill();
    }

    /// Kill the worker and anything left in its process group.
    pub fn force_kill(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                signal_group(pid, nix::sys::signal::Signal::SIGKILL);
            }
        }
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(job_id = self.job_id, "start_kill failed: {}", e);
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    #[allow(clippy::cast_possible_wrap)]
    let target = Pid::from_raw(pid as i32);
    match killpg(target, signal) {
        Ok(()) => {}
        // Not a group leader: signal the process alone.
        Err(Errno::ESRCH) => match kill(target, signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!(pid, ?signal, "Failed to signal worker: {}", e),
        },
        Err(e) => tracing::warn!(pid, ?signal, "Failed to signal worker group: {}", e),
    }
}
