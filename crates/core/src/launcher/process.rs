//! Launcher that spawns the configured worker executable.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::WorkerConfig;

use super::error::LaunchError;
use super::traits::Launcher;
use super::worker::WorkerProcess;

/// Spawns one OS process per job.
pub struct ProcessLauncher {
    config: WorkerConfig,
}

impl ProcessLauncher {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    /// Variables set on top of the inherited environment for `job_id`.
    ///
    /// The forwarded settings are copied unchanged, then the job id
    /// variable is overlaid so it always wins.
    pub fn job_environment(&self, job_id: u32) -> BTreeMap<String, String> {
        let mut env = self.config.env.clone();
        env.insert(self.config.job_id_var.clone(), job_id.to_string());
        env
    }

    fn build_command(&self, job_id: u32) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);

        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }

        if !self.config.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(self.job_environment(job_id));

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so stop/kill also reach helpers the worker spawns.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    fn name(&self) -> &str {
        "process"
    }

    async fn start(&self, job_id: u32) -> Result<WorkerProcess, LaunchError> {
        let child = self.build_command(job_id).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LaunchError::ProgramNotFound {
                    path: self.config.program.clone(),
                }
            } else {
                LaunchError::Spawn { job_id, source: e }
            }
        })?;

        let worker = WorkerProcess::new(job_id, child);
        tracing::debug!(
            job_id,
            pid = ?worker.pid(),
            program = %self.config.program.display(),
            "Worker spawned"
        );
        Ok(worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::sh_worker;
    use std::path::PathBuf;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_job_environment_overlays_job_id() {
        let mut config = sh_worker("true");
        config.env.insert("AUTOMATION_NAME".to_string(), "Jane".to_string());
        config.env.insert("ORDER_NUMBER".to_string(), "stale".to_string());
        let launcher = ProcessLauncher::new(config);

        let env = launcher.job_environment(3);
        assert_eq!(env.get("AUTOMATION_NAME").unwrap(), "Jane");
        assert_eq!(env.get("ORDER_NUMBER").unwrap(), "3");
        assert_eq!(env.len(), 2);
    }

    #[tokio::test]
    async fn test_start_passes_environment_and_pipes_output() {
        let mut config = sh_worker("echo \"$ORDER_NUMBER:$AUTOMATION_NAME\"; echo oops >&2");
        config.env.insert("AUTOMATION_NAME".to_string(), "Jane".to_string());
        let launcher = ProcessLauncher::new(config);

        let mut worker = launcher.start(9).await.unwrap();
        assert_eq!(worker.job_id(), 9);
        assert!(worker.pid().is_some());

        let mut stdout = worker.take_stdout().expect("stdout should be piped");
        let mut stderr = worker.take_stderr().expect("stderr should be piped");
        let mut out = String::new();
        let mut err = String::new();
        stdout.read_to_string(&mut out).await.unwrap();
        stderr.read_to_string(&mut err).await.unwrap();

        assert_eq!(out.trim(), "9:Jane");
        assert_eq!(err.trim(), "oops");
        assert!(worker.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_start_without_inherited_env() {
        std::env::set_var("FLEET_TEST_INHERITED", "leaked");
        let mut config = sh_worker("echo \"[${FLEET_TEST_INHERITED:-}]\"");
        config.program = PathBuf::from("/bin/sh");
        config.inherit_env = false;
        let launcher = ProcessLauncher::new(config);

        let mut worker = launcher.start(1).await.unwrap();
        let mut out = String::new();
        worker
            .take_stdout()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        worker.wait().await.unwrap();
        assert_eq!(out.trim(), "[]");
    }

    #[tokio::test]
    async fn test_start_missing_program() {
        let mut config = sh_worker("true");
        config.program = PathBuf::from("/nonexistent/worker-binary");
        let launcher = ProcessLauncher::new(config);

        let err = launcher.start(1).await.unwrap_err();
        assert!(matches!(err, LaunchError::ProgramNotFound { .. }));
    }

    #[tokio::test]
    async fn test_exit_code_is_observable() {
        let launcher = ProcessLauncher::new(sh_worker("exit 5"));
        let mut worker = launcher.start(1).await.unwrap();
        let status = worker.wait().await.unwrap();
        assert_eq!(status.code(), Some(5));
    }
}
