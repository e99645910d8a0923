//! Trait definitions for the launcher module.

use async_trait::async_trait;

use super::error::LaunchError;
use super::worker::WorkerProcess;

/// Something that can start the worker for one job.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Returns the name of this launcher implementation.
    fn name(&self) -> &str;

    /// Starts the worker for `job_id`.
    ///
    /// The returned process must have its stdout and stderr piped so the
    /// orchestrator can relay them.
    async fn start(&self, job_id: u32) -> Result<WorkerProcess, LaunchError>;
}
