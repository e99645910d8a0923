//! Error types for the launcher module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while starting a worker.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Worker executable not found.
    #[error("Worker program not found: {path}")]
    ProgramNotFound { path: PathBuf },

    /// The OS refused to create the process.
    #[error("Failed to spawn worker for job {job_id}: {source}")]
    Spawn {
        job_id: u32,
        #[source]
        source: std::io::Error,
    },
}
