//! Launching worker processes.
//!
//! The [`Launcher`] trait is the seam between the orchestrator and the
//! operating system. [`ProcessLauncher`] spawns the configured worker
//! executable with a per-job environment; tests substitute a scripted
//! launcher from [`crate::testing`].

mod error;
mod process;
mod traits;
mod worker;

pub use error::LaunchError;
pub use process::ProcessLauncher;
pub use traits::Launcher;
pub use worker::WorkerProcess;
