//! Job orchestrator for batched worker runs.
//!
//! The orchestrator drives a fixed batch of jobs to completion:
//! - **Launch**: Sequential, staggered (one worker at a time)
//! - **Monitor**: Concurrent (up to `max_parallel` workers alive at once)
//! - **Abort**: Global (one fatal exit stops every job still pending or running)

mod abort;
mod config;
mod pool;
mod queue;
mod runner;
mod types;

pub use abort::{AbortCoordinator, AbortReport};
pub use config::OrchestratorConfig;
pub use pool::{PoolError, WorkerSlotPool};
pub use queue::JobQueue;
pub use runner::{Orchestrator, StopHandle};
pub use types::{Job, JobOutcome, JobState, OrchestratorError, RunSummary, FATAL_EXIT_CODE};
