//! Testing utilities for orchestrator tests.
//!
//! [`ScriptedLauncher`] starts real `sh` workers whose behavior is chosen per
//! job, and [`MemoryStatusStore`] records every status write so tests can
//! check the whole sequence rather than just the final record.
//!
//! # Example
//!
//! ```rust,ignore
//! use orderfleet_core::testing::{fixtures, JobScript, MemoryStatusStore, ScriptedLauncher};
//!
//! let launcher = ScriptedLauncher::new().with_script(1, JobScript::exit(5, ms(20)));
//! let store = MemoryStatusStore::new();
//! let config = fixtures::orchestrator_config(dir.path(), 4, 2);
//!
//! let summary = Orchestrator::new(config, launcher, Arc::new(store.clone())).run().await?;
//! assert!(summary.aborted);
//! ```

mod memory_status;
mod scripted_launcher;

pub use memory_status::MemoryStatusStore;
pub use scripted_launcher::{JobScript, RecordedLaunch, ScriptedLauncher};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use crate::config::WorkerConfig;
    use crate::orchestrator::OrchestratorConfig;

    /// Orchestrator settings with short delays, logging under `log_dir`.
    pub fn orchestrator_config(log_dir: &Path, total_jobs: u32, max_parallel: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            total_jobs,
            max_parallel: max_parallel.min(total_jobs as usize),
            stagger: Duration::from_millis(20),
            poll_interval: Duration::from_millis(10),
            grace_period: Duration::from_millis(500),
            log_dir: log_dir.to_path_buf(),
            combined_log: log_dir.join("latest_logs.txt"),
            reader_drain_timeout: Duration::from_secs(1),
            relay_buffer: 256,
        }
    }

    /// Worker configuration running `script` with `sh -c`.
    pub fn sh_worker(script: &str) -> WorkerConfig {
        WorkerConfig {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
            job_id_var: "ORDER_NUMBER".to_string(),
            inherit_env: true,
            env: BTreeMap::new(),
        }
    }
}
