pub mod config;
pub mod launcher;
pub mod orchestrator;
pub mod relay;
pub mod status;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, PathsConfig,
    RunConfig, SanitizedConfig, WorkerConfig,
};
pub use launcher::{LaunchError, Launcher, ProcessLauncher, WorkerProcess};
pub use orchestrator::{
    JobState, Orchestrator, OrchestratorConfig, OrchestratorError, RunSummary,
    StopHandle, FATAL_EXIT_CODE,
};
pub use status::{AbortReason, FileStatusStore, RunState, StatusError, StatusStore};
