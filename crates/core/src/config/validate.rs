use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one job and one slot
/// - Non-zero poll interval
/// - Worker program is set
/// - Job id variable is a usable environment variable name
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.run.total_jobs == 0 {
        return Err(ConfigError::ValidationError(
            "run.total_jobs must be at least 1".to_string(),
        ));
    }

    if config.run.max_parallel == 0 {
        return Err(ConfigError::ValidationError(
            "run.max_parallel must be at least 1".to_string(),
        ));
    }

    if config.run.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "run.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.worker.program.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "worker.program cannot be empty".to_string(),
        ));
    }

    let var = &config.worker.job_id_var;
    if var.is_empty() || var.contains('=') || var.contains('\0') {
        return Err(ConfigError::ValidationError(format!(
            "worker.job_id_var is not a valid variable name: {:?}",
            var
        )));
    }

    Ok(())
}
