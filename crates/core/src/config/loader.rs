use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix for environment variable overrides, e.g. `ORDERFLEET_RUN__MAX_PARALLEL=3`
const ENV_PREFIX: &str = "ORDERFLEET_";

/// Overrides below this prefix become worker environment entries with their
/// case kept, e.g. `ORDERFLEET_WORKER__ENV__API_KEY` sets `API_KEY`.
const WORKER_ENV_PREFIX: &str = "ORDERFLEET_WORKER__ENV__";
const WORKER_ENV_KEY: &str = "WORKER__ENV__";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(
            Env::prefixed(ENV_PREFIX)
                .filter(|key| !key.as_str().to_ascii_uppercase().starts_with(WORKER_ENV_KEY))
                .split("__"),
        )
        .merge(
            Env::prefixed(WORKER_ENV_PREFIX)
                .lowercase(false)
                .map(|key| format!("worker.env.{}", key.as_str()).into()),
        )
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[run]
total_jobs = 4
max_parallel = 2

[worker]
program = "python3"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.run.total_jobs, 4);
        assert_eq!(config.run.max_parallel, 2);
    }

    #[test]
    fn test_load_config_from_str_missing_worker() {
        let toml = r#"
[run]
total_jobs = 4
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/orderfleet.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    const FILE_CONFIG: &str = r#"
[run]
total_jobs = 7
max_parallel = 2
stagger_seconds = 0

[worker]
program = "/bin/sh"
args = ["-c", "exit 0"]

[worker.env]
AUTOMATION_NAME = "From File"
"#;

    #[test]
    fn test_load_config_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file("orderfleet.toml", FILE_CONFIG)?;

            let config = load_config(Path::new("orderfleet.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.run.total_jobs, 7);
            assert_eq!(config.run.stagger_seconds, 0);
            assert_eq!(config.worker.args, vec!["-c", "exit 0"]);
            assert_eq!(config.worker.env["AUTOMATION_NAME"], "From File");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_nested_settings() {
        Jail::expect_with(|jail| {
            jail.create_file("orderfleet.toml", FILE_CONFIG)?;
            jail.set_env("ORDERFLEET_RUN__MAX_PARALLEL", "5");
            jail.set_env("ORDERFLEET_PATHS__LOG_DIR", "/var/log/orderfleet");

            let config = load_config(Path::new("orderfleet.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.run.max_parallel, 5);
            assert_eq!(config.run.total_jobs, 7);
            assert_eq!(
                config.paths.log_dir,
                std::path::PathBuf::from("/var/log/orderfleet")
            );
            Ok(())
        });
    }

    #[test]
    fn test_env_override_keeps_worker_variable_case() {
        Jail::expect_with(|jail| {
            jail.create_file("orderfleet.toml", FILE_CONFIG)?;
            jail.set_env("ORDERFLEET_WORKER__ENV__AUTOMATION_NAME", "From Env");
            jail.set_env("ORDERFLEET_WORKER__ENV__API_KEY", "k-123");

            let config = load_config(Path::new("orderfleet.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.worker.env["AUTOMATION_NAME"], "From Env");
            assert_eq!(config.worker.env["API_KEY"], "k-123");
            assert!(!config.worker.env.contains_key("api_key"));
            assert_eq!(config.worker.program, std::path::PathBuf::from("/bin/sh"));
            Ok(())
        });
    }

    #[test]
    fn test_env_override_with_bad_value_is_parse_error() {
        Jail::expect_with(|jail| {
            jail.create_file("orderfleet.toml", FILE_CONFIG)?;
            jail.set_env("ORDERFLEET_RUN__TOTAL_JOBS", "many");

            let err = load_config(Path::new("orderfleet.toml")).unwrap_err();
            assert!(matches!(err, ConfigError::ParseError(_)));
            Ok(())
        });
    }
}
