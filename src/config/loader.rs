//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ConnectorConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ConnectorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ConnectorConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(
            r#"
            [resolver]
            default_port = "8443"
            cache_clear_interval_ms = 1000

            [retries]
            max_attempts = 5
            "#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.resolver.default_port, "8443");
        assert_eq!(config.resolver.cache_clear_interval_ms, 1000);
        assert_eq!(config.retries.max_attempts, 5);
        assert_eq!(config.breaker.failure_ratio, 0.6);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.timeouts.call_ms, 60_000);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/connector.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let file = write_config("[breaker\nmin_requests = ");
        assert!(matches!(load_config(file.path()).unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_failures_are_reported_together() {
        let file = write_config(
            r#"
            [breaker]
            failure_ratio = 0.0

            [retries]
            jitter_ratio = 2.0
            "#,
        );

        match load_config(file.path()).unwrap_err() {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }
}
