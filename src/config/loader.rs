//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `graph.uri`.
pub const GRAPH_URI_ENV: &str = "GRAPH_RAG_GRAPH_URI";
/// Environment variable overriding `graph.password`.
pub const GRAPH_PASSWORD_ENV: &str = "GRAPH_RAG_GRAPH_PASSWORD";
/// Environment variable overriding `vector.url`.
pub const VECTOR_URL_ENV: &str = "GRAPH_RAG_VECTOR_URL";
/// Environment variable overriding `vector.api_key`.
pub const VECTOR_API_KEY_ENV: &str = "GRAPH_RAG_VECTOR_API_KEY";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join_errors(.0))]
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
///
/// Secrets may be supplied through the environment instead of the file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&content)?;
    apply_overrides_from(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse TOML without validation or overrides.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply endpoint and secret overrides looked up through `lookup`.
pub fn apply_overrides_from<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(uri) = lookup(GRAPH_URI_ENV) {
        config.graph.uri = uri;
    }
    if let Some(url) = lookup(VECTOR_URL_ENV) {
        config.vector.url = url;
    }
    if let Some(password) = lookup(GRAPH_PASSWORD_ENV) {
        config.graph.password = password;
    }
    if let Some(api_key) = lookup(VECTOR_API_KEY_ENV).filter(|key| !key.is_empty()) {
        config.vector.api_key = Some(api_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogFormat, RetryPreset};
    use crate::resilience::retries::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_load_minimal_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graph]\nuri = \"http://graph:7474\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.graph.uri, "http://graph:7474");
        assert_eq!(config.graph.database, "neo4j");
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.retry.retry_on, vec![ErrorKind::Transport]);
    }

    #[test]
    fn test_parse_full_file() {
        let config = parse_config(
            r#"
            [graph]
            uri = "https://graph.internal:7473"
            username = "sync"
            database = "knowledge"

            [vector]
            url = "http://qdrant:6333"

            [retry]
            preset = "api_calls"
            retry_on = ["transport", "upstream"]

            [circuit_breaker]
            failure_threshold = 3
            recovery_timeout_secs = 10
            success_threshold = 1

            [observability]
            log_level = "debug"
            log_format = "compact"
            "#,
        )
        .unwrap();

        assert_eq!(config.graph.database, "knowledge");
        assert_eq!(config.retry.preset, Some(RetryPreset::ApiCalls));
        assert_eq!(config.retry.retry_on, vec![ErrorKind::Transport, ErrorKind::Upstream]);
        assert_eq!(config.circuit_breaker.recovery_timeout_secs, 10);
        assert_eq!(config.observability.log_format, LogFormat::Compact);
    }

    #[test]
    fn test_invalid_file_reports_validation_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[circuit_breaker]\nsuccess_threshold = 0").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("circuit_breaker.success_threshold"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_overrides_replace_secrets() {
        let mut config = AppConfig::default();
        apply_overrides_from(&mut config, |key| match key {
            GRAPH_PASSWORD_ENV => Some("s3cret".to_string()),
            VECTOR_API_KEY_ENV => Some("qd-key".to_string()),
            VECTOR_URL_ENV => Some("http://qdrant:6333".to_string()),
            _ => None,
        });
        assert_eq!(config.graph.password, "s3cret");
        assert_eq!(config.vector.api_key.as_deref(), Some("qd-key"));
        assert_eq!(config.vector.url, "http://qdrant:6333");
        assert_eq!(config.graph.uri, "http://localhost:7474");
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
