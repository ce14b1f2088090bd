//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the sync
//! service. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resilience::retries::ErrorKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Graph store connection.
    pub graph: GraphConfig,

    /// Vector store connection.
    pub vector: VectorConfig,

    /// Retry policy applied to both stores.
    pub retry: RetryConfig,

    /// Circuit breaker thresholds applied to both stores.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Log and error redaction.
    pub redaction: RedactionConfig,
}

/// Graph store (Neo4j HTTP API) connection settings.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    /// Base URI, e.g. "http://localhost:7474".
    pub uri: String,

    pub username: String,

    /// Never logged; see the manual `Debug` impl.
    pub password: String,

    /// Database name used in the transaction endpoint path.
    pub database: String,

    pub timeouts: TimeoutConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:7474".to_string(),
            username: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// Vector store (Qdrant REST API) connection settings.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct VectorConfig {
    /// Base URL, e.g. "http://localhost:6333".
    pub url: String,

    /// Sent as the `api-key` header when present.
    pub api_key: Option<String>,

    pub timeouts: TimeoutConfig,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl std::fmt::Debug for VectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// Timeout configuration for store HTTP calls.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Named retry presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPreset {
    ApiCalls,
    DatabaseOperations,
    NetworkRequests,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// When set, the preset's numbers replace the fields below.
    pub preset: Option<RetryPreset>,

    /// Total attempts including the first call.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Fraction of each delay randomized in either direction (0.0 - 1.0).
    pub jitter_fraction: f64,

    /// Error kinds that trigger a retry. Empty retries everything.
    pub retry_on: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            preset: None,
            max_attempts: 5,
            base_delay_ms: 50,
            max_delay_ms: 1000,
            jitter_fraction: 0.1,
            retry_on: vec![ErrorKind::Transport],
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (net of decay) that open the circuit.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before admitting a trial call.
    pub recovery_timeout_secs: u64,

    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            success_threshold: 2,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Redaction settings for logs and surfaced errors.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RedactionConfig {
    /// Nesting depth after which structures are replaced by a sentinel.
    pub max_depth: usize,

    /// Absolute prefix stripped from file paths in messages.
    pub app_root: Option<String>,

    /// Stack frames kept by trace sanitizing.
    pub max_stack_frames: usize,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            app_root: None,
            max_stack_frames: 10,
        }
    }
}
