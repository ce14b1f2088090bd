//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, jitter within [0, 1])
//! - Check store URLs parse and use http(s)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{AppConfig, TimeoutConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(&mut errors, "graph.uri", &config.graph.uri);
    if config.graph.database.trim().is_empty() {
        errors.push(ValidationError::new("graph.database", "must not be empty"));
    }
    check_timeouts(&mut errors, "graph.timeouts", &config.graph.timeouts);

    check_url(&mut errors, "vector.url", &config.vector.url);
    check_timeouts(&mut errors, "vector.timeouts", &config.vector.timeouts);

    let retry = &config.retry;
    if retry.preset.is_none() {
        if retry.max_attempts == 0 {
            errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            errors.push(ValidationError::new(
                "retry.base_delay_ms",
                format!("{} exceeds max_delay_ms {}", retry.base_delay_ms, retry.max_delay_ms),
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter_fraction) {
            errors.push(ValidationError::new("retry.jitter_fraction", "must be within 0.0..=1.0"));
        }
    }

    let breaker = &config.circuit_breaker;
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if breaker.success_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.success_threshold", "must be at least 1"));
    }
    if breaker.recovery_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.recovery_timeout_secs",
            "must be greater than 0",
        ));
    }

    let obs = &config.observability;
    if !matches!(
        obs.log_level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if config.redaction.max_depth == 0 {
        errors.push(ValidationError::new("redaction.max_depth", "must be at least 1"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError::new(field, "must not be empty"));
        return;
    }
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {e}"))),
    }
}

fn check_timeouts(errors: &mut Vec<ValidationError>, field: &str, timeouts: &TimeoutConfig) {
    if timeouts.connect_secs == 0 {
        errors.push(ValidationError::new(&format!("{field}.connect_secs"), "must be greater than 0"));
    }
    if timeouts.request_secs == 0 {
        errors.push(ValidationError::new(&format!("{field}.request_secs"), "must be greater than 0"));
    }
    if timeouts.connect_secs > timeouts.request_secs {
        errors.push(ValidationError::new(
            &format!("{field}.connect_secs"),
            format!(
                "{}s exceeds request timeout {}s",
                timeouts.connect_secs, timeouts.request_secs
            ),
        ));
    }
}
