//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is retried (attempt budget + kind filter)
//! - Execute retries with exponential backoff + jitter
//! - Report each retry to an observer callback (logging only)
//!
//! # Design Decisions
//! - The policy is immutable configuration; share it freely across tasks
//! - `max_attempts` counts the first call, so `1` means no retries
//! - An empty `retry_on` list retries every error kind

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::config::schema::{RetryConfig, RetryPreset};
use crate::resilience::backoff::calculate_backoff;

/// Classified failure kinds surfaced by the store clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused, DNS failure, timeout before a response.
    Transport,
    /// The remote store rejected the request.
    Upstream,
    /// A circuit breaker refused the call.
    CircuitOpen,
    /// A dynamic identifier failed sanitization.
    InvalidIdentifier,
    /// A successful response could not be decoded.
    Decode,
    /// The request could not be built from the caller's input.
    InvalidRequest,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Upstream => "upstream",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::InvalidIdentifier => "invalid_identifier",
            ErrorKind::Decode => "decode",
            ErrorKind::InvalidRequest => "invalid_request",
        };
        f.write_str(name)
    }
}

/// Errors that can report their [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Exponential-backoff retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_fraction: f64,
    retry_on: Vec<ErrorKind>,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is raised to at least 1 and
    /// `jitter_fraction` clamped into `[0, 1]`.
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64, jitter_fraction: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms,
            jitter_fraction: jitter_fraction.clamp(0.0, 1.0),
            retry_on: Vec::new(),
        }
    }

    /// Outbound API calls: 3 attempts, 200ms base, 2s cap, 20% jitter.
    pub fn api_calls() -> Self {
        Self::new(3, 200, 2_000, 0.2)
    }

    /// Database operations: 5 attempts, 50ms base, 1s cap, 10% jitter.
    pub fn database_operations() -> Self {
        Self::new(5, 50, 1_000, 0.1)
    }

    /// Generic network requests: 3 attempts, 500ms base, 10s cap, 30% jitter.
    pub fn network_requests() -> Self {
        Self::new(3, 500, 10_000, 0.3)
    }

    pub fn from_preset(preset: RetryPreset) -> Self {
        match preset {
            RetryPreset::ApiCalls => Self::api_calls(),
            RetryPreset::DatabaseOperations => Self::database_operations(),
            RetryPreset::NetworkRequests => Self::network_requests(),
        }
    }

    /// Build from configuration. A preset, when named, supersedes the
    /// numeric fields; the `retry_on` filter always applies.
    pub fn from_config(config: &RetryConfig) -> Self {
        let policy = match config.preset {
            Some(preset) => Self::from_preset(preset),
            None => Self::new(
                config.max_attempts,
                config.base_delay_ms,
                config.max_delay_ms,
                config.jitter_fraction,
            ),
        };
        policy.with_retry_on(config.retry_on.iter().copied())
    }

    /// Restrict retries to the given kinds.
    pub fn with_retry_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn jitter_fraction(&self) -> f64 {
        self.jitter_fraction
    }

    pub fn retry_on(&self) -> &[ErrorKind] {
        &self.retry_on
    }

    /// Whether a failure on 1-based `attempt` should be retried.
    pub fn should_retry<E: Classify>(&self, error: &E, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        self.retry_on.is_empty() || self.retry_on.contains(&error.kind())
    }

    /// Delay before the retry that follows failed `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms, self.jitter_fraction)
    }

    /// Run `operation` until it succeeds or the policy gives up.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.execute_with(operation, |_: &E, _, _| {}).await
    }

    /// Like [`execute`](Self::execute), calling `on_retry(error, attempt, delay)`
    /// before each backoff sleep.
    pub async fn execute_with<F, Fut, T, E, R>(&self, mut operation: F, mut on_retry: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
        R: FnMut(&E, u32, Duration),
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    on_retry(&error, attempt, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::database_operations()
    }
}
