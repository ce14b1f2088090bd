//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Store operation:
//!     → circuit_breaker.rs (fail fast while the resource is known down)
//!     → retries.rs (retry classified transient failures with backoff)
//!     → timeouts.rs (every HTTP attempt carries connect/request deadlines)
//! ```
//!
//! # Design Decisions
//! - The breaker wraps the retry loop, so an exhausted retry sequence counts
//!   as one breaker failure and retries never run against an open circuit
//! - Retries only for error kinds listed in the policy's filter
//! - Breakers are shared per resource name through the registry

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod registry;
pub mod retries;
pub mod timeouts;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::config::schema::AppConfig;
use crate::observability::metrics;
use crate::security::redaction::redact_message;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitOpenError, CircuitState};
pub use registry::BreakerRegistry;
pub use retries::{Classify, ErrorKind, RetryPolicy};

/// A breaker and retry policy guarding one resource.
#[derive(Debug, Clone)]
pub struct Resilience {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl Resilience {
    pub fn new(breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self { breaker, retry }
    }

    /// Build from configuration, sharing the breaker named `resource`.
    pub fn from_config(resource: &str, config: &AppConfig, registry: &BreakerRegistry) -> Self {
        Self {
            breaker: registry.get_or_create(resource, &config.circuit_breaker),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `op` as `CircuitBreaker::call(RetryPolicy::execute(op))`.
    ///
    /// Each retry is logged with the redacted error before sleeping.
    pub async fn run<F, Fut, T, E>(&self, operation: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<CircuitOpenError> + Display,
    {
        let resource = self.breaker.name();
        let max_attempts = self.retry.max_attempts();

        self.breaker
            .call(|| {
                self.retry.execute_with(op, |error: &E, attempt, delay| {
                    tracing::warn!(
                        resource,
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        kind = %error.kind(),
                        error = %redact_message(&error.to_string()),
                        "Store call failed, retrying"
                    );
                    metrics::record_retry(resource);
                })
            })
            .await
    }
}
