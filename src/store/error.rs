//! Store client error taxonomy.

use std::error::Error as _;
use thiserror::Error;

use crate::resilience::circuit_breaker::CircuitOpenError;
use crate::resilience::retries::{Classify, ErrorKind};
use crate::security::identifier::InjectionError;
use crate::security::redaction::redact_message;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No response was received: connect failure, DNS, timeout, reset.
    #[error("{resource} transport error: {message}")]
    Transport { resource: String, message: String },

    /// The store answered with a non-2xx status or an error payload.
    #[error("{resource} rejected request ({}): {message}", upstream_label(.status, .code))]
    Upstream {
        resource: String,
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error(transparent)]
    InvalidIdentifier(#[from] InjectionError),

    /// A successful response did not have the expected shape.
    #[error("{resource} response could not be decoded: {message}")]
    Decode { resource: String, message: String },

    /// The request could not be built from the caller's input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn upstream_label(status: &u16, code: &Option<String>) -> String {
    match code {
        Some(code) => format!("status {status}, {code}"),
        None => format!("status {status}"),
    }
}

impl StoreError {
    /// Build a transport error from a reqwest failure.
    ///
    /// The URL is dropped and the cause chain redacted, since either may
    /// carry credentials. Request-builder failures are not transport
    /// problems and become `InvalidRequest`.
    pub fn transport(resource: &str, error: reqwest::Error) -> Self {
        let error = error.without_url();
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        let message = redact_message(&message);
        if error.is_builder() {
            return StoreError::InvalidRequest(message);
        }
        StoreError::Transport {
            resource: resource.to_string(),
            message,
        }
    }

    pub fn upstream(resource: &str, status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        StoreError::Upstream {
            resource: resource.to_string(),
            status,
            code,
            message: redact_message(&message.into()),
        }
    }

    pub fn decode(resource: &str, message: impl Into<String>) -> Self {
        StoreError::Decode {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, StoreError::Transport { .. })
    }
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Transport { .. } => ErrorKind::Transport,
            StoreError::Upstream { .. } => ErrorKind::Upstream,
            StoreError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            StoreError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            StoreError::Decode { .. } => ErrorKind::Decode,
            StoreError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

impl From<url::ParseError> for StoreError {
    fn from(err: url::ParseError) -> Self {
        StoreError::InvalidRequest(format!("invalid URL: {err}"))
    }
}
