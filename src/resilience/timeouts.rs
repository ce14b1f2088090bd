//! Timeout enforcement.
//!
//! # Responsibilities
//! - Build the HTTP client every store call goes through
//! - Enforce connect timeout and total request timeout
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Timeouts surface as transport errors, so the retry filter treats
//!   them like a refused connection

use std::time::Duration;

use crate::config::schema::TimeoutConfig;

/// Build a pooled HTTP client with the configured deadlines.
pub fn build_http_client(config: &TimeoutConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_secs))
        .timeout(Duration::from_secs(config.request_secs))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}
