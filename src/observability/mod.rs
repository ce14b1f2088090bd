//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Store clients and resilience primitives produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every error rendered into a log event passes through redaction first
//! - Every store operation carries an operation ID in its span
//! - Metrics are cheap (atomic increments) and no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
