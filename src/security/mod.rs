//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Dynamic identifier (label, relationship type, property key, collection):
//!     → identifier.rs (allow-list validation, backtick escaping)
//!     → spliced into query text / URL path
//!
//! Anything logged or surfaced in an error:
//!     → redaction.rs (credential patterns, sensitive keys, depth limit)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any validation failure, never auto-correct
//! - No trust in caller-provided identifiers
//! - Values always travel as query parameters; only identifiers are spliced

pub mod identifier;
pub mod redaction;

pub use identifier::{escape, validate, validate_all, IdentifierKind, InjectionError};
pub use redaction::{redact_message, SensitiveDataRedactor};
