//! Identifier sanitization for graph queries.
//!
//! Labels, relationship types and property keys cannot be bound as query
//! parameters, so they are spliced into query text. Every such identifier
//! must pass [`validate`] first; [`escape`] additionally backtick-quotes it.
//!
//! # Rules
//! - Non-empty, at most [`MAX_IDENTIFIER_LENGTH`] bytes
//! - Matches `^[A-Za-z_][A-Za-z0-9_]*$` (ASCII only)
//! - Not a reserved query keyword, compared case-insensitively

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

pub const MAX_IDENTIFIER_LENGTH: usize = 255;

static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

static COLLECTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,255}$").expect("collection pattern is valid"));

/// Query keywords rejected as identifiers. Stored uppercase.
pub const RESERVED_WORDS: &[&str] = &[
    "MATCH", "CREATE", "DELETE", "MERGE", "SET", "WHERE", "RETURN", "WITH", "UNION", "CALL",
    "DETACH", "REMOVE", "AND", "OR", "XOR", "NOT", "NULL", "TRUE", "FALSE", "CASE", "WHEN",
    "THEN", "ELSE", "END", "OPTIONAL", "UNWIND", "FOREACH", "LOAD", "ORDER", "BY", "LIMIT",
    "SKIP", "DISTINCT", "AS", "IN", "IS", "YIELD", "DROP", "EXISTS",
];

/// Where an identifier is used. Only affects error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Label,
    RelationshipType,
    PropertyKey,
    Collection,
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IdentifierKind::Label => "label",
            IdentifierKind::RelationshipType => "relationship type",
            IdentifierKind::PropertyKey => "property key",
            IdentifierKind::Collection => "collection name",
        })
    }
}

/// A dynamic identifier was rejected.
///
/// The offending value is printed with `Debug` escaping so control
/// characters and invisible code points stay visible in logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectionError {
    #[error("{kind} must not be empty")]
    Empty { kind: IdentifierKind },

    #[error("{kind} exceeds {max} bytes (got {length})")]
    TooLong {
        kind: IdentifierKind,
        length: usize,
        max: usize,
    },

    #[error("{kind} {identifier:?} contains invalid characters")]
    InvalidCharacters {
        kind: IdentifierKind,
        identifier: String,
    },

    #[error("{kind} {identifier:?} is a reserved word")]
    ReservedWord {
        kind: IdentifierKind,
        identifier: String,
    },
}

impl InjectionError {
    pub fn kind(&self) -> IdentifierKind {
        match self {
            InjectionError::Empty { kind }
            | InjectionError::TooLong { kind, .. }
            | InjectionError::InvalidCharacters { kind, .. }
            | InjectionError::ReservedWord { kind, .. } => *kind,
        }
    }
}

/// Validate `identifier`, returning it unchanged when safe.
pub fn validate(identifier: &str, kind: IdentifierKind) -> Result<&str, InjectionError> {
    if identifier.is_empty() {
        return Err(InjectionError::Empty { kind });
    }
    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(InjectionError::TooLong {
            kind,
            length: identifier.len(),
            max: MAX_IDENTIFIER_LENGTH,
        });
    }
    if !IDENTIFIER_PATTERN.is_match(identifier) {
        return Err(InjectionError::InvalidCharacters {
            kind,
            identifier: truncate_for_error(identifier),
        });
    }
    if is_reserved(identifier) {
        return Err(InjectionError::ReservedWord {
            kind,
            identifier: identifier.to_string(),
        });
    }
    Ok(identifier)
}

/// Validate, then wrap in backticks with embedded backticks doubled.
pub fn escape(identifier: &str, kind: IdentifierKind) -> Result<String, InjectionError> {
    let valid = validate(identifier, kind)?;
    Ok(format!("`{}`", valid.replace('`', "``")))
}

/// Validate every identifier, failing on the first violation.
pub fn validate_all<'a, I>(identifiers: I, kind: IdentifierKind) -> Result<Vec<&'a str>, InjectionError>
where
    I: IntoIterator<Item = &'a str>,
{
    identifiers
        .into_iter()
        .map(|identifier| validate(identifier, kind))
        .collect()
}

pub fn is_reserved(identifier: &str) -> bool {
    RESERVED_WORDS
        .iter()
        .any(|word| word.eq_ignore_ascii_case(identifier))
}

/// Validate a vector collection name (`[A-Za-z0-9_-]`, 1-255 chars).
pub fn validate_collection_name(name: &str) -> Result<&str, InjectionError> {
    let kind = IdentifierKind::Collection;
    if name.is_empty() {
        return Err(InjectionError::Empty { kind });
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(InjectionError::TooLong {
            kind,
            length: name.len(),
            max: MAX_IDENTIFIER_LENGTH,
        });
    }
    if !COLLECTION_PATTERN.is_match(name) {
        return Err(InjectionError::InvalidCharacters {
            kind,
            identifier: truncate_for_error(name),
        });
    }
    Ok(name)
}

// Rejected input is attacker-controlled; keep error messages bounded.
fn truncate_for_error(identifier: &str) -> String {
    identifier.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_identifiers() {
        for identifier in ["User", "User_Profile", "User123", "_InternalUser", "a", "_"] {
            assert_eq!(validate(identifier, IdentifierKind::Label), Ok(identifier));
        }
        let longest = "a".repeat(255);
        assert!(validate(&longest, IdentifierKind::PropertyKey).is_ok());
    }

    #[test]
    fn test_rejects_injection_attempts() {
        let cases = [
            "User}) DELETE (n) //",
            "123User",
            "User Name",
            "User-Name",
            "Us\0er",
            "\u{200B}",
            "Usér",
            "User`) MATCH (m",
            "../etc/passwd",
            "User\n",
        ];
        for identifier in cases {
            let err = validate(identifier, IdentifierKind::Label).unwrap_err();
            assert!(
                matches!(err, InjectionError::InvalidCharacters { .. }),
                "{identifier:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_rejects_reserved_words_in_any_case() {
        for identifier in ["MATCH", "delete", "DeLeTe", "return", "Detach", "null"] {
            let err = validate(identifier, IdentifierKind::RelationshipType).unwrap_err();
            assert!(matches!(err, InjectionError::ReservedWord { .. }), "{identifier}");
        }
        // Keywords only match whole identifiers.
        assert!(validate("Matches", IdentifierKind::Label).is_ok());
        assert!(validate("created_at", IdentifierKind::PropertyKey).is_ok());
    }

    #[test]
    fn test_rejects_empty_and_too_long() {
        assert_eq!(
            validate("", IdentifierKind::PropertyKey),
            Err(InjectionError::Empty { kind: IdentifierKind::PropertyKey })
        );
        let err = validate(&"a".repeat(256), IdentifierKind::Label).unwrap_err();
        assert_eq!(
            err,
            InjectionError::TooLong {
                kind: IdentifierKind::Label,
                length: 256,
                max: 255
            }
        );
    }

    #[test]
    fn test_error_message_makes_invisible_characters_visible() {
        let err = validate("\u{200B}", IdentifierKind::Label).unwrap_err();
        assert_eq!(err.to_string(), "label \"\\u{200b}\" contains invalid characters");
        assert_eq!(err.kind(), IdentifierKind::Label);
    }

    #[test]
    fn test_escape_wraps_and_round_trips() {
        for identifier in ["User", "User_Profile", "_x9", "HAS_ORDER"] {
            let escaped = escape(identifier, IdentifierKind::Label).unwrap();
            assert!(escaped.starts_with('`') && escaped.ends_with('`'));
            assert_eq!(&escaped[1..escaped.len() - 1], identifier);
        }
        assert!(escape("MERGE", IdentifierKind::Label).is_err());
    }

    #[test]
    fn test_validate_all_fails_on_first_violation() {
        let keys = ["name", "email", "created_at"];
        assert_eq!(validate_all(keys, IdentifierKind::PropertyKey).unwrap(), keys);

        let err = validate_all(["name", "bad key", "SET"], IdentifierKind::PropertyKey).unwrap_err();
        assert!(matches!(err, InjectionError::InvalidCharacters { ref identifier, .. } if identifier == "bad key"));
    }

    #[test]
    fn test_collection_names() {
        assert!(validate_collection_name("documents-v2_en").is_ok());
        assert!(validate_collection_name("2024").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("../admin").is_err());
        assert!(validate_collection_name("a/b").is_err());
        assert!(validate_collection_name(&"c".repeat(256)).is_err());
    }
}
