//! Single-value input checks.
//!
//! These functions validate individual request fields before any unit of
//! work is opened. They are composed into field-level [`FormErrors`] by the
//! request types' [`Validate`] implementations.
//!
//! [`FormErrors`]: super::form::FormErrors
//! [`Validate`]: super::form::Validate

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Maximum length for registered database names
pub const MAX_DATABASE_NAME_LENGTH: usize = 255;

/// Maximum length for a natural-language chart prompt
pub const MAX_PROMPT_LENGTH: usize = 4000;

/// Maximum length for a connection string
pub const MAX_CONNECTION_STRING_LENGTH: usize = 2048;

/// Maximum length for an ad-hoc SQL query
pub const MAX_QUERY_LENGTH: usize = 65536;

static DATABASE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-_\s]+$").expect("Invalid regex"));

/// Errors that can occur during input validation.
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
pub enum ValidationError {
    /// Input is empty when a value is required
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Input exceeds maximum allowed length
    #[error("{field} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Input contains invalid characters
    #[error("{field} contains invalid characters: {reason}")]
    InvalidCharacters { field: &'static str, reason: String },

    /// Input has invalid format
    #[error("{0}: {1}")]
    InvalidFormat(&'static str, String),
}

impl ValidationError {
    /// Violation code reported in a [`FieldError`](super::form::FieldError).
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Empty(_) => "required",
            ValidationError::TooLong { .. } => "max",
            ValidationError::InvalidCharacters { .. } => "DatabaseName",
            ValidationError::InvalidFormat(..) => "uuid",
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a UUID string.
///
/// # Examples
///
/// ```
/// use chartai::validation::input::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<Uuid> {
    Uuid::parse_str(id)
        .map_err(|e| ValidationError::InvalidFormat("UUID", format!("invalid UUID format: {}", e)))
}

/// Validate a registered database's display name.
///
/// # Rules
///
/// - Must not be empty
/// - Must not exceed 255 characters
/// - May contain letters, digits, hyphens, underscores and whitespace
///
/// # Examples
///
/// ```
/// use chartai::validation::input::validate_database_name;
///
/// assert!(validate_database_name("Sales warehouse").is_ok());
/// assert!(validate_database_name("prod_db-2").is_ok());
/// assert!(validate_database_name("").is_err());
/// assert!(validate_database_name("drop;table").is_err());
/// ```
pub fn validate_database_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::Empty("database name"));
    }

    if name.len() > MAX_DATABASE_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "database name",
            max: MAX_DATABASE_NAME_LENGTH,
            actual: name.len(),
        });
    }

    if !DATABASE_NAME_PATTERN.is_match(name) {
        let offending = name
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_' && !c.is_whitespace())
            .map(|c| format!("invalid character: '{}'", c))
            .unwrap_or_else(|| "invalid character".to_string());
        return Err(ValidationError::InvalidCharacters {
            field: "database name",
            reason: offending,
        });
    }

    Ok(())
}

/// Validate that a free-text field is present and within `max` bytes.
pub fn validate_required(field: &'static str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field,
            max,
            actual: value.len(),
        });
    }

    Ok(())
}

/// Validate a natural-language chart prompt.
pub fn validate_prompt(prompt: &str) -> ValidationResult<()> {
    validate_required("prompt", prompt, MAX_PROMPT_LENGTH)
}

/// Validate a connection string's presence and length.
///
/// Connectivity itself is only proven by opening an adapter.
pub fn validate_connection_string(connection_string: &str) -> ValidationResult<()> {
    validate_required(
        "connection string",
        connection_string,
        MAX_CONNECTION_STRING_LENGTH,
    )
}
