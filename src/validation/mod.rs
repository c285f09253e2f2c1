//! Validation functionality
//!
//! Provides:
//! - Single-value input checks (UUIDs, database names, prompts)
//! - Field-level request validation collected into `FormErrors`

pub mod form;
pub mod input;

pub use form::{FieldError, FormErrors, Validate};
pub use input::{
    MAX_QUERY_LENGTH, ValidationError, ValidationResult, validate_connection_string,
    validate_database_name, validate_prompt, validate_required, validate_uuid,
};
