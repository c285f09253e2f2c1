//! Field-level request validation.
//!
//! Request types implement [`Validate`] and report every violated field at
//! once as a [`FormErrors`] list rather than stopping at the first failure.

use serde::{Deserialize, Serialize};

use super::input::ValidationError;

/// A single field violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field path, e.g. `databaseId` or `chart.prompt`
    pub name: String,
    /// Violation code (`required`, `uuid`, `DatabaseName`, ...)
    pub code: String,
    /// Human readable message, when one is known for the code
    pub message: Option<String>,
    /// Where the field came from
    #[serde(rename = "path")]
    pub source: String,
    /// The offending value
    pub value: serde_json::Value,
}

impl FieldError {
    pub fn new(name: impl Into<String>, code: impl Into<String>, value: serde_json::Value) -> Self {
        let code = code.into();
        Self {
            message: default_message(&code).map(str::to_string),
            name: name.into(),
            code,
            source: "body".to_string(),
            value,
        }
    }

    /// Build a field error from an input check failure, keeping its message.
    pub fn from_validation(
        name: impl Into<String>,
        error: &ValidationError,
        value: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            code: error.code().to_string(),
            message: Some(error.to_string()),
            source: "body".to_string(),
            value,
        }
    }
}

fn default_message(code: &str) -> Option<&'static str> {
    match code {
        "AlreadyExists" => Some("Value already exists"),
        "DatabaseName" => Some("Invalid Database Name"),
        "NotFound" => Some("Value not found"),
        _ => None,
    }
}

/// Ordered set of field violations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormErrors(Vec<FieldError>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    /// Record `result` against `name` if it is an error.
    pub fn check<T>(
        &mut self,
        name: &str,
        value: impl Into<serde_json::Value>,
        result: Result<T, ValidationError>,
    ) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.push(FieldError::from_validation(name, &e, value.into()));
                None
            }
        }
    }

    /// Prefix every field name with `ns.`
    pub fn add_namespace(&mut self, ns: &str) {
        for error in &mut self.0 {
            error.name = format!("{}.{}", ns, error.name);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FormErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for FormErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string_pretty(&self.0).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", json)
    }
}

impl std::error::Error for FormErrors {}

/// Structural validation of a request.
pub trait Validate {
    fn validate(&self) -> Result<(), FormErrors>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::input::{validate_database_name, validate_uuid};
    use serde_json::json;

    #[test]
    fn test_check_collects_all_failures() {
        let mut errors = FormErrors::new();
        let id = errors.check("id", "nope", validate_uuid("nope"));
        errors.check("name", "a/b", validate_database_name("a/b"));

        assert!(id.is_none());
        assert_eq!(errors.len(), 2);
        let codes: Vec<&str> = errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["uuid", "DatabaseName"]);
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn test_add_namespace() {
        let mut errors = FormErrors::new();
        errors.push(FieldError::new("name", "required", json!("")));
        errors.add_namespace("database");
        assert_eq!(errors.iter().next().unwrap().name, "database.name");
    }

    #[test]
    fn test_field_error_json_shape() {
        let error = FieldError::new("name", "AlreadyExists", json!("sales"));
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["path"], "body");
        assert_eq!(value["message"], "Value already exists");
        assert_eq!(value["value"], "sales");

        let plain = FieldError::new("id", "uuid", json!("x"));
        assert!(serde_json::to_value(&plain).unwrap()["message"].is_null());
    }
}
