//! Service error taxonomy
//!
//! Every service operation fails with a [`ChartAiError`]. A transport layer
//! maps [`ErrorKind`] to its own status codes and calls
//! [`ChartAiError::into_public`] before rendering, so internal details never
//! reach a caller.

use serde::Serialize;

use crate::database::DatabaseError;
use crate::persistence::PersistenceError;
use crate::validation::FormErrors;

/// LLM step that failed during chart synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisStage {
    Title,
    Classification,
    Sql,
}

impl std::fmt::Display for SynthesisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynthesisStage::Title => write!(f, "chart title"),
            SynthesisStage::Classification => write!(f, "chart type"),
            SynthesisStage::Sql => write!(f, "SQL statement"),
        }
    }
}

/// Error returned by service operations
#[derive(Debug, thiserror::Error)]
pub enum ChartAiError {
    /// Structural request validation failed
    #[error("Validation failed: {0}")]
    ValidationFailed(FormErrors),

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The database could not be opened or introspected
    #[error("Invalid database connection string")]
    InvalidDatabaseConnectionString,

    /// The chart type name is not registered
    #[error("Unsupported chart type: {0}")]
    UnsupportedChartType(String),

    /// An LLM call failed during chart synthesis
    #[error("Failed to process the {0}")]
    SynthesisFailed(SynthesisStage),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Persistence(PersistenceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for service operations
pub type ChartAiResult<T> = Result<T, ChartAiError>;

/// Flat classification of [`ChartAiError`] for transport mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ValidationFailed,
    NotFound,
    Forbidden,
    BadRequest,
    InvalidDatabaseConnectionString,
    UnsupportedChartType,
    SynthesisFailed,
    InternalServerError,
}

impl ChartAiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChartAiError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            ChartAiError::NotFound => ErrorKind::NotFound,
            ChartAiError::Forbidden => ErrorKind::Forbidden,
            ChartAiError::BadRequest(_) => ErrorKind::BadRequest,
            ChartAiError::InvalidDatabaseConnectionString => {
                ErrorKind::InvalidDatabaseConnectionString
            }
            ChartAiError::UnsupportedChartType(_) => ErrorKind::UnsupportedChartType,
            ChartAiError::SynthesisFailed(_) => ErrorKind::SynthesisFailed,
            ChartAiError::Database(_)
            | ChartAiError::Persistence(_)
            | ChartAiError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::InternalServerError
    }

    /// Collapse internal errors to a generic message, logging the original.
    ///
    /// Validation and domain errors are returned untouched and not logged.
    pub fn into_public(self) -> ChartAiError {
        if self.is_internal() {
            tracing::error!("Internal error: {}", self);
            ChartAiError::Internal("Internal server error".to_string())
        } else {
            self
        }
    }
}

impl From<PersistenceError> for ChartAiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound => ChartAiError::NotFound,
            PersistenceError::UnsupportedChartType(name) => ChartAiError::UnsupportedChartType(name),
            other => ChartAiError::Persistence(other),
        }
    }
}

impl From<FormErrors> for ChartAiError {
    fn from(errors: FormErrors) -> Self {
        ChartAiError::ValidationFailed(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_from_persistence() {
        let err: ChartAiError = PersistenceError::NotFound.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: ChartAiError = PersistenceError::Query("boom".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::InternalServerError);
    }

    #[test]
    fn test_into_public_hides_internal_detail() {
        let err = ChartAiError::Database(DatabaseError::QueryFailed(
            "relation \"secret\" does not exist".to_string(),
        ));
        let public = err.into_public();
        assert!(!public.to_string().contains("secret"));
        assert_eq!(public.kind(), ErrorKind::InternalServerError);
    }

    #[test]
    fn test_into_public_keeps_domain_errors() {
        let public = ChartAiError::UnsupportedChartType("Pie".to_string()).into_public();
        assert!(matches!(public, ChartAiError::UnsupportedChartType(ref s) if s == "Pie"));

        let public = ChartAiError::SynthesisFailed(SynthesisStage::Sql).into_public();
        assert_eq!(public.to_string(), "Failed to process the SQL statement");
    }
}
