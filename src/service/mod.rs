//! Service operations
//!
//! Every operation is `(CallContext, request) -> ChartAiResult<response>` and
//! transport-agnostic. A [`CallContext`] carries the caller's open
//! transaction, if any; operations that write join it through
//! [`UnitOfWork::begin`](crate::persistence::UnitOfWork::begin) so only the
//! outermost caller commits.

use uuid::Uuid;

use crate::error::{ChartAiError, ChartAiResult};
use crate::persistence::{Transaction, TransactionScope};
use crate::validation::{FieldError, FormErrors, validate_uuid};

pub mod charts;
pub mod databases;

pub use charts::{
    ChartDataResponse, ChartResponse, ChartService, CreateChartRequest, DeleteChartRequest,
    GetChartDataByIdRequest,
};
pub use databases::{
    CreateDatabaseRequest, DatabaseResponse, DatabaseService, DeleteDatabaseRequest,
    GetDatabaseByIdRequest, RunQueryOnDatabaseRequest, SyncDatabaseRequest, UpdateDatabaseRequest,
};

/// Request-scoped carrier of the caller's transaction
pub struct CallContext<'a, S: TransactionScope> {
    transaction: Option<&'a Transaction<S>>,
}

impl<'a, S: TransactionScope> CallContext<'a, S> {
    /// Context with no open transaction
    pub fn new() -> Self {
        Self { transaction: None }
    }

    /// Context bound to `transaction`
    pub fn with_transaction(transaction: &'a Transaction<S>) -> Self {
        Self {
            transaction: Some(transaction),
        }
    }

    pub fn transaction(&self) -> Option<&'a Transaction<S>> {
        self.transaction
    }
}

impl<S: TransactionScope> Default for CallContext<'_, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TransactionScope> Clone for CallContext<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: TransactionScope> Copy for CallContext<'_, S> {}

/// Parse an id field, reporting a failure as a field-level violation.
pub(crate) fn parse_id(field: &str, value: &str) -> ChartAiResult<Uuid> {
    validate_uuid(value).map_err(|e| {
        let mut errors = FormErrors::new();
        errors.push(FieldError::from_validation(field, &e, value.into()));
        ChartAiError::ValidationFailed(errors)
    })
}
