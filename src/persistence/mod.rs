//! Persistence of registered databases and charts
//!
//! Writes always go through a [`Transaction`] obtained from a [`UnitOfWork`].
//! A transaction handle is either the root, which owns commit/rollback, or a
//! nested handle sharing the root's scope, whose commit and rollback are
//! no-ops. Callers that may run inside another operation's transaction pass
//! the parent handle to [`UnitOfWork::begin`] instead of opening a new one.
//!
//! Backends:
//! - [`memory`]: staged writes applied on commit (tests, embedding)
//! - `postgres`: explicit `BEGIN/COMMIT/ROLLBACK` on a pooled connection

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::charts::Chart;
use crate::database::DatabaseRecord;

pub mod memory;
#[cfg(feature = "postgres-backend")]
pub mod postgres;

/// Error type for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// No row matched
    #[error("Record not found")]
    NotFound,

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A stored chart names a type missing from the registry
    #[error("Unsupported chart type: {0}")]
    UnsupportedChartType(String),
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Backend-side state of one open transaction
#[async_trait]
pub trait TransactionScope: Send + Sync + 'static {
    async fn commit(&self) -> PersistenceResult<()>;
    async fn rollback(&self) -> PersistenceResult<()>;
}

/// Handle to an open transaction
pub struct Transaction<S: TransactionScope> {
    scope: Arc<S>,
    nested: bool,
    finalized: AtomicBool,
}

impl<S: TransactionScope> Transaction<S> {
    /// Outermost handle; owns commit and rollback.
    pub fn root(scope: Arc<S>) -> Self {
        Self {
            scope,
            nested: false,
            finalized: AtomicBool::new(false),
        }
    }

    /// Handle sharing `parent`'s scope without finalization authority.
    pub fn nested(parent: &Transaction<S>) -> Self {
        Self {
            scope: Arc::clone(&parent.scope),
            nested: true,
            finalized: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> &S {
        &self.scope
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    /// Commit. No-op when nested or already finalized.
    pub async fn commit(&self) -> PersistenceResult<()> {
        if self.nested || self.finalized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.scope.commit().await
    }

    /// Roll back. No-op when nested or already finalized.
    pub async fn rollback(&self) -> PersistenceResult<()> {
        if self.nested || self.finalized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.scope.rollback().await
    }

    /// Commit on `Ok`, roll back on `Err`.
    ///
    /// A failed rollback is logged and the original error is returned.
    pub async fn settle<T, E>(&self, outcome: Result<T, E>) -> Result<T, E>
    where
        E: From<PersistenceError> + std::fmt::Display,
    {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    tracing::error!("Rollback failed after '{}': {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }
}

/// Transaction factory
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Scope: TransactionScope;

    /// Open a new outermost transaction.
    async fn begin_root(&self) -> PersistenceResult<Transaction<Self::Scope>>;

    /// Join `parent` when present, otherwise open a new transaction.
    async fn begin(
        &self,
        parent: Option<&Transaction<Self::Scope>>,
    ) -> PersistenceResult<Transaction<Self::Scope>> {
        match parent {
            Some(parent) => Ok(Transaction::nested(parent)),
            None => self.begin_root().await,
        }
    }
}

/// Storage of registered databases
///
/// Reads outside a transaction see committed state; reads inside one also
/// see its own uncommitted writes. Soft-deleted records are invisible.
#[async_trait]
pub trait DatabaseRepository: Send + Sync {
    type Scope: TransactionScope;

    async fn get_all(
        &self,
        tx: Option<&Transaction<Self::Scope>>,
    ) -> PersistenceResult<Vec<DatabaseRecord>>;

    async fn get_by_id(
        &self,
        tx: Option<&Transaction<Self::Scope>>,
        id: Uuid,
    ) -> PersistenceResult<DatabaseRecord>;

    async fn create(
        &self,
        tx: &Transaction<Self::Scope>,
        record: &DatabaseRecord,
    ) -> PersistenceResult<()>;

    async fn update(
        &self,
        tx: &Transaction<Self::Scope>,
        record: &DatabaseRecord,
    ) -> PersistenceResult<()>;

    async fn soft_delete(&self, tx: &Transaction<Self::Scope>, id: Uuid) -> PersistenceResult<()>;

    async fn delete(&self, tx: &Transaction<Self::Scope>, id: Uuid) -> PersistenceResult<()>;
}

/// Storage of charts
#[async_trait]
pub trait ChartRepository: Send + Sync {
    type Scope: TransactionScope;

    async fn get_all(&self, tx: Option<&Transaction<Self::Scope>>)
    -> PersistenceResult<Vec<Chart>>;

    async fn get_by_id(
        &self,
        tx: Option<&Transaction<Self::Scope>>,
        id: Uuid,
    ) -> PersistenceResult<Chart>;

    async fn create(&self, tx: &Transaction<Self::Scope>, chart: &Chart) -> PersistenceResult<()>;

    async fn update(&self, tx: &Transaction<Self::Scope>, chart: &Chart) -> PersistenceResult<()>;

    async fn soft_delete(&self, tx: &Transaction<Self::Scope>, id: Uuid) -> PersistenceResult<()>;

    async fn delete(&self, tx: &Transaction<Self::Scope>, id: Uuid) -> PersistenceResult<()>;

    /// Soft delete every live chart of a database; returns how many changed.
    async fn soft_delete_by_database(
        &self,
        tx: &Transaction<Self::Scope>,
        database_id: Uuid,
    ) -> PersistenceResult<u64>;

    /// Remove every chart of a database, live or not.
    async fn delete_by_database(
        &self,
        tx: &Transaction<Self::Scope>,
        database_id: Uuid,
    ) -> PersistenceResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingScope {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    #[async_trait]
    impl TransactionScope for CountingScope {
        async fn commit(&self) -> PersistenceResult<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(&self) -> PersistenceResult<()> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_nested_handle_never_finalizes_outer() {
        let root = Transaction::root(Arc::new(CountingScope::default()));
        let inner = Transaction::nested(&root);

        inner.commit().await.unwrap();
        inner.rollback().await.unwrap();
        assert_eq!(root.scope().commits.load(Ordering::SeqCst), 0);
        assert_eq!(root.scope().rollbacks.load(Ordering::SeqCst), 0);
        assert!(!root.is_finalized());

        root.commit().await.unwrap();
        assert_eq!(root.scope().commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let root = Transaction::root(Arc::new(CountingScope::default()));
        root.commit().await.unwrap();
        root.commit().await.unwrap();
        root.rollback().await.unwrap();

        assert_eq!(root.scope().commits.load(Ordering::SeqCst), 1);
        assert_eq!(root.scope().rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_settle_rolls_back_on_error() {
        let root = Transaction::root(Arc::new(CountingScope::default()));
        let outcome: Result<(), PersistenceError> = Err(PersistenceError::NotFound);

        let result = root.settle(outcome).await;
        assert!(matches!(result, Err(PersistenceError::NotFound)));
        assert_eq!(root.scope().rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(root.scope().commits.load(Ordering::SeqCst), 0);
    }
}
