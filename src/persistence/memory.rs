//! In-memory storage backend
//!
//! Each transaction works on a private copy of the committed tables taken
//! at `begin`. Commit merges only the rows the transaction changed back into
//! the committed tables, so overlapping transactions keep each other's
//! writes. Rollback discards the copy.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ChartRepository, DatabaseRepository, PersistenceError, PersistenceResult, Transaction,
    TransactionScope, UnitOfWork,
};
use crate::charts::Chart;
use crate::database::DatabaseRecord;

#[derive(Debug, Clone, Default)]
struct Tables {
    databases: BTreeMap<Uuid, DatabaseRecord>,
    charts: BTreeMap<Uuid, Chart>,
}

/// Transaction counters of a [`MemoryStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub begun: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

/// Shared committed state
#[derive(Default)]
pub struct MemoryStore {
    committed: Mutex<Tables>,
    fail_writes: Mutex<Option<String>>,
    begun: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            begun: self.begun.load(Ordering::SeqCst),
            commits: self.commits.load(Ordering::SeqCst),
            rollbacks: self.rollbacks.load(Ordering::SeqCst),
        }
    }

    /// Make every following write fail with `message` until cleared.
    pub async fn fail_writes(&self, message: Option<String>) {
        *self.fail_writes.lock().await = message;
    }

    /// Committed chart count, including soft-deleted rows
    pub async fn chart_rows(&self) -> usize {
        self.committed.lock().await.charts.len()
    }

    /// Committed database count, including soft-deleted rows
    pub async fn database_rows(&self) -> usize {
        self.committed.lock().await.databases.len()
    }
}

/// Private working copy of one transaction
pub struct MemoryScope {
    store: Arc<MemoryStore>,
    base: Tables,
    working: Mutex<Tables>,
}

/// Apply rows that differ between `base` and `working` onto `committed`.
fn merge_changes<V: Clone + PartialEq>(
    committed: &mut BTreeMap<Uuid, V>,
    base: &BTreeMap<Uuid, V>,
    working: &BTreeMap<Uuid, V>,
) {
    for (id, value) in working {
        if base.get(id) != Some(value) {
            committed.insert(*id, value.clone());
        }
    }
    for id in base.keys() {
        if !working.contains_key(id) {
            committed.remove(id);
        }
    }
}

#[async_trait]
impl TransactionScope for MemoryScope {
    async fn commit(&self) -> PersistenceResult<()> {
        let working = self.working.lock().await;
        let mut committed = self.store.committed.lock().await;
        merge_changes(&mut committed.databases, &self.base.databases, &working.databases);
        merge_changes(&mut committed.charts, &self.base.charts, &working.charts);
        self.store.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> PersistenceResult<()> {
        self.store.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Unit of work over a [`MemoryStore`]
#[derive(Clone)]
pub struct MemoryUnitOfWork {
    store: Arc<MemoryStore>,
}

impl MemoryUnitOfWork {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    type Scope = MemoryScope;

    async fn begin_root(&self) -> PersistenceResult<Transaction<MemoryScope>> {
        let snapshot = self.store.committed.lock().await.clone();
        self.store.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Transaction::root(Arc::new(MemoryScope {
            store: Arc::clone(&self.store),
            base: snapshot.clone(),
            working: Mutex::new(snapshot),
        })))
    }
}

async fn read<R>(
    store: &MemoryStore,
    tx: Option<&Transaction<MemoryScope>>,
    f: impl FnOnce(&Tables) -> R,
) -> R {
    match tx {
        Some(tx) => f(&*tx.scope().working.lock().await),
        None => f(&*store.committed.lock().await),
    }
}

async fn write<R>(
    store: &MemoryStore,
    tx: &Transaction<MemoryScope>,
    f: impl FnOnce(&mut Tables) -> PersistenceResult<R>,
) -> PersistenceResult<R> {
    if let Some(message) = store.fail_writes.lock().await.clone() {
        return Err(PersistenceError::Query(message));
    }
    f(&mut *tx.scope().working.lock().await)
}

/// [`DatabaseRepository`] over a [`MemoryStore`]
#[derive(Clone)]
pub struct MemoryDatabaseRepository {
    store: Arc<MemoryStore>,
}

impl MemoryDatabaseRepository {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DatabaseRepository for MemoryDatabaseRepository {
    type Scope = MemoryScope;

    async fn get_all(
        &self,
        tx: Option<&Transaction<MemoryScope>>,
    ) -> PersistenceResult<Vec<DatabaseRecord>> {
        Ok(read(&self.store, tx, |t| {
            t.databases
                .values()
                .filter(|d| !d.is_deleted)
                .cloned()
                .collect()
        })
        .await)
    }

    async fn get_by_id(
        &self,
        tx: Option<&Transaction<MemoryScope>>,
        id: Uuid,
    ) -> PersistenceResult<DatabaseRecord> {
        read(&self.store, tx, |t| {
            t.databases
                .get(&id)
                .filter(|d| !d.is_deleted)
                .cloned()
                .ok_or(PersistenceError::NotFound)
        })
        .await
    }

    async fn create(
        &self,
        tx: &Transaction<MemoryScope>,
        record: &DatabaseRecord,
    ) -> PersistenceResult<()> {
        write(&self.store, tx, |t| {
            if t.databases.contains_key(&record.id) {
                return Err(PersistenceError::Query(format!(
                    "duplicate database id {}",
                    record.id
                )));
            }
            t.databases.insert(record.id, record.clone());
            Ok(())
        })
        .await
    }

    async fn update(
        &self,
        tx: &Transaction<MemoryScope>,
        record: &DatabaseRecord,
    ) -> PersistenceResult<()> {
        write(&self.store, tx, |t| match t.databases.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(PersistenceError::NotFound),
        })
        .await
    }

    async fn soft_delete(&self, tx: &Transaction<MemoryScope>, id: Uuid) -> PersistenceResult<()> {
        write(&self.store, tx, |t| match t.databases.get_mut(&id) {
            Some(existing) if !existing.is_deleted => {
                existing.is_deleted = true;
                existing.touch();
                Ok(())
            }
            _ => Err(PersistenceError::NotFound),
        })
        .await
    }

    async fn delete(&self, tx: &Transaction<MemoryScope>, id: Uuid) -> PersistenceResult<()> {
        write(&self.store, tx, |t| {
            t.databases
                .remove(&id)
                .map(|_| ())
                .ok_or(PersistenceError::NotFound)
        })
        .await
    }
}

/// [`ChartRepository`] over a [`MemoryStore`]
#[derive(Clone)]
pub struct MemoryChartRepository {
    store: Arc<MemoryStore>,
}

impl MemoryChartRepository {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChartRepository for MemoryChartRepository {
    type Scope = MemoryScope;

    async fn get_all(&self, tx: Option<&Transaction<MemoryScope>>) -> PersistenceResult<Vec<Chart>> {
        let mut charts: Vec<Chart> = read(&self.store, tx, |t| {
            t.charts.values().filter(|c| !c.is_deleted).cloned().collect()
        })
        .await;
        charts.sort_by_key(|c| c.created_at);
        Ok(charts)
    }

    async fn get_by_id(
        &self,
        tx: Option<&Transaction<MemoryScope>>,
        id: Uuid,
    ) -> PersistenceResult<Chart> {
        read(&self.store, tx, |t| {
            t.charts
                .get(&id)
                .filter(|c| !c.is_deleted)
                .cloned()
                .ok_or(PersistenceError::NotFound)
        })
        .await
    }

    async fn create(&self, tx: &Transaction<MemoryScope>, chart: &Chart) -> PersistenceResult<()> {
        write(&self.store, tx, |t| {
            if t.charts.contains_key(&chart.id) {
                return Err(PersistenceError::Query(format!(
                    "duplicate chart id {}",
                    chart.id
                )));
            }
            t.charts.insert(chart.id, chart.clone());
            Ok(())
        })
        .await
    }

    async fn update(&self, tx: &Transaction<MemoryScope>, chart: &Chart) -> PersistenceResult<()> {
        write(&self.store, tx, |t| match t.charts.get_mut(&chart.id) {
            Some(existing) => {
                *existing = chart.clone();
                Ok(())
            }
            None => Err(PersistenceError::NotFound),
        })
        .await
    }

    async fn soft_delete(&self, tx: &Transaction<MemoryScope>, id: Uuid) -> PersistenceResult<()> {
        write(&self.store, tx, |t| match t.charts.get_mut(&id) {
            Some(existing) if !existing.is_deleted => {
                existing.soft_delete();
                Ok(())
            }
            _ => Err(PersistenceError::NotFound),
        })
        .await
    }

    async fn delete(&self, tx: &Transaction<MemoryScope>, id: Uuid) -> PersistenceResult<()> {
        write(&self.store, tx, |t| {
            t.charts
                .remove(&id)
                .map(|_| ())
                .ok_or(PersistenceError::NotFound)
        })
        .await
    }

    async fn soft_delete_by_database(
        &self,
        tx: &Transaction<MemoryScope>,
        database_id: Uuid,
    ) -> PersistenceResult<u64> {
        write(&self.store, tx, |t| {
            let mut changed = 0;
            for chart in t.charts.values_mut() {
                if chart.database_id == database_id && !chart.is_deleted {
                    chart.soft_delete();
                    changed += 1;
                }
            }
            Ok(changed)
        })
        .await
    }

    async fn delete_by_database(
        &self,
        tx: &Transaction<MemoryScope>,
        database_id: Uuid,
    ) -> PersistenceResult<u64> {
        write(&self.store, tx, |t| {
            let before = t.charts.len();
            t.charts.retain(|_, chart| chart.database_id != database_id);
            Ok((before - t.charts.len()) as u64)
        })
        .await
    }
}
