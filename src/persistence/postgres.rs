//! PostgreSQL storage backend
//!
//! Uses connection pooling via deadpool-postgres. A transaction pins one
//! pooled connection between `BEGIN` and `COMMIT`/`ROLLBACK`; reads outside a
//! transaction check out a connection per call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_postgres::Row;
use tokio_postgres::types::Json;
use uuid::Uuid;

use super::{
    ChartRepository, DatabaseRepository, PersistenceError, PersistenceResult, Transaction,
    TransactionScope, UnitOfWork,
};
use crate::charts::{CategoricalMapping, Chart, ChartRegistry};
use crate::database::{DatabaseKind, DatabaseRecord, SchemaSnapshot, mask_connection_string};

/// Storage schema version applied by [`PgStorage::migrate`]
pub const SCHEMA_VERSION: i32 = 1;

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS databases (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    type INTEGER NOT NULL,
    connection_string TEXT NOT NULL,
    schema JSONB,
    last_sync TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    modified_at TIMESTAMPTZ NOT NULL,
    is_archived BOOLEAN NOT NULL DEFAULT FALSE,
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS charts (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    type TEXT NOT NULL,
    query TEXT NOT NULL,
    database_id UUID NOT NULL,
    categorical_column_name TEXT,
    value_column_name TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    modified_at TIMESTAMPTZ NOT NULL,
    is_archived BOOLEAN NOT NULL DEFAULT FALSE,
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_charts_database_id ON charts(database_id);
"#;

const DATABASE_COLUMNS: &str = "id, name, type, connection_string, schema, last_sync, \
     created_at, modified_at, is_archived, is_deleted";

const CHART_COLUMNS: &str = "id, title, type, query, database_id, categorical_column_name, \
     value_column_name, created_at, modified_at, is_archived, is_deleted";

fn query_error(e: tokio_postgres::Error) -> PersistenceError {
    PersistenceError::Query(e.to_string())
}

fn expect_one(affected: u64) -> PersistenceResult<()> {
    if affected == 0 {
        Err(PersistenceError::NotFound)
    } else {
        Ok(())
    }
}

/// Pool and migrations for the storage database
#[derive(Clone)]
pub struct PgStorage {
    pool: Pool,
}

impl PgStorage {
    /// Build a pool; connections are opened lazily.
    pub fn connect(connection_string: &str, pool_size: usize) -> PersistenceResult<Self> {
        let pg_config: tokio_postgres::Config = connection_string.parse().map_err(|e| {
            PersistenceError::Connection(format!(
                "Invalid connection string {}: {}",
                mask_connection_string(connection_string),
                e
            ))
        })?;

        let manager = Manager::from_config(
            pg_config,
            tokio_postgres::NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let pool = Pool::builder(manager)
            .max_size(pool_size)
            .build()
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;

        tracing::info!(
            "Storage pool ready for {} (size {})",
            mask_connection_string(connection_string),
            pool_size
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Create tables and indexes if missing and record the schema version.
    pub async fn migrate(&self) -> PersistenceResult<()> {
        let client = checkout(&self.pool).await?;

        client
            .batch_execute(CREATE_TABLES_SQL)
            .await
            .map_err(|e| PersistenceError::Query(format!("Failed to create tables: {}", e)))?;

        client
            .execute(
                "INSERT INTO schema_version (version) VALUES ($1) ON CONFLICT (version) DO NOTHING",
                &[&SCHEMA_VERSION],
            )
            .await
            .map_err(|e| {
                PersistenceError::Query(format!("Failed to record schema version: {}", e))
            })?;

        tracing::info!("Storage schema at version {}", SCHEMA_VERSION);
        Ok(())
    }

    pub fn unit_of_work(&self) -> PgUnitOfWork {
        PgUnitOfWork {
            pool: self.pool.clone(),
        }
    }

    pub fn database_repository(&self) -> PgDatabaseRepository {
        PgDatabaseRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn chart_repository(&self, registry: Arc<ChartRegistry>) -> PgChartRepository {
        PgChartRepository {
            pool: self.pool.clone(),
            registry,
        }
    }
}

async fn checkout(pool: &Pool) -> PersistenceResult<Object> {
    pool.get()
        .await
        .map_err(|e| PersistenceError::Connection(e.to_string()))
}

fn as_client(object: &Object) -> &tokio_postgres::Client {
    object
}

/// Connection pinned to one open transaction
pub struct PgScope {
    client: Mutex<Option<Object>>,
}

impl PgScope {
    async fn finish(&self, statement: &str) -> PersistenceResult<()> {
        let client = self
            .client
            .lock()
            .await
            .take()
            .ok_or_else(|| PersistenceError::Transaction("transaction already finished".into()))?;

        client
            .batch_execute(statement)
            .await
            .map_err(|e| PersistenceError::Transaction(format!("{} failed: {}", statement, e)))
    }
}

#[async_trait]
impl TransactionScope for PgScope {
    async fn commit(&self) -> PersistenceResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> PersistenceResult<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgScope {
    fn drop(&mut self) {
        let Some(client) = self.client.get_mut().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        tracing::error!("Rollback of abandoned transaction failed: {}", e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("Abandoned transaction outside a runtime; detaching connection");
                drop(Object::take(client));
            }
        }
    }
}

/// Unit of work over the storage pool
#[derive(Clone)]
pub struct PgUnitOfWork {
    pool: Pool,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    type Scope = PgScope;

    async fn begin_root(&self) -> PersistenceResult<Transaction<PgScope>> {
        let client = checkout(&self.pool).await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| PersistenceError::Transaction(format!("BEGIN failed: {}", e)))?;

        Ok(Transaction::root(Arc::new(PgScope {
            client: Mutex::new(Some(client)),
        })))
    }
}

/// Connection used by one repository call
enum Handle<'a> {
    Tx(MutexGuard<'a, Option<Object>>),
    Pooled(Object),
}

impl<'a> Handle<'a> {
    async fn open(pool: &Pool, tx: Option<&'a Transaction<PgScope>>) -> PersistenceResult<Self> {
        match tx {
            Some(tx) => Ok(Handle::Tx(tx.scope().client.lock().await)),
            None => Ok(Handle::Pooled(checkout(pool).await?)),
        }
    }

    fn client(&self) -> PersistenceResult<&tokio_postgres::Client> {
        match self {
            Handle::Tx(guard) => guard
                .as_ref()
                .map(as_client)
                .ok_or_else(|| PersistenceError::Transaction("transaction already finished".into())),
            Handle::Pooled(object) => Ok(as_client(object)),
        }
    }
}

fn database_from_row(row: &Row) -> PersistenceResult<DatabaseRecord> {
    let read = |e: tokio_postgres::Error| PersistenceError::Serialization(e.to_string());
    let code: i32 = row.try_get("type").map_err(read)?;
    let schema: Option<Json<SchemaSnapshot>> = row.try_get("schema").map_err(read)?;

    Ok(DatabaseRecord {
        id: row.try_get("id").map_err(read)?,
        name: row.try_get("name").map_err(read)?,
        kind: DatabaseKind::from_code(code)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?,
        connection_string: row.try_get("connection_string").map_err(read)?,
        schema: schema.map(|Json(snapshot)| snapshot),
        last_sync: row.try_get("last_sync").map_err(read)?,
        created_at: row.try_get("created_at").map_err(read)?,
        modified_at: row.try_get("modified_at").map_err(read)?,
        is_archived: row.try_get("is_archived").map_err(read)?,
        is_deleted: row.try_get("is_deleted").map_err(read)?,
    })
}

/// [`DatabaseRepository`] over the storage pool
#[derive(Clone)]
pub struct PgDatabaseRepository {
    pool: Pool,
}

#[async_trait]
impl DatabaseRepository for PgDatabaseRepository {
    type Scope = PgScope;

    async fn get_all(
        &self,
        tx: Option<&Transaction<PgScope>>,
    ) -> PersistenceResult<Vec<DatabaseRecord>> {
        let handle = Handle::open(&self.pool, tx).await?;
        let rows = handle
            .client()?
            .query(
                &format!(
                    "SELECT {} FROM databases WHERE is_deleted = FALSE ORDER BY created_at",
                    DATABASE_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(query_error)?;

        rows.iter().map(database_from_row).collect()
    }

    async fn get_by_id(
        &self,
        tx: Option<&Transaction<PgScope>>,
        id: Uuid,
    ) -> PersistenceResult<DatabaseRecord> {
        let handle = Handle::open(&self.pool, tx).await?;
        let row = handle
            .client()?
            .query_opt(
                &format!(
                    "SELECT {} FROM databases WHERE id = $1 AND is_deleted = FALSE",
                    DATABASE_COLUMNS
                ),
                &[&id],
            )
            .await
            .map_err(query_error)?
            .ok_or(PersistenceError::NotFound)?;

        database_from_row(&row)
    }

    async fn create(
        &self,
        tx: &Transaction<PgScope>,
        record: &DatabaseRecord,
    ) -> PersistenceResult<()> {
        let handle = Handle::open(&self.pool, Some(tx)).await?;
        handle
            .client()?
            .execute(
                &format!(
                    "INSERT INTO databases ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                    DATABASE_COLUMNS
                ),
                &[
                    &record.id,
                    &record.name,
                    &record.kind.code(),
                    &record.connection_string,
                    &record.schema.as_ref().map(Json),
                    &record.last_sync,
                    &record.created_at,
                    &record.modified_at,
                    &record.is_archived,
                    &record.is_deleted,
                ],
            )
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn update(
        &self,
        tx: &Transaction<PgScope>,
        record: &DatabaseRecord,
    ) -> PersistenceResult<()> {
        let handle = Handle::open(&self.pool, Some(tx)).await?;
        let affected = handle
            .client()?
            .execute(
                r#"
                UPDATE databases SET
                    name = $2,
                    type = $3,
                    connection_string = $4,
                    schema = $5,
                    last_sync = $6,
                    modified_at = $7,
                    is_archived = $8,
                    is_deleted = $9
                WHERE id = $1
                "#,
                &[
                    &record.id,
                    &record.name,
                    &record.kind.code(),
                    &record.connection_string,
                    &record.schema.as_ref().map(Json),
                    &record.last_sync,
                    &record.modified_at,
                    &record.is_archived,
                    &record.is_deleted,
                ],
            )
            .await
            .map_err(query_error)?;
        expect_one(affected)
    }

    async fn soft_delete(&self, tx: &Transaction<PgScope>, id: Uuid) -> PersistenceResult<()> {
        let handle = Handle::open(&self.pool, Some(tx)).await?;
        let now: DateTime<Utc> = Utc::now();
        let affected = handle
            .client()?
            .execute(
                "UPDATE databases SET is_deleted = TRUE, modified_at = $2 WHERE id = $1 AND is_deleted = FALSE",
                &[&id, &now],
            )
            .await
            .map_err(query_error)?;
        expect_one(affected)
    }

    async fn delete(&self, tx: &Transaction<PgScope>, id: Uuid) -> PersistenceResult<()> {
        let handle = Handle::open(&self.pool, Some(tx)).await?;
        let affected = handle
            .client()?
            .execute("DELETE FROM databases WHERE id = $1", &[&id])
            .await
            .map_err(query_error)?;
        expect_one(affected)
    }
}

/// Flat chart row as stored
struct ChartRow {
    id: Uuid,
    title: String,
    type_name: String,
    query: String,
    database_id: Uuid,
    mapping: CategoricalMapping,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    is_archived: bool,
    is_deleted: bool,
}

impl ChartRow {
    fn from_row(row: &Row) -> PersistenceResult<Self> {
        let read = |e: tokio_postgres::Error| PersistenceError::Serialization(e.to_string());
        Ok(Self {
            id: row.try_get("id").map_err(read)?,
            title: row.try_get("title").map_err(read)?,
            type_name: row.try_get("type").map_err(read)?,
            query: row.try_get("query").map_err(read)?,
            database_id: row.try_get("database_id").map_err(read)?,
            mapping: CategoricalMapping {
                categorical_column_name: row.try_get("categorical_column_name").map_err(read)?,
                value_column_name: row.try_get("value_column_name").map_err(read)?,
            },
            created_at: row.try_get("created_at").map_err(read)?,
            modified_at: row.try_get("modified_at").map_err(read)?,
            is_archived: row.try_get("is_archived").map_err(read)?,
            is_deleted: row.try_get("is_deleted").map_err(read)?,
        })
    }

    /// Resolve the stored type name into a variant.
    fn into_chart(self, registry: &ChartRegistry) -> PersistenceResult<Chart> {
        let prototype = registry
            .lookup(&self.type_name)
            .map_err(|_| PersistenceError::UnsupportedChartType(self.type_name.clone()))?;

        Ok(Chart {
            id: self.id,
            title: self.title,
            database_id: self.database_id,
            query: self.query,
            created_at: self.created_at,
            modified_at: self.modified_at,
            is_archived: self.is_archived,
            is_deleted: self.is_deleted,
            kind: prototype.with_mapping(self.mapping),
        })
    }
}

/// [`ChartRepository`] over the storage pool
#[derive(Clone)]
pub struct PgChartRepository {
    pool: Pool,
    registry: Arc<ChartRegistry>,
}

impl PgChartRepository {
    fn to_chart(&self, row: &Row) -> PersistenceResult<Chart> {
        ChartRow::from_row(row)?.into_chart(&self.registry)
    }
}

#[async_trait]
impl ChartRepository for PgChartRepository {
    type Scope = PgScope;

    async fn get_all(&self, tx: Option<&Transaction<PgScope>>) -> PersistenceResult<Vec<Chart>> {
        let handle = Handle::open(&self.pool, tx).await?;
        let rows = handle
            .client()?
            .query(
                &format!(
                    "SELECT {} FROM charts WHERE is_deleted = FALSE ORDER BY created_at",
                    CHART_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(query_error)?;

        rows.iter().map(|row| self.to_chart(row)).collect()
    }

    async fn get_by_id(
        &self,
        tx: Option<&Transaction<PgScope>>,
        id: Uuid,
    ) -> PersistenceResult<Chart> {
        let handle = Handle::open(&self.pool, tx).await?;
        let row = handle
            .client()?
            .query_opt(
                &format!(
                    "SELECT {} FROM charts WHERE id = $1 AND is_deleted = FALSE",
                    CHART_COLUMNS
                ),
                &[&id],
            )
            .await
            .map_err(query_error)?
            .ok_or(PersistenceError::NotFound)?;

        self.to_chart(&row)
    }

    async fn create(&self, tx: &Transaction<PgScope>, chart: &Chart) -> PersistenceResult<()> {
        let handle = Handle::open(&self.pool, Some(tx)).await?;
        let mapping = chart.kind.mapping();
        handle
            .client()?
            .execute(
                &format!(
                    "INSERT INTO charts ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                    CHART_COLUMNS
                ),
                &[
                    &chart.id,
                    &chart.title,
                    &chart.type_name(),
                    &chart.query,
                    &chart.database_id,
                    &mapping.categorical_column_name,
                    &mapping.value_column_name,
                    &chart.created_at,
                    &chart.modified_at,
                    &chart.is_archived,
                    &chart.is_deleted,
                ],
            )
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn update(&self, tx: &Transaction<PgScope>, chart: &Chart) -> PersistenceResult<()> {
        let handle = Handle::open(&self.pool, Some(tx)).await?;
        let mapping = chart.kind.mapping();
        let affected = handle
            .client()?
            .execute(
                r#"
                UPDATE charts SET
                    title = $2,
                    type = $3,
                    query = $4,
                    categorical_column_name = $5,
                    value_column_name = $6,
                    modified_at = $7,
                    is_archived = $8,
                    is_deleted = $9
                WHERE id = $1
                "#,
                &[
                    &chart.id,
                    &chart.title,
                    &chart.type_name(),
                    &chart.query,
                    &mapping.categorical_column_name,
                    &mapping.value_column_name,
                    &chart.modified_at,
                    &chart.is_archived,
                    &chart.is_deleted,
                ],
            )
            .await
            .map_err(query_error)?;
        expect_one(affected)
    }

    async fn soft_delete(&self, tx: &Transaction<PgScope>, id: Uuid) -> PersistenceResult<()> {
        let handle = Handle::open(&self.pool, Some(tx)).await?;
        let now: DateTime<Utc> = Utc::now();
        let affected = handle
            .client()?
            .execute(
                "UPDATE charts SET is_deleted = TRUE, modified_at = $2 WHERE id = $1 AND is_deleted = FALSE",
                &[&id, &now],
            )
            .await
            .map_err(query_error)?;
        expect_one(affected)
    }

    async fn delete(&self, tx: &Transaction<PgScope>, id: Uuid) -> PersistenceResult<()> {
        let handle = Handle::open(&self.pool, Some(tx)).await?;
        let affected = handle
            .client()?
            .execute("DELETE FROM charts WHERE id = $1", &[&id])
            .await
            .map_err(query_error)?;
        expect_one(affected)
    }

    async fn soft_delete_by_database(
        &self,
        tx: &Transaction<PgScope>,
        database_id: Uuid,
    ) -> PersistenceResult<u64> {
        let handle = Handle::open(&self.pool, Some(tx)).await?;
        let now: DateTime<Utc> = Utc::now();
        handle
            .client()?
            .execute(
                "UPDATE charts SET is_deleted = TRUE, modified_at = $2 WHERE database_id = $1 AND is_deleted = FALSE",
                &[&database_id, &now],
            )
            .await
            .map_err(query_error)
    }

    async fn delete_by_database(
        &self,
        tx: &Transaction<PgScope>,
        database_id: Uuid,
    ) -> PersistenceResult<u64> {
        let handle = Handle::open(&self.pool, Some(tx)).await?;
        handle
            .client()?
            .execute("DELETE FROM charts WHERE database_id = $1", &[&database_id])
            .await
            .map_err(query_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(type_name: &str) -> ChartRow {
        let now = Utc::now();
        ChartRow {
            id: Uuid::new_v4(),
            title: "Sales".to_string(),
            type_name: type_name.to_string(),
            query: "SELECT 1".to_string(),
            database_id: Uuid::new_v4(),
            mapping: CategoricalMapping {
                categorical_column_name: Some("month".to_string()),
                value_column_name: None,
            },
            created_at: now,
            modified_at: now,
            is_archived: false,
            is_deleted: false,
        }
    }

    #[test]
    fn test_chart_row_resolves_variant() {
        let chart = row("Line").into_chart(&ChartRegistry::with_builtin()).unwrap();
        assert_eq!(chart.type_name(), "Line");
        assert_eq!(
            chart.kind.mapping().categorical_column_name.as_deref(),
            Some("month")
        );
    }

    #[test]
    fn test_chart_row_unknown_type() {
        let result = row("Pie").into_chart(&ChartRegistry::with_builtin());
        assert!(matches!(result, Err(PersistenceError::UnsupportedChartType(ref s)) if s == "Pie"));
    }

    #[test]
    fn test_expect_one() {
        assert!(matches!(expect_one(0), Err(PersistenceError::NotFound)));
        assert!(expect_one(1).is_ok());
    }

    #[test]
    fn test_ddl_declares_both_tables() {
        assert!(CREATE_TABLES_SQL.contains("CREATE TABLE IF NOT EXISTS databases"));
        assert!(CREATE_TABLES_SQL.contains("CREATE TABLE IF NOT EXISTS charts"));
        assert!(CREATE_TABLES_SQL.contains("schema JSONB"));
    }

    #[test]
    fn test_connect_rejects_malformed_connection_string() {
        let result = PgStorage::connect("postgres://user:pw@host:notaport/db", 2);
        match result {
            Err(PersistenceError::Connection(msg)) => assert!(!msg.contains("pw@")),
            _ => panic!("expected connection error"),
        }
    }
}
