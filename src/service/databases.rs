//! Database registration operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{CallContext, parse_id};
use crate::database::{
    AdapterFactory, DatabaseKind, DatabaseRecord, QueryResult, Table, mask_connection_string,
};
use crate::error::{ChartAiError, ChartAiResult};
use crate::persistence::{ChartRepository, DatabaseRepository, TransactionScope, UnitOfWork};
use crate::validation::{
    FormErrors, MAX_QUERY_LENGTH, Validate, validate_connection_string, validate_database_name,
    validate_required, validate_uuid,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: i32,
    pub connection_string: String,
}

impl Validate for CreateDatabaseRequest {
    fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::new();
        errors.check("name", self.name.as_str(), validate_database_name(&self.name));
        errors.check(
            "connectionString",
            mask_connection_string(&self.connection_string),
            validate_connection_string(&self.connection_string),
        );
        errors.into_result()
    }
}

/// Partial update; absent fields are left as stored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDatabaseRequest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

impl Validate for UpdateDatabaseRequest {
    fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::new();
        errors.check("id", self.id.as_str(), validate_uuid(&self.id));
        if let Some(name) = &self.name {
            errors.check("name", name.as_str(), validate_database_name(name));
        }
        if let Some(connection_string) = &self.connection_string {
            errors.check(
                "connectionString",
                mask_connection_string(connection_string),
                validate_connection_string(connection_string),
            );
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDatabaseRequest {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDatabaseByIdRequest {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunQueryOnDatabaseRequest {
    pub id: String,
    pub query: String,
}

impl Validate for RunQueryOnDatabaseRequest {
    fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::new();
        errors.check("id", self.id.as_str(), validate_uuid(&self.id));
        errors.check(
            "query",
            self.query.as_str(),
            validate_required("query", &self.query, MAX_QUERY_LENGTH),
        );
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteDatabaseRequest {
    pub id: String,
}

/// Public view of a registered database; never carries the connection string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: DatabaseKind,
    pub name: String,
    pub schema: Vec<Table>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl From<&DatabaseRecord> for DatabaseResponse {
    fn from(record: &DatabaseRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            name: record.name.clone(),
            schema: record.tables().to_vec(),
            last_sync: record.last_sync,
        }
    }
}

/// Registration, introspection and ad-hoc querying of external databases
pub struct DatabaseService<S: TransactionScope> {
    unit_of_work: Arc<dyn UnitOfWork<Scope = S>>,
    databases: Arc<dyn DatabaseRepository<Scope = S>>,
    charts: Arc<dyn ChartRepository<Scope = S>>,
    adapters: Arc<dyn AdapterFactory>,
}

impl<S: TransactionScope> DatabaseService<S> {
    pub fn new(
        unit_of_work: Arc<dyn UnitOfWork<Scope = S>>,
        databases: Arc<dyn DatabaseRepository<Scope = S>>,
        charts: Arc<dyn ChartRepository<Scope = S>>,
        adapters: Arc<dyn AdapterFactory>,
    ) -> Self {
        Self {
            unit_of_work,
            databases,
            charts,
            adapters,
        }
    }

    /// Open an adapter, capture the schema and close the adapter again.
    ///
    /// Any failure to connect or introspect is reported as
    /// [`ChartAiError::InvalidDatabaseConnectionString`].
    async fn introspect(&self, kind: DatabaseKind, connection_string: &str) -> ChartAiResult<Vec<Table>> {
        let mut adapter = self
            .adapters
            .open(kind, connection_string)
            .await
            .map_err(|e| {
                tracing::warn!(
                    "Failed to open {} database {}: {}",
                    kind,
                    mask_connection_string(connection_string),
                    e
                );
                ChartAiError::InvalidDatabaseConnectionString
            })?;

        let schema = adapter.get_schema().await;
        adapter.close().await;

        schema.map_err(|e| {
            tracing::warn!(
                "Failed to introspect {}: {}",
                mask_connection_string(connection_string),
                e
            );
            ChartAiError::InvalidDatabaseConnectionString
        })
    }

    fn resolve_kind(code: i32) -> ChartAiResult<DatabaseKind> {
        DatabaseKind::from_code(code).map_err(|e| {
            tracing::warn!("Rejected database type {}: {}", code, e);
            ChartAiError::InvalidDatabaseConnectionString
        })
    }

    pub async fn create(
        &self,
        ctx: CallContext<'_, S>,
        request: CreateDatabaseRequest,
    ) -> ChartAiResult<DatabaseResponse> {
        request.validate()?;

        let tx = self.unit_of_work.begin(ctx.transaction()).await?;
        let outcome: ChartAiResult<DatabaseRecord> = async {
            let kind = Self::resolve_kind(request.kind)?;
            let tables = self.introspect(kind, &request.connection_string).await?;

            let mut record = DatabaseRecord::new(&request.name, kind, &request.connection_string);
            let created_at = record.created_at;
            record.replace_schema(tables, created_at);

            self.databases.create(&tx, &record).await?;
            Ok(record)
        }
        .await;
        let record = tx.settle(outcome).await?;

        tracing::info!(
            "Registered database '{}' ({}) with {} tables",
            record.name,
            record.id,
            record.tables().len()
        );
        Ok(DatabaseResponse::from(&record))
    }

    /// Apply the present fields; a new type or connection string triggers a
    /// fresh introspection.
    pub async fn update(
        &self,
        ctx: CallContext<'_, S>,
        request: UpdateDatabaseRequest,
    ) -> ChartAiResult<DatabaseResponse> {
        request.validate()?;
        let id = parse_id("id", &request.id)?;

        let tx = self.unit_of_work.begin(ctx.transaction()).await?;
        let outcome: ChartAiResult<DatabaseRecord> = async {
            let mut record = self.databases.get_by_id(Some(&tx), id).await?;

            if let Some(name) = &request.name {
                record.name = name.clone();
            }
            if let Some(code) = request.kind {
                record.kind = Self::resolve_kind(code)?;
            }
            if let Some(connection_string) = &request.connection_string {
                record.connection_string = connection_string.clone();
            }
            if request.kind.is_some() || request.connection_string.is_some() {
                let tables = self.introspect(record.kind, &record.connection_string).await?;
                record.replace_schema(tables, Utc::now());
            }

            record.touch();
            self.databases.update(&tx, &record).await?;
            Ok(record)
        }
        .await;
        let record = tx.settle(outcome).await?;

        tracing::info!("Updated database {}", record.id);
        Ok(DatabaseResponse::from(&record))
    }

    /// Re-introspect the stored connection and replace the snapshot wholesale.
    pub async fn sync(
        &self,
        ctx: CallContext<'_, S>,
        request: SyncDatabaseRequest,
    ) -> ChartAiResult<DatabaseResponse> {
        let id = parse_id("id", &request.id)?;

        let tx = self.unit_of_work.begin(ctx.transaction()).await?;
        let outcome: ChartAiResult<DatabaseRecord> = async {
            let mut record = self.databases.get_by_id(Some(&tx), id).await?;
            let tables = self.introspect(record.kind, &record.connection_string).await?;

            record.replace_schema(tables, Utc::now());
            record.touch();
            self.databases.update(&tx, &record).await?;
            Ok(record)
        }
        .await;
        let record = tx.settle(outcome).await?;

        tracing::info!(
            "Synced database {} ({} tables)",
            record.id,
            record.tables().len()
        );
        Ok(DatabaseResponse::from(&record))
    }

    pub async fn get_all(&self, ctx: CallContext<'_, S>) -> ChartAiResult<Vec<DatabaseResponse>> {
        let records = self.databases.get_all(ctx.transaction()).await?;
        Ok(records.iter().map(DatabaseResponse::from).collect())
    }

    /// Load one database, joining the caller's transaction when present.
    pub async fn get_by_id(
        &self,
        ctx: CallContext<'_, S>,
        request: GetDatabaseByIdRequest,
    ) -> ChartAiResult<DatabaseResponse> {
        let id = parse_id("id", &request.id)?;

        let tx = self.unit_of_work.begin(ctx.transaction()).await?;
        tracing::debug!("Loading database {} (nested: {})", id, tx.is_nested());
        let outcome: ChartAiResult<DatabaseRecord> =
            self.databases.get_by_id(Some(&tx), id).await.map_err(Into::into);
        let record = tx.settle(outcome).await?;

        Ok(DatabaseResponse::from(&record))
    }

    /// Execute `query` verbatim against the registered database.
    pub async fn run_query(
        &self,
        ctx: CallContext<'_, S>,
        request: RunQueryOnDatabaseRequest,
    ) -> ChartAiResult<QueryResult> {
        request.validate()?;
        let id = parse_id("id", &request.id)?;

        let record = self.databases.get_by_id(ctx.transaction(), id).await?;
        let mut adapter = self
            .adapters
            .open(record.kind, &record.connection_string)
            .await
            .map_err(|e| {
                tracing::warn!(
                    "Failed to open database {} ({}): {}",
                    record.id,
                    mask_connection_string(&record.connection_string),
                    e
                );
                ChartAiError::InvalidDatabaseConnectionString
            })?;

        let result = adapter.run_query(&request.query).await;
        adapter.close().await;

        let result = result?;
        tracing::debug!(
            "Query on {} returned {} rows in {}ms",
            record.id,
            result.row_count(),
            result.execution_time_ms
        );
        Ok(result)
    }

    /// Soft delete the database and every chart built on it.
    pub async fn delete(
        &self,
        ctx: CallContext<'_, S>,
        request: DeleteDatabaseRequest,
    ) -> ChartAiResult<()> {
        let id = parse_id("id", &request.id)?;

        let tx = self.unit_of_work.begin(ctx.transaction()).await?;
        let outcome: ChartAiResult<u64> = async {
            self.databases.soft_delete(&tx, id).await?;
            Ok(self.charts.soft_delete_by_database(&tx, id).await?)
        }
        .await;
        let charts = tx.settle(outcome).await?;

        tracing::info!("Deleted database {} and {} charts", id, charts);
        Ok(())
    }

    /// Permanently remove the database row and all of its charts.
    pub async fn purge(
        &self,
        ctx: CallContext<'_, S>,
        request: DeleteDatabaseRequest,
    ) -> ChartAiResult<()> {
        let id = parse_id("id", &request.id)?;

        let tx = self.unit_of_work.begin(ctx.transaction()).await?;
        let outcome: ChartAiResult<u64> = async {
            let charts = self.charts.delete_by_database(&tx, id).await?;
            self.databases.delete(&tx, id).await?;
            Ok(charts)
        }
        .await;
        let charts = tx.settle(outcome).await?;

        tracing::info!("Purged database {} and {} charts", id, charts);
        Ok(())
    }
}
