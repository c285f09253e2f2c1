//! Chart operations

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::databases::{DatabaseService, GetDatabaseByIdRequest, RunQueryOnDatabaseRequest};
use super::{CallContext, parse_id};
use crate::charts::{Chart, ChartRegistry};
use crate::database::QueryRow;
use crate::error::ChartAiResult;
use crate::llm::LlmService;
use crate::persistence::{ChartRepository, TransactionScope, UnitOfWork};
use crate::synthesis::SynthesisPipeline;
use crate::validation::{FormErrors, Validate, validate_prompt, validate_uuid};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChartRequest {
    /// Natural-language description of the chart
    pub prompt: String,
    pub database_id: String,
}

impl Validate for CreateChartRequest {
    fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::new();
        errors.check("prompt", self.prompt.as_str(), validate_prompt(&self.prompt));
        errors.check(
            "databaseId",
            self.database_id.as_str(),
            validate_uuid(&self.database_id),
        );
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetChartDataByIdRequest {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteChartRequest {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub chart_type: String,
    pub title: String,
    pub query: String,
    pub database_id: Uuid,
}

impl From<&Chart> for ChartResponse {
    fn from(chart: &Chart) -> Self {
        Self {
            id: chart.id,
            chart_type: chart.type_name().to_string(),
            title: chart.title.clone(),
            query: chart.query.clone(),
            database_id: chart.database_id,
        }
    }
}

/// A chart together with the rows its query currently returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub chart_type: String,
    pub title: String,
    pub query: String,
    pub data: Vec<QueryRow>,
    pub database_id: Uuid,
}

impl ChartDataResponse {
    fn new(chart: &Chart, data: Vec<QueryRow>) -> Self {
        Self {
            id: chart.id,
            chart_type: chart.type_name().to_string(),
            title: chart.title.clone(),
            query: chart.query.clone(),
            data,
            database_id: chart.database_id,
        }
    }
}

/// Chart synthesis and retrieval
pub struct ChartService<S: TransactionScope> {
    unit_of_work: Arc<dyn UnitOfWork<Scope = S>>,
    charts: Arc<dyn ChartRepository<Scope = S>>,
    databases: Arc<DatabaseService<S>>,
    llm: Arc<dyn LlmService>,
    registry: Arc<ChartRegistry>,
}

impl<S: TransactionScope> ChartService<S> {
    pub fn new(
        unit_of_work: Arc<dyn UnitOfWork<Scope = S>>,
        charts: Arc<dyn ChartRepository<Scope = S>>,
        databases: Arc<DatabaseService<S>>,
        llm: Arc<dyn LlmService>,
        registry: Arc<ChartRegistry>,
    ) -> Self {
        Self {
            unit_of_work,
            charts,
            databases,
            llm,
            registry,
        }
    }

    /// Synthesize a chart from `request.prompt` and persist it.
    ///
    /// The target database is loaded, then title, type and SQL are requested
    /// from the LLM in that order. Any failure rolls back the whole unit of
    /// work, so a failed attempt leaves no chart row behind.
    pub async fn create(
        &self,
        ctx: CallContext<'_, S>,
        request: CreateChartRequest,
    ) -> ChartAiResult<ChartResponse> {
        request.validate()?;

        let tx = self.unit_of_work.begin(ctx.transaction()).await?;
        let outcome: ChartAiResult<Chart> = async {
            tracing::debug!("Loading database {} for chart", request.database_id);
            let database = self
                .databases
                .get_by_id(
                    CallContext::with_transaction(&tx),
                    GetDatabaseByIdRequest {
                        id: request.database_id.clone(),
                    },
                )
                .await?;

            let pipeline = SynthesisPipeline::new(self.llm.as_ref(), &self.registry);
            let draft = pipeline
                .run(&request.prompt, &database.schema, database.kind.dialect())
                .await?;

            let chart = Chart::new(draft.kind, draft.title, draft.sql, database.id);
            tracing::debug!("Persisting {} chart {}", chart.type_name(), chart.id);
            self.charts.create(&tx, &chart).await?;
            Ok(chart)
        }
        .await;
        let chart = tx.settle(outcome).await?;

        tracing::info!(
            "Created {} chart '{}' ({}) on database {}",
            chart.type_name(),
            chart.title,
            chart.id,
            chart.database_id
        );
        Ok(ChartResponse::from(&chart))
    }

    /// Every live chart with its stored query re-executed.
    pub async fn get_all(&self, ctx: CallContext<'_, S>) -> ChartAiResult<Vec<ChartDataResponse>> {
        let charts = self.charts.get_all(ctx.transaction()).await?;

        let mut responses = Vec::with_capacity(charts.len());
        for chart in &charts {
            let data = self.load_data(ctx, chart).await?;
            responses.push(ChartDataResponse::new(chart, data));
        }
        Ok(responses)
    }

    pub async fn get_data_by_id(
        &self,
        ctx: CallContext<'_, S>,
        request: GetChartDataByIdRequest,
    ) -> ChartAiResult<ChartDataResponse> {
        let id = parse_id("id", &request.id)?;

        let chart = self.charts.get_by_id(ctx.transaction(), id).await?;
        let data = self.load_data(ctx, &chart).await?;
        Ok(ChartDataResponse::new(&chart, data))
    }

    pub async fn delete(
        &self,
        ctx: CallContext<'_, S>,
        request: DeleteChartRequest,
    ) -> ChartAiResult<()> {
        let id = parse_id("id", &request.id)?;

        let tx = self.unit_of_work.begin(ctx.transaction()).await?;
        let outcome: ChartAiResult<()> = self.charts.soft_delete(&tx, id).await.map_err(Into::into);
        tx.settle(outcome).await?;

        tracing::info!("Deleted chart {}", id);
        Ok(())
    }

    async fn load_data(&self, ctx: CallContext<'_, S>, chart: &Chart) -> ChartAiResult<Vec<QueryRow>> {
        let result = self
            .databases
            .run_query(
                ctx,
                RunQueryOnDatabaseRequest {
                    id: chart.database_id.to_string(),
                    query: chart.query.clone(),
                },
            )
            .await?;
        Ok(result.rows)
    }
}
