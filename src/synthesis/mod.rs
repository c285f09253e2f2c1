//! Natural-language chart synthesis
//!
//! Three narrow LLM calls, issued one after another:
//! 1. title: a short phrase for the chart
//! 2. classification: one registered chart type name
//! 3. SQL: a single statement projecting the chosen variant's output schema
//!
//! No state is carried between calls except what each prompt embeds.

pub mod prompts;

use crate::charts::{ChartKind, ChartRegistry};
use crate::database::Table;
use crate::error::{ChartAiError, ChartAiResult, SynthesisStage};
use crate::llm::{LlmError, LlmService};

pub use prompts::sanitize_sql;

/// Output of a successful synthesis run
#[derive(Debug, Clone, PartialEq)]
pub struct ChartDraft {
    pub title: String,
    pub kind: ChartKind,
    pub sql: String,
}

/// Runs the title, classification and SQL steps against one LLM
pub struct SynthesisPipeline<'a> {
    llm: &'a dyn LlmService,
    registry: &'a ChartRegistry,
}

impl<'a> SynthesisPipeline<'a> {
    pub fn new(llm: &'a dyn LlmService, registry: &'a ChartRegistry) -> Self {
        Self { llm, registry }
    }

    async fn ask(&self, stage: SynthesisStage, prompt: &str) -> ChartAiResult<String> {
        tracing::debug!("Requesting {} from {}", stage, self.llm.model_name());
        self.llm
            .single_prompt(prompt)
            .await
            .map_err(|e: LlmError| {
                tracing::warn!("LLM call for {} failed: {}", stage, e);
                ChartAiError::SynthesisFailed(stage)
            })
    }

    pub async fn synthesize_title(&self, request: &str) -> ChartAiResult<String> {
        let answer = self
            .ask(SynthesisStage::Title, &prompts::title_prompt(request))
            .await?;
        Ok(answer.trim().to_string())
    }

    /// Ask for a chart type and resolve it through the registry.
    ///
    /// A reply naming no registered type fails with
    /// [`ChartAiError::UnsupportedChartType`].
    pub async fn classify(&self, request: &str) -> ChartAiResult<ChartKind> {
        let prompt = prompts::classification_prompt(request, &self.registry.names());
        let answer = self.ask(SynthesisStage::Classification, &prompt).await?;
        self.registry.lookup(&answer)
    }

    pub async fn synthesize_sql(
        &self,
        request: &str,
        kind: &ChartKind,
        tables: &[Table],
        dialect: &str,
    ) -> ChartAiResult<String> {
        let prompt = prompts::sql_prompt(request, &kind.output_schema(), tables, dialect);
        let answer = self.ask(SynthesisStage::Sql, &prompt).await?;
        Ok(sanitize_sql(&answer))
    }

    /// Run all three steps in order.
    pub async fn run(
        &self,
        request: &str,
        tables: &[Table],
        dialect: &str,
    ) -> ChartAiResult<ChartDraft> {
        let title = self.synthesize_title(request).await?;
        let kind = self.classify(request).await?;
        let sql = self.synthesize_sql(request, &kind, tables, dialect).await?;

        tracing::debug!("Synthesized {} chart '{}'", kind, title);
        Ok(ChartDraft { title, kind, sql })
    }
}
