//! CLI command handlers

pub mod chart;
pub mod database;

use std::path::Path;
use std::sync::Arc;

use chartai::config::{CONFIG_FILENAME, sample_config};
use chartai::database::OutputFormat;
use chartai::llm::{OpenAiConfig, OpenAiLlmService};
use chartai::persistence::postgres::PgScope;
use chartai::{AppConfig, ChartRegistry, ChartService, DatabaseService, DefaultAdapterFactory, PgStorage};

use crate::error::CliError;

/// Services wired against the configured storage database and LLM
pub struct App {
    pub databases: Arc<DatabaseService<PgScope>>,
    pub charts: ChartService<PgScope>,
    pub format: OutputFormat,
}

impl App {
    pub fn connect(config: &AppConfig, format: OutputFormat) -> Result<Self, CliError> {
        let storage = connect_storage(config)?;
        let registry = Arc::new(ChartRegistry::with_builtin());
        let unit_of_work = Arc::new(storage.unit_of_work());
        let chart_repository = Arc::new(storage.chart_repository(Arc::clone(&registry)));

        let databases = Arc::new(DatabaseService::new(
            unit_of_work.clone(),
            Arc::new(storage.database_repository()),
            chart_repository.clone(),
            Arc::new(DefaultAdapterFactory),
        ));

        let llm = OpenAiLlmService::new(OpenAiConfig::from(config.llm.clone()))?;
        let charts = ChartService::new(
            unit_of_work,
            chart_repository,
            Arc::clone(&databases),
            Arc::new(llm),
            registry,
        );

        Ok(Self {
            databases,
            charts,
            format,
        })
    }

    /// Render `value` as pretty JSON regardless of the table/CSV preference.
    pub fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<(), CliError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| CliError::IoError(format!("Failed to serialize output: {}", e)))?;
        println!("{}", json);
        Ok(())
    }
}

fn connect_storage(config: &AppConfig) -> Result<PgStorage, CliError> {
    let connection_string = config.storage_connection_string()?;
    Ok(PgStorage::connect(connection_string, config.storage.pool_size)?)
}

/// Write a sample `chartai.toml` into `dir`.
pub fn handle_init(dir: &Path, force: bool) -> Result<(), CliError> {
    if AppConfig::exists(dir) && !force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists in {}. Use --force to overwrite.",
            CONFIG_FILENAME,
            dir.display()
        )));
    }

    std::fs::write(dir.join(CONFIG_FILENAME), sample_config())
        .map_err(|e| CliError::IoError(format!("Failed to write config: {}", e)))?;

    println!("Wrote {}", dir.join(CONFIG_FILENAME).display());
    Ok(())
}

/// Create the storage tables.
pub async fn handle_migrate(config: &AppConfig) -> Result<(), CliError> {
    let storage = connect_storage(config)?;
    storage.migrate().await?;
    println!("Storage schema is up to date");
    Ok(())
}
