//! CLI binary entry point for chartai-cli

mod commands;
mod error;

use anyhow::Context;
use chartai::AppConfig;
use chartai::database::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::App;
use commands::database::{AddArgs, UpdateArgs};

#[derive(Parser)]
#[command(name = "chartai-cli")]
#[command(about = "Register databases and synthesize charts from natural language")]
#[command(version)]
struct Cli {
    /// Directory holding chartai.toml
    #[arg(short, long, default_value = ".", global = true)]
    config_dir: PathBuf,

    /// Output format for result sets (table, json, csv)
    #[arg(short, long, default_value = "table", global = true)]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample chartai.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Create or upgrade the storage tables
    Migrate,
    /// Manage registered databases
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },
    /// Synthesize and inspect charts
    Chart {
        #[command(subcommand)]
        command: ChartCommands,
    },
}

#[derive(Subcommand)]
enum DatabaseCommands {
    /// Register a database and capture its schema
    Add {
        name: String,
        connection_string: String,
        /// Database type code (0 = PostgreSQL)
        #[arg(long = "type", default_value_t = 0)]
        kind: i32,
    },
    /// List registered databases
    List,
    /// Show one database with its schema
    Show { id: String },
    /// Change name, type or connection string
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type")]
        kind: Option<i32>,
        #[arg(long)]
        connection_string: Option<String>,
    },
    /// Re-capture the schema
    Sync { id: String },
    /// Run SQL against a registered database
    Query { id: String, sql: String },
    /// Delete a database and its charts
    Remove {
        id: String,
        /// Remove rows permanently instead of marking them deleted
        #[arg(long)]
        purge: bool,
    },
}

#[derive(Subcommand)]
enum ChartCommands {
    /// Create a chart from a natural-language prompt
    Create { database_id: String, prompt: String },
    /// List charts with their current row counts
    List,
    /// Show one chart with its data
    Show { id: String },
    /// Delete a chart
    Remove { id: String },
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { force } = cli.command {
        return commands::handle_init(&cli.config_dir, force).context("Failed to initialize");
    }

    let config = AppConfig::load(&cli.config_dir).context("Failed to load configuration")?;
    init_tracing(&config);

    let format: OutputFormat = cli
        .format
        .parse()
        .map_err(|e: String| error::CliError::InvalidArgument(e))?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;

    rt.block_on(async {
        if let Commands::Migrate = cli.command {
            return commands::handle_migrate(&config).await;
        }

        let app = App::connect(&config, format)?;
        match cli.command {
            Commands::Database { command } => match command {
                DatabaseCommands::Add {
                    name,
                    connection_string,
                    kind,
                } => {
                    commands::database::handle_add(
                        &app,
                        AddArgs {
                            name,
                            kind,
                            connection_string,
                        },
                    )
                    .await
                }
                DatabaseCommands::List => commands::database::handle_list(&app).await,
                DatabaseCommands::Show { id } => commands::database::handle_show(&app, id).await,
                DatabaseCommands::Update {
                    id,
                    name,
                    kind,
                    connection_string,
                } => {
                    commands::database::handle_update(
                        &app,
                        UpdateArgs {
                            id,
                            name,
                            kind,
                            connection_string,
                        },
                    )
                    .await
                }
                DatabaseCommands::Sync { id } => commands::database::handle_sync(&app, id).await,
                DatabaseCommands::Query { id, sql } => {
                    commands::database::handle_query(&app, id, sql).await
                }
                DatabaseCommands::Remove { id, purge } => {
                    commands::database::handle_remove(&app, id, purge).await
                }
            },
            Commands::Chart { command } => match command {
                ChartCommands::Create {
                    database_id,
                    prompt,
                } => commands::chart::handle_create(&app, database_id, prompt).await,
                ChartCommands::List => commands::chart::handle_list(&app).await,
                ChartCommands::Show { id } => commands::chart::handle_show(&app, id).await,
                ChartCommands::Remove { id } => commands::chart::handle_remove(&app, id).await,
            },
            Commands::Init { .. } | Commands::Migrate => Ok(()),
        }
    })?;

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
