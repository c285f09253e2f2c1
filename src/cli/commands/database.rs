//! Database registration CLI commands

use chartai::CallContext;
use chartai::database::{DatabaseKind, format_query_result};
use chartai::service::{
    CreateDatabaseRequest, DatabaseResponse, DeleteDatabaseRequest, GetDatabaseByIdRequest,
    RunQueryOnDatabaseRequest, SyncDatabaseRequest, UpdateDatabaseRequest,
};

use super::App;
use crate::error::CliError;

/// Arguments for `database add`
#[derive(Debug, Clone)]
pub struct AddArgs {
    pub name: String,
    pub kind: i32,
    pub connection_string: String,
}

pub async fn handle_add(app: &App, args: AddArgs) -> Result<(), CliError> {
    let response = app
        .databases
        .create(
            CallContext::new(),
            CreateDatabaseRequest {
                name: args.name,
                kind: args.kind,
                connection_string: args.connection_string,
            },
        )
        .await?;

    print_summary(&response);
    Ok(())
}

pub async fn handle_list(app: &App) -> Result<(), CliError> {
    let databases = app.databases.get_all(CallContext::new()).await?;

    if databases.is_empty() {
        println!("No databases registered");
        return Ok(());
    }

    for database in &databases {
        print_summary(database);
    }
    Ok(())
}

pub async fn handle_show(app: &App, id: String) -> Result<(), CliError> {
    let response = app
        .databases
        .get_by_id(CallContext::new(), GetDatabaseByIdRequest { id })
        .await?;
    app.print_json(&response)
}

/// Arguments for `database update`
#[derive(Debug, Clone)]
pub struct UpdateArgs {
    pub id: String,
    pub name: Option<String>,
    pub kind: Option<i32>,
    pub connection_string: Option<String>,
}

pub async fn handle_update(app: &App, args: UpdateArgs) -> Result<(), CliError> {
    if args.name.is_none() && args.kind.is_none() && args.connection_string.is_none() {
        return Err(CliError::InvalidArgument(
            "Nothing to update. Pass --name, --type or --connection-string.".to_string(),
        ));
    }

    let response = app
        .databases
        .update(
            CallContext::new(),
            UpdateDatabaseRequest {
                id: args.id,
                name: args.name,
                kind: args.kind,
                connection_string: args.connection_string,
            },
        )
        .await?;

    print_summary(&response);
    Ok(())
}

pub async fn handle_sync(app: &App, id: String) -> Result<(), CliError> {
    let response = app
        .databases
        .sync(CallContext::new(), SyncDatabaseRequest { id })
        .await?;

    print_summary(&response);
    Ok(())
}

pub async fn handle_query(app: &App, id: String, sql: String) -> Result<(), CliError> {
    let result = app
        .databases
        .run_query(CallContext::new(), RunQueryOnDatabaseRequest { id, query: sql })
        .await?;

    println!("{}", format_query_result(&result, app.format));
    eprintln!("\nExecution time: {}ms", result.execution_time_ms);
    Ok(())
}

pub async fn handle_remove(app: &App, id: String, purge: bool) -> Result<(), CliError> {
    let request = DeleteDatabaseRequest { id: id.clone() };
    if purge {
        app.databases.purge(CallContext::new(), request).await?;
        println!("Purged database {}", id);
    } else {
        app.databases.delete(CallContext::new(), request).await?;
        println!("Deleted database {}", id);
    }
    Ok(())
}

fn print_summary(database: &DatabaseResponse) {
    let columns: usize = database.schema.iter().map(|t| t.columns.len()).sum();
    let synced = database
        .last_sync
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());

    println!(
        "{}  {} ({})  {} tables, {} columns, synced {}",
        database.id,
        database.name,
        kind_label(database.kind),
        database.schema.len(),
        columns,
        synced
    );
}

fn kind_label(kind: DatabaseKind) -> String {
    format!("{}, type {}", kind, kind.code())
}
