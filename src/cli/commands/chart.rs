//! Chart CLI commands

use chartai::CallContext;
use chartai::database::{QueryResult, format_query_result};
use chartai::service::{
    ChartDataResponse, CreateChartRequest, DeleteChartRequest, GetChartDataByIdRequest,
};

use super::App;
use crate::error::CliError;

pub async fn handle_create(app: &App, database_id: String, prompt: String) -> Result<(), CliError> {
    let chart = app
        .charts
        .create(
            CallContext::new(),
            CreateChartRequest {
                prompt,
                database_id,
            },
        )
        .await?;

    println!("Created {} chart '{}' ({})", chart.chart_type, chart.title, chart.id);
    println!("{}", chart.query);
    Ok(())
}

pub async fn handle_list(app: &App) -> Result<(), CliError> {
    let charts = app.charts.get_all(CallContext::new()).await?;

    if charts.is_empty() {
        println!("No charts");
        return Ok(());
    }

    for chart in &charts {
        println!(
            "{}  {} '{}'  {} rows  (database {})",
            chart.id,
            chart.chart_type,
            chart.title,
            chart.data.len(),
            chart.database_id
        );
    }
    Ok(())
}

pub async fn handle_show(app: &App, id: String) -> Result<(), CliError> {
    let chart = app
        .charts
        .get_data_by_id(CallContext::new(), GetChartDataByIdRequest { id })
        .await?;

    println!("{} chart '{}'", chart.chart_type, chart.title);
    println!("{}\n", chart.query);
    println!("{}", format_query_result(&as_query_result(&chart), app.format));
    Ok(())
}

pub async fn handle_remove(app: &App, id: String) -> Result<(), CliError> {
    app.charts
        .delete(CallContext::new(), DeleteChartRequest { id: id.clone() })
        .await?;
    println!("Deleted chart {}", id);
    Ok(())
}

/// Column order follows the first row; charts project a fixed schema.
fn as_query_result(chart: &ChartDataResponse) -> QueryResult {
    let columns = chart
        .data
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    QueryResult::new(columns, chart.data.clone())
}
