//! Integration tests for the transactional chart creation workflow

mod common;

use chartai::service::{DeleteChartRequest, GetChartDataByIdRequest};
use chartai::{CallContext, ChartAiError, ErrorKind, SynthesisStage, UnitOfWork};
use common::{Harness, SALES_SQL};

#[tokio::test]
async fn test_create_line_chart() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    let before = harness.store.stats();
    harness.llm.script_line_chart();

    let chart = harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap();

    assert_eq!(chart.title, "Sales Trend");
    assert_eq!(chart.chart_type, "Line");
    assert_eq!(chart.query, SALES_SQL);
    assert_eq!(chart.database_id, database_id);
    assert_eq!(harness.store.chart_rows().await, 1);

    let after = harness.store.stats();
    assert_eq!(after.begun, before.begun + 1);
    assert_eq!(after.commits, before.commits + 1);
    assert_eq!(after.rollbacks, before.rollbacks);
}

#[tokio::test]
async fn test_prompts_are_issued_in_order() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    harness.llm.script_line_chart();

    harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap();

    let prompts = harness.llm.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].contains("Show me how sales evolve per category"));
    assert!(prompts[1].contains("\"Bar\" or \"Line\""));
    assert!(prompts[2].contains("Table 'sales':"));
    assert!(prompts[2].contains("PostgreSQL"));
    assert!(prompts[2].contains("\"Category\""));
}

#[tokio::test]
async fn test_title_failure_rolls_back() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    let before = harness.store.stats();
    harness.llm.push_failure();

    let err = harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap_err();

    assert!(matches!(err, ChartAiError::SynthesisFailed(SynthesisStage::Title)));
    assert_eq!(err.to_string(), "Failed to process the chart title");
    assert_eq!(harness.llm.prompts().len(), 1);
    assert_eq!(harness.store.chart_rows().await, 0);
    assert_eq!(harness.store.stats().rollbacks, before.rollbacks + 1);
    assert_eq!(harness.store.stats().commits, before.commits);
}

#[tokio::test]
async fn test_classification_failure_rolls_back() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    harness.llm.push_reply("Sales Trend");
    harness.llm.push_failure();

    let err = harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ChartAiError::SynthesisFailed(SynthesisStage::Classification)
    ));
    assert_eq!(harness.llm.prompts().len(), 2);
    assert_eq!(harness.store.chart_rows().await, 0);
}

#[tokio::test]
async fn test_sql_failure_rolls_back() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    harness.llm.push_reply("Sales Trend");
    harness.llm.push_reply("Bar");
    harness.llm.push_failure();

    let err = harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap_err();

    assert!(matches!(err, ChartAiError::SynthesisFailed(SynthesisStage::Sql)));
    assert_eq!(err.kind(), ErrorKind::SynthesisFailed);
    assert_eq!(harness.store.chart_rows().await, 0);
}

#[tokio::test]
async fn test_unregistered_chart_type_is_rejected() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    harness.llm.push_reply("Sales Share");
    harness.llm.push_reply("Pie");
    harness.llm.push_reply(SALES_SQL);

    let err = harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap_err();

    assert!(matches!(err, ChartAiError::UnsupportedChartType(ref name) if name == "Pie"));
    // SQL is never requested for an unknown type
    assert_eq!(harness.llm.prompts().len(), 2);
    assert_eq!(harness.llm.remaining(), 1);
    assert_eq!(harness.store.chart_rows().await, 0);
}

#[tokio::test]
async fn test_classification_reply_is_normalized() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    harness.llm.push_reply("  Monthly Sales \n");
    harness.llm.push_reply(" \"bar\"\n");
    harness.llm.push_reply(&format!("SQL Query: {}", SALES_SQL));

    let chart = harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap();

    assert_eq!(chart.title, "Monthly Sales");
    assert_eq!(chart.chart_type, "Bar");
    assert_eq!(chart.query, SALES_SQL);
}

#[tokio::test]
async fn test_persistence_failure_then_retry() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;

    harness
        .store
        .fail_writes(Some("disk full".to_string()))
        .await;
    harness.llm.script_line_chart();
    let err = harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap_err();

    assert!(err.is_internal());
    assert_eq!(harness.store.chart_rows().await, 0);
    assert!(!err.into_public().to_string().contains("disk full"));

    harness.store.fail_writes(None).await;
    harness.llm.script_line_chart();
    harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap();

    assert_eq!(harness.store.chart_rows().await, 1);
}

#[tokio::test]
async fn test_llm_failure_then_retry_persists_once() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    let prefixes: [&[&str]; 3] = [&[], &["Sales Trend"], &["Sales Trend", "Line"]];

    for (attempt, replies) in prefixes.iter().enumerate() {
        let before = harness.store.stats();
        for reply in replies.iter() {
            harness.llm.push_reply(reply);
        }
        harness.llm.push_failure();

        let err = harness
            .charts
            .create(CallContext::new(), Harness::chart_request(database_id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SynthesisFailed);
        assert_eq!(harness.store.chart_rows().await, attempt);
        assert_eq!(harness.store.stats().rollbacks, before.rollbacks + 1);

        harness.llm.script_line_chart();
        let chart = harness
            .charts
            .create(CallContext::new(), Harness::chart_request(database_id))
            .await
            .unwrap();

        assert_eq!(chart.title, "Sales Trend");
        assert_eq!(harness.store.chart_rows().await, attempt + 1);
        assert_eq!(harness.store.stats().commits, before.commits + 1);
        assert_eq!(harness.llm.remaining(), 0);
    }
}

#[tokio::test]
async fn test_missing_database_skips_llm() {
    let harness = Harness::new();
    harness.llm.script_line_chart();

    let err = harness
        .charts
        .create(
            CallContext::new(),
            Harness::chart_request(uuid::Uuid::new_v4()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ChartAiError::NotFound));
    assert!(harness.llm.prompts().is_empty());
}

#[tokio::test]
async fn test_invalid_request_opens_no_transaction() {
    let harness = Harness::new();
    let mut request = Harness::chart_request(uuid::Uuid::new_v4());
    request.prompt = String::new();
    request.database_id = "42".to_string();

    let err = harness
        .charts
        .create(CallContext::new(), request)
        .await
        .unwrap_err();

    match err {
        ChartAiError::ValidationFailed(errors) => assert_eq!(errors.len(), 2),
        other => panic!("expected validation failure, got {:?}", other),
    }
    assert_eq!(harness.store.stats().begun, 0);
}

#[tokio::test]
async fn test_create_joins_caller_transaction() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    let before = harness.store.stats();
    harness.llm.script_line_chart();

    let tx = harness.unit_of_work.begin_root().await.unwrap();
    harness
        .charts
        .create(
            CallContext::with_transaction(&tx),
            Harness::chart_request(database_id),
        )
        .await
        .unwrap();

    // Nothing is visible until the caller commits
    assert_eq!(harness.store.stats().commits, before.commits);
    assert_eq!(harness.store.chart_rows().await, 0);
    assert!(!tx.is_finalized());

    tx.commit().await.unwrap();
    assert_eq!(harness.store.chart_rows().await, 1);
    assert_eq!(harness.store.stats().begun, before.begun + 1);
}

#[tokio::test]
async fn test_caller_rollback_discards_chart() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    harness.llm.script_line_chart();

    let tx = harness.unit_of_work.begin_root().await.unwrap();
    harness
        .charts
        .create(
            CallContext::with_transaction(&tx),
            Harness::chart_request(database_id),
        )
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(harness.store.chart_rows().await, 0);
}

#[tokio::test]
async fn test_chart_data_round_trip() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    harness.llm.script_line_chart();
    let chart = harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap();

    let data = harness
        .charts
        .get_data_by_id(
            CallContext::new(),
            GetChartDataByIdRequest {
                id: chart.id.to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(data.chart_type, "Line");
    assert_eq!(data.title, "Sales Trend");
    assert_eq!(data.data.len(), 2);
    assert_eq!(data.data[0]["Category"], "Books");
    assert_eq!(harness.adapters.queries(), vec![SALES_SQL.to_string()]);
    assert_eq!(harness.adapters.opened(), harness.adapters.closed());

    let all = harness.charts.get_all(CallContext::new()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, chart.id);
}

#[tokio::test]
async fn test_deleted_chart_is_not_found() {
    let harness = Harness::new();
    let database_id = harness.register_database().await;
    harness.llm.script_line_chart();
    let chart = harness
        .charts
        .create(CallContext::new(), Harness::chart_request(database_id))
        .await
        .unwrap();

    harness
        .charts
        .delete(
            CallContext::new(),
            DeleteChartRequest {
                id: chart.id.to_string(),
            },
        )
        .await
        .unwrap();

    let err = harness
        .charts
        .get_data_by_id(
            CallContext::new(),
            GetChartDataByIdRequest {
                id: chart.id.to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ChartAiError::NotFound));
    assert!(harness.charts.get_all(CallContext::new()).await.unwrap().is_empty());
    // Soft delete keeps the row
    assert_eq!(harness.store.chart_rows().await, 1);
}
