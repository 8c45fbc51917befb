//! End-to-end test: a run leaves a reviewable, run-id-keyed audit trail.

use async_trait::async_trait;
use cohort_guard::core::{
    generate_run_id, CheckCategory, CheckDefinition, CheckExecutor, CheckOutcome,
    ExecutionContext, ExecutionEngine, ExecutionPolicy,
};
use cohort_guard::query_log::{QueryEvent, QueryLog, QueryPhase};
use cohort_guard::source::{QueryHandle, QueryOutput};
use cohort_guard::Result;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct OneRowHandle;

#[async_trait]
impl QueryHandle for OneRowHandle {
    async fn execute(&self, _sql: &str) -> Result<QueryOutput> {
        Ok(QueryOutput::new(
            ["TOTAL_TESTED", "FAILED_RECORDS"],
            vec![vec![json!(5), json!(0)]],
        ))
    }
}

/// An executor that goes through the context, so its SQL lands in the log.
#[derive(Debug)]
struct CountingExecutor;

#[async_trait]
impl CheckExecutor for CountingExecutor {
    async fn evaluate(&self, ctx: &ExecutionContext) -> Result<CheckOutcome> {
        let output = ctx
            .run_query("row_count", "row_count", "SELECT COUNT(*) AS TOTAL_TESTED, 0 AS FAILED_RECORDS FROM \"T\"")
            .await?;
        let row = output.first_row()?.to_vec();
        Ok(CheckOutcome::passed(output.u64_value(&row, "TOTAL_TESTED")?))
    }
}

#[tokio::test]
async fn a_run_writes_start_query_and_completion_events() {
    let dir = tempfile::tempdir().unwrap();
    let run_id = generate_run_id();
    let query_log = Arc::new(QueryLog::create(dir.path(), &run_id).unwrap());
    let ctx = ExecutionContext::with_handle(
        "test",
        Arc::new(OneRowHandle),
        HashMap::new(),
        HashMap::new(),
        Arc::clone(&query_log),
    );

    let checks = vec![CheckDefinition::new(
        "row_count",
        "Table has rows",
        CheckCategory::DataQuality,
        Arc::new(CountingExecutor),
    )];
    let engine = ExecutionEngine::new(ExecutionPolicy::default());
    let summary = engine.run(checks, ctx).await;
    assert!(summary.all_passed());
    assert_eq!(summary.run_id, run_id);

    let path = query_log.path().unwrap();
    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        format!("{run_id}.jsonl")
    );

    let contents = std::fs::read_to_string(path).unwrap();
    let events: Vec<QueryEvent> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.run_id == run_id));
    assert!(events.iter().all(|e| e.check_name == "row_count"));

    assert_eq!(events[0].phase, QueryPhase::Started);
    assert!(events[1]
        .query
        .as_deref()
        .unwrap_or("")
        .starts_with("SELECT COUNT(*)"));
    assert!(matches!(events[2].phase, QueryPhase::Completed { .. }));

    // Arrival order, 1-based.
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}
