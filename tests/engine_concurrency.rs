//! Integration tests for the execution engine: ordering, isolation,
//! timeout, and retry behavior under concurrency.

use async_trait::async_trait;
use cohort_guard::core::{
    CheckCategory, CheckDefinition, CheckExecutor, CheckOutcome, CheckStatus, ExecutionContext,
    ExecutionEngine, ExecutionPolicy, RetryBackoff, RunAggregator,
};
use cohort_guard::query_log::QueryLog;
use cohort_guard::source::{QueryHandle, QueryOutput};
use cohort_guard::{GuardError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug)]
struct IdleHandle;

#[async_trait]
impl QueryHandle for IdleHandle {
    async fn execute(&self, _sql: &str) -> Result<QueryOutput> {
        Ok(QueryOutput::empty())
    }
}

fn context() -> Arc<ExecutionContext> {
    ExecutionContext::with_handle(
        "test",
        Arc::new(IdleHandle),
        HashMap::new(),
        HashMap::new(),
        Arc::new(QueryLog::disabled("run-engine-test")),
    )
}

/// Scripted executor behaviors for driving the engine.
#[derive(Debug)]
enum Script {
    Pass {
        total: u64,
        delay: Duration,
    },
    Fail {
        total: u64,
        failed: u64,
    },
    PermanentError,
    /// Fails transiently until the given attempt number succeeds.
    TransientUntil {
        succeeds_on: u32,
        attempts: AtomicU32,
    },
    NeverReturns,
    Panics,
}

#[derive(Debug)]
struct Scripted(Script);

#[async_trait]
impl CheckExecutor for Scripted {
    async fn evaluate(&self, _ctx: &ExecutionContext) -> Result<CheckOutcome> {
        match &self.0 {
            Script::Pass { total, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(CheckOutcome::passed(*total))
            }
            Script::Fail { total, failed } => {
                Ok(CheckOutcome::evaluated(*total, *failed, Vec::new()))
            }
            Script::PermanentError => Err(GuardError::permanent_query("relation does not exist")),
            Script::TransientUntil {
                succeeds_on,
                attempts,
            } => {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < *succeeds_on {
                    Err(GuardError::transient_query("warehouse connection reset"))
                } else {
                    Ok(CheckOutcome::passed(7))
                }
            }
            Script::NeverReturns => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Script::Panics => panic!("executor bug"),
        }
    }
}

fn check(name: &str, script: Script) -> CheckDefinition {
    CheckDefinition::new(
        name,
        format!("{name} scripted check"),
        CheckCategory::Other,
        Arc::new(Scripted(script)),
    )
}

#[tokio::test]
async fn results_come_back_in_input_order_despite_completion_order() {
    init_tracing();
    // First check is slowest, so completion order is the reverse of input
    // order; the summary must not show that.
    let checks = vec![
        check(
            "slowest",
            Script::Pass {
                total: 1,
                delay: Duration::from_millis(80),
            },
        ),
        check(
            "middle",
            Script::Pass {
                total: 1,
                delay: Duration::from_millis(40),
            },
        ),
        check(
            "fastest",
            Script::Pass {
                total: 1,
                delay: Duration::ZERO,
            },
        ),
    ];
    let engine = ExecutionEngine::new(ExecutionPolicy::default().with_max_concurrency(3));
    let summary = engine.run(checks, context()).await;

    let names: Vec<&str> = summary.results.iter().map(|r| r.check_name.as_str()).collect();
    assert_eq!(names, ["slowest", "middle", "fastest"]);
    assert_eq!(summary.results.len(), 3);
}

#[tokio::test]
async fn mixed_statuses_aggregate_to_the_documented_scenario() {
    // checkA passes (10 tested), checkB fails 2 of 5, checkC raises a
    // permanent query error; concurrency 2.
    let checks = vec![
        check(
            "checkA",
            Script::Pass {
                total: 10,
                delay: Duration::ZERO,
            },
        ),
        check("checkB", Script::Fail { total: 5, failed: 2 }),
        check("checkC", Script::PermanentError),
    ];
    let engine = ExecutionEngine::new(ExecutionPolicy::default().with_max_concurrency(2));
    let summary = engine.run(checks, context()).await;

    assert_eq!(summary.counts.passed, 1);
    assert_eq!(summary.counts.failed, 1);
    assert_eq!(summary.counts.errored, 1);
    assert!((summary.success_rate - 1.0 / 3.0).abs() < 1e-9);

    let names: Vec<&str> = summary.results.iter().map(|r| r.check_name.as_str()).collect();
    assert_eq!(names, ["checkA", "checkB", "checkC"]);

    let b = &summary.results[1];
    assert_eq!(b.status, CheckStatus::Failed);
    assert_eq!(b.total_tested, 5);
    assert_eq!(b.failed_records, 2);

    let c = &summary.results[2];
    assert_eq!(c.status, CheckStatus::Error);
    assert_eq!(c.total_tested, 0);
    assert!(!c.error_message.as_deref().unwrap_or("").is_empty());
    assert!(!summary.all_passed());
}

#[tokio::test]
async fn hung_check_times_out_and_siblings_complete() {
    init_tracing();
    let checks = vec![
        check("hung", Script::NeverReturns),
        check(
            "healthy",
            Script::Pass {
                total: 3,
                delay: Duration::from_millis(10),
            },
        ),
    ];
    let engine = ExecutionEngine::new(
        ExecutionPolicy::default()
            .with_max_concurrency(2)
            .with_timeout(Duration::from_millis(100)),
    );
    let summary = engine.run(checks, context()).await;

    let hung = &summary.results[0];
    assert_eq!(hung.status, CheckStatus::Error);
    assert!(
        hung.error_message.as_deref().unwrap_or("").contains("timed out"),
        "unexpected message: {:?}",
        hung.error_message
    );

    let healthy = &summary.results[1];
    assert_eq!(healthy.status, CheckStatus::Passed);
    assert_eq!(healthy.total_tested, 3);
}

#[tokio::test]
async fn transient_failures_are_retried_within_budget() {
    let checks = vec![check(
        "flaky",
        Script::TransientUntil {
            succeeds_on: 3,
            attempts: AtomicU32::new(0),
        },
    )];
    let engine = ExecutionEngine::new(
        ExecutionPolicy::default()
            .with_retries(2, RetryBackoff::Fixed(Duration::from_millis(5))),
    );
    let summary = engine.run(checks, context()).await;

    assert_eq!(summary.results[0].status, CheckStatus::Passed);
    assert_eq!(summary.results[0].total_tested, 7);
}

#[tokio::test]
async fn transient_failures_beyond_budget_are_errors() {
    let checks = vec![check(
        "too_flaky",
        Script::TransientUntil {
            succeeds_on: 5,
            attempts: AtomicU32::new(0),
        },
    )];
    let engine = ExecutionEngine::new(
        ExecutionPolicy::default()
            .with_retries(1, RetryBackoff::Fixed(Duration::from_millis(1))),
    );
    let summary = engine.run(checks, context()).await;
    assert_eq!(summary.results[0].status, CheckStatus::Error);
}

#[tokio::test]
async fn permanent_failures_are_never_retried() {
    let attempts = Arc::new(AtomicU32::new(0));

    #[derive(Debug)]
    struct Counting(Arc<AtomicU32>);

    #[async_trait]
    impl CheckExecutor for Counting {
        async fn evaluate(&self, _ctx: &ExecutionContext) -> Result<CheckOutcome> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(GuardError::permanent_query("permission denied"))
        }
    }

    let checks = vec![CheckDefinition::new(
        "denied",
        "always denied",
        CheckCategory::Other,
        Arc::new(Counting(Arc::clone(&attempts))),
    )];
    let engine = ExecutionEngine::new(
        ExecutionPolicy::default()
            .with_retries(3, RetryBackoff::Fixed(Duration::from_millis(1))),
    );
    let summary = engine.run(checks, context()).await;

    assert_eq!(summary.results[0].status, CheckStatus::Error);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_panicking_executor_does_not_abort_the_run() {
    let checks = vec![
        check("exploding", Script::Panics),
        check(
            "survivor",
            Script::Pass {
                total: 2,
                delay: Duration::ZERO,
            },
        ),
    ];
    let engine = ExecutionEngine::new(ExecutionPolicy::default());
    let summary = engine.run(checks, context()).await;

    assert_eq!(summary.results[0].status, CheckStatus::Error);
    assert!(summary.results[0]
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("panicked"));
    assert_eq!(summary.results[1].status, CheckStatus::Passed);
}

#[tokio::test]
async fn rerunning_the_same_checks_is_idempotent_apart_from_timing() {
    let make = || {
        vec![
            check(
                "stable_pass",
                Script::Pass {
                    total: 11,
                    delay: Duration::ZERO,
                },
            ),
            check("stable_fail", Script::Fail { total: 4, failed: 1 }),
        ]
    };
    let engine = ExecutionEngine::new(ExecutionPolicy::default());
    let first = engine.run(make(), context()).await;
    let second = engine.run(make(), context()).await;

    for (a, b) in first.results.iter().zip(second.results.iter()) {
        assert_eq!(a.check_name, b.check_name);
        assert_eq!(a.status, b.status);
        assert_eq!(a.total_tested, b.total_tested);
        assert_eq!(a.failed_records, b.failed_records);
    }
}

#[tokio::test]
async fn progress_is_observable_through_a_shared_aggregator() {
    let checks = vec![
        check(
            "a",
            Script::Pass {
                total: 1,
                delay: Duration::from_millis(20),
            },
        ),
        check("b", Script::Fail { total: 2, failed: 1 }),
        check("c", Script::PermanentError),
    ];
    let aggregator = Arc::new(RunAggregator::new(checks.len()));
    let engine = ExecutionEngine::new(ExecutionPolicy::default());
    let summary = engine
        .run_observed(checks, context(), Arc::clone(&aggregator))
        .await;

    let progress = aggregator.snapshot();
    assert_eq!(progress.completed, 3);
    assert_eq!(progress.counts, summary.counts);
    assert_eq!(progress.success_rate, summary.success_rate);
}

#[tokio::test]
async fn an_empty_check_set_yields_an_empty_summary() {
    let engine = ExecutionEngine::new(ExecutionPolicy::default());
    let summary = engine.run(Vec::new(), context()).await;
    assert!(summary.results.is_empty());
    assert_eq!(summary.counts.total(), 0);
    assert_eq!(summary.success_rate, 0.0);
    assert!(summary.all_passed());
}
