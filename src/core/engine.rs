//! The bounded-concurrency check execution engine.
//!
//! Given an ordered sequence of check definitions, a shared
//! [`ExecutionContext`] and an [`ExecutionPolicy`], the engine fans the
//! checks out across a bounded worker pool, enforces a per-check timeout,
//! retries transient query failures, and converts every per-check failure
//! mode (query error, timeout, panic) into an error result rather than a
//! run abort. The only failure that stops a run outright is failing to build
//! the context in the first place.
//!
//! Checks complete in arbitrary order, but the returned [`RunSummary`] is
//! always in input order: concurrency is never observable in output
//! ordering.

use crate::core::aggregator::RunAggregator;
use crate::core::check::{CheckDefinition, CheckOutcome};
use crate::core::context::ExecutionContext;
use crate::core::result::{CheckResult, ResultTiming, RunSummary};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, instrument, warn};

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryBackoff {
    /// The same delay before every attempt.
    Fixed(Duration),
    /// `initial * multiplier^(attempt - 1)` before the `attempt`-th retry.
    Exponential {
        /// Delay before the first retry
        initial: Duration,
        /// Growth factor per further retry
        multiplier: f64,
    },
}

impl RetryBackoff {
    /// The delay to sleep before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            RetryBackoff::Fixed(d) => d,
            RetryBackoff::Exponential {
                initial,
                multiplier,
            } => initial.mul_f64(multiplier.powi(attempt.saturating_sub(1) as i32)),
        }
    }
}

/// Concurrency, timeout and retry policy for one engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPolicy {
    /// Upper bound on concurrently executing checks. The effective pool is
    /// `min(max_concurrency, number of checks)`, never below 1.
    pub max_concurrency: usize,
    /// Hard ceiling on one attempt of one check. On expiry the in-flight
    /// future is dropped and the check is recorded as an error with a
    /// timeout message. If the warehouse session cannot cancel server-side,
    /// the remote query may keep running after the engine detaches; the
    /// check is still reported as an error, never a silent success.
    pub per_check_timeout: Duration,
    /// Number of retries after a transiently-classified query failure.
    /// Permanent failures and timeouts are never retried.
    pub max_retries: u32,
    /// Delay schedule between retry attempts.
    pub retry_backoff: RetryBackoff,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            // Matches the long-standing per-check budget for warehouse
            // validation queries.
            per_check_timeout: Duration::from_secs(300),
            max_retries: 0,
            retry_backoff: RetryBackoff::Fixed(Duration::from_secs(1)),
        }
    }
}

impl ExecutionPolicy {
    /// Sets the concurrency bound.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sets the per-check timeout.
    pub fn with_timeout(mut self, per_check_timeout: Duration) -> Self {
        self.per_check_timeout = per_check_timeout;
        self
    }

    /// Sets the retry budget and backoff.
    pub fn with_retries(mut self, max_retries: u32, retry_backoff: RetryBackoff) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = retry_backoff;
        self
    }
}

/// Runs sets of checks under a policy.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    policy: ExecutionPolicy,
}

impl ExecutionEngine {
    /// Creates an engine with the given policy.
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self { policy }
    }

    /// The engine's policy.
    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Executes the checks and returns their aggregated summary.
    ///
    /// One result is produced per input check, in input order. Per-check
    /// failures never abort the run; building the context (done by the
    /// caller, before this point) is the only fatal precondition.
    pub async fn run(
        &self,
        checks: Vec<CheckDefinition>,
        ctx: Arc<ExecutionContext>,
    ) -> RunSummary {
        let aggregator = Arc::new(RunAggregator::new(checks.len()));
        self.run_observed(checks, ctx, aggregator).await
    }

    /// Like [`run`](ExecutionEngine::run), but folds completions into a
    /// caller-supplied aggregator so progress can be observed (via
    /// [`RunAggregator::snapshot`]) while the run is still going.
    #[instrument(
        skip(self, checks, ctx, aggregator),
        fields(run.id = %ctx.run_id(), run.checks = checks.len())
    )]
    pub async fn run_observed(
        &self,
        checks: Vec<CheckDefinition>,
        ctx: Arc<ExecutionContext>,
        aggregator: Arc<RunAggregator>,
    ) -> RunSummary {
        let started_at = Utc::now();
        let run_start = Instant::now();
        let total = checks.len();

        let workers = self.policy.max_concurrency.min(total).max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        debug!(run.workers = workers, "starting validation run");

        let mut tasks: JoinSet<(usize, CheckResult)> = JoinSet::new();
        for (index, check) in checks.iter().cloned().enumerate() {
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            let aggregator = Arc::clone(&aggregator);
            let policy = self.policy.clone();
            tasks.spawn(async move {
                // The semaphore is never closed, so acquisition cannot fail.
                let _permit = semaphore.acquire_owned().await;
                let result = execute_check(&check, &ctx, &policy).await;
                aggregator.record(&result);
                (index, result)
            });
        }

        let mut slots: Vec<Option<CheckResult>> = std::iter::repeat_with(|| None)
            .take(total)
            .collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                // Panics are caught inside the task; reaching this arm means
                // the task was aborted or the runtime is shutting down. The
                // missing slot is backfilled below.
                Err(join_err) => error!(error = %join_err, "check worker terminated abnormally"),
            }
        }

        let results: Vec<CheckResult> = slots
            .into_iter()
            .zip(checks.iter())
            .map(|(slot, check)| {
                slot.unwrap_or_else(|| {
                    CheckResult::error(
                        check,
                        "check worker terminated before producing a result",
                        ResultTiming::immediate(),
                    )
                })
            })
            .collect();

        let summary = RunAggregator::summarize(
            ctx.run_id(),
            results,
            started_at,
            run_start.elapsed(),
        );
        debug!(
            run.passed = summary.counts.passed,
            run.failed = summary.counts.failed,
            run.errored = summary.counts.errored,
            run.skipped = summary.counts.skipped,
            run.duration_ms = summary.total_duration.as_millis() as u64,
            "validation run complete"
        );
        summary
    }
}

/// Executes one check under the policy, absorbing every per-check failure
/// mode into a result.
async fn execute_check(
    check: &CheckDefinition,
    ctx: &ExecutionContext,
    policy: &ExecutionPolicy,
) -> CheckResult {
    let started_at = Utc::now();
    let start = Instant::now();
    ctx.query_log().record_started(check.name());
    debug!(check.name = %check.name(), check.category = check.category().as_str(), "check started");

    let result = run_attempts(check, ctx, policy, started_at, start).await;

    ctx.query_log().record_completed(
        check.name(),
        result.status,
        result.duration.as_millis() as u64,
    );
    match &result.error_message {
        Some(message) => warn!(
            check.name = %check.name(),
            check.status = result.status.as_str(),
            error = %message,
            "check did not complete"
        ),
        None => debug!(
            check.name = %check.name(),
            check.status = result.status.as_str(),
            check.total_tested = result.total_tested,
            check.failed_records = result.failed_records,
            "check completed"
        ),
    }
    result
}

async fn run_attempts(
    check: &CheckDefinition,
    ctx: &ExecutionContext,
    policy: &ExecutionPolicy,
    started_at: chrono::DateTime<Utc>,
    start: Instant,
) -> CheckResult {
    let timing = |start: Instant| ResultTiming {
        started_at,
        duration: start.elapsed(),
    };

    let mut attempt: u32 = 0;
    loop {
        let evaluation = AssertUnwindSafe(check.executor().evaluate(ctx)).catch_unwind();
        match timeout(policy.per_check_timeout, evaluation).await {
            Ok(Ok(Ok(CheckOutcome::Evaluated {
                total_tested,
                failed_records,
                sample_failures,
            }))) => {
                return CheckResult::evaluated(
                    check,
                    total_tested,
                    failed_records,
                    sample_failures,
                    timing(start),
                );
            }
            Ok(Ok(Ok(CheckOutcome::Skipped { reason }))) => {
                return CheckResult::skipped(check, reason, timing(start));
            }
            Ok(Ok(Err(err))) => {
                if err.is_transient() && attempt < policy.max_retries {
                    attempt += 1;
                    let delay = policy.retry_backoff.delay(attempt);
                    warn!(
                        check.name = %check.name(),
                        retry.attempt = attempt,
                        retry.max = policy.max_retries,
                        retry.delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient query failure, retrying"
                    );
                    sleep(delay).await;
                    continue;
                }
                return CheckResult::error(check, err.to_string(), timing(start));
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                return CheckResult::error(
                    check,
                    format!("check panicked: {message}"),
                    timing(start),
                );
            }
            Err(_elapsed) => {
                // The evaluation future has been dropped; the warehouse may
                // or may not have cancelled the remote query.
                let seconds = policy.per_check_timeout.as_secs_f64();
                return CheckResult::error(
                    check,
                    crate::error::GuardError::Timeout { seconds }.to_string(),
                    timing(start),
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("opaque panic payload")
    }
}
