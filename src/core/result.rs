//! Per-check results and the run-level summary.
//!
//! A [`CheckResult`] is produced exactly once per executed check, whether the
//! executor returned counts, raised an error, or was skipped. Failing data is
//! a first-class outcome, not an exceptional one: a check that finds
//! violating rows reports [`CheckStatus::Failed`] with counts, while only
//! infrastructure problems (query errors, timeouts, panics) report
//! [`CheckStatus::Error`].

use crate::core::check::{CheckCategory, CheckDefinition, SampleFailure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The terminal status of one check execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// The check ran and found no violating rows
    Passed,
    /// The check ran and found violating rows
    Failed,
    /// The check could not run to completion
    Error,
    /// The check was not applicable to this environment
    Skipped,
}

impl CheckStatus {
    /// The lowercase label used in reports and log records.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::Error => "error",
            CheckStatus::Skipped => "skipped",
        }
    }
}

/// The immutable result of executing one check.
///
/// Created by the execution engine when a check's executor returns or fails;
/// consumed by the aggregator and the report exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check this result belongs to
    pub check_name: String,
    /// The check's human-readable description
    pub description: String,
    /// The check's category
    pub category: CheckCategory,
    /// Terminal status
    pub status: CheckStatus,
    /// Rows examined; zero for error and skipped results
    pub total_tested: u64,
    /// Rows violating the rule; only meaningful when status is `Failed`
    pub failed_records: u64,
    /// Up to a fixed cap of example violating rows
    pub sample_failures: Vec<SampleFailure>,
    /// Wall-clock execution time, spanning all retry attempts
    pub duration: Duration,
    /// Present exactly when status is `Error`
    pub error_message: Option<String>,
    /// Skip reason, present exactly when status is `Skipped`
    pub skip_reason: Option<String>,
    /// When execution of this check began
    pub started_at: DateTime<Utc>,
    /// When the result was produced
    pub completed_at: DateTime<Utc>,
}

/// Timing fields shared by every result constructor.
#[derive(Debug, Clone, Copy)]
pub struct ResultTiming {
    /// When execution began
    pub started_at: DateTime<Utc>,
    /// Wall-clock span including retries
    pub duration: Duration,
}

impl ResultTiming {
    /// Captures a timing that starts now, for results produced without
    /// running anything (setup rejections, tests).
    pub fn immediate() -> Self {
        Self {
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }
}

impl CheckResult {
    /// A result for a check that ran and produced counts.
    ///
    /// `failed_records == 0` yields `Passed`, anything else `Failed`;
    /// `failed_records` is clamped to `total_tested` so the
    /// `failed ≤ total` invariant holds even against a miscounting query.
    pub fn evaluated(
        check: &CheckDefinition,
        total_tested: u64,
        failed_records: u64,
        sample_failures: Vec<SampleFailure>,
        timing: ResultTiming,
    ) -> Self {
        let failed_records = failed_records.min(total_tested);
        let status = if failed_records == 0 {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed
        };
        Self {
            check_name: check.name().to_string(),
            description: check.description().to_string(),
            category: check.category(),
            status,
            total_tested,
            failed_records,
            sample_failures: if status == CheckStatus::Passed {
                Vec::new()
            } else {
                sample_failures
            },
            duration: timing.duration,
            error_message: None,
            skip_reason: None,
            started_at: timing.started_at,
            completed_at: Utc::now(),
        }
    }

    /// A result for a check that could not run to completion.
    ///
    /// Counts are undefined for errors and reported as zero; the message is
    /// never empty.
    pub fn error(check: &CheckDefinition, message: impl Into<String>, timing: ResultTiming) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            String::from("check failed with no error message")
        } else {
            message
        };
        Self {
            check_name: check.name().to_string(),
            description: check.description().to_string(),
            category: check.category(),
            status: CheckStatus::Error,
            total_tested: 0,
            failed_records: 0,
            sample_failures: Vec::new(),
            duration: timing.duration,
            error_message: Some(message),
            skip_reason: None,
            started_at: timing.started_at,
            completed_at: Utc::now(),
        }
    }

    /// A result for a check that was not applicable.
    pub fn skipped(
        check: &CheckDefinition,
        reason: impl Into<String>,
        timing: ResultTiming,
    ) -> Self {
        Self {
            check_name: check.name().to_string(),
            description: check.description().to_string(),
            category: check.category(),
            status: CheckStatus::Skipped,
            total_tested: 0,
            failed_records: 0,
            sample_failures: Vec::new(),
            duration: timing.duration,
            error_message: None,
            skip_reason: Some(reason.into()),
            started_at: timing.started_at,
            completed_at: Utc::now(),
        }
    }

    /// Per-check success rate as a percentage of examined rows.
    pub fn success_rate(&self) -> f64 {
        if self.total_tested == 0 {
            return 0.0;
        }
        (self.total_tested - self.failed_records) as f64 / self.total_tested as f64 * 100.0
    }

    /// Returns true if the check passed.
    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

/// Per-status counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Checks that passed
    pub passed: usize,
    /// Checks that found violating rows
    pub failed: usize,
    /// Checks that could not run
    pub errored: usize,
    /// Checks that were not applicable
    pub skipped: usize,
}

impl StatusCounts {
    /// Adds one result's status to the counts.
    pub fn record(&mut self, status: CheckStatus) {
        match status {
            CheckStatus::Passed => self.passed += 1,
            CheckStatus::Failed => self.failed += 1,
            CheckStatus::Error => self.errored += 1,
            CheckStatus::Skipped => self.skipped += 1,
        }
    }

    /// Total results counted.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored + self.skipped
    }

    /// Success rate over checks that actually ran: passed divided by
    /// passed + failed + errored, and 0.0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        let denominator = self.passed + self.failed + self.errored;
        if denominator == 0 {
            return 0.0;
        }
        self.passed as f64 / denominator as f64
    }
}

/// The aggregated outcome of one engine invocation.
///
/// Result order always matches the input check order, regardless of the
/// interleaving in which checks actually completed. The summary is a plain
/// serializable value; the report exporter renders it without reaching back
/// into the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Identifier shared by this run's results and query-log records
    pub run_id: String,
    /// One result per input check, in input order
    pub results: Vec<CheckResult>,
    /// Per-status counts over `results`
    pub counts: StatusCounts,
    /// Passed / (passed + failed + errored), 0.0 for an empty run
    pub success_rate: f64,
    /// When the run began
    pub started_at: DateTime<Utc>,
    /// Wall-clock span of the whole run, not the sum of check durations
    pub total_duration: Duration,
}

impl RunSummary {
    /// Returns true when every check passed (skipped checks do not count
    /// against a run).
    pub fn all_passed(&self) -> bool {
        self.counts.failed == 0 && self.counts.errored == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::check::{CheckCategory, CheckDefinition, CheckOutcome};
    use crate::core::context::ExecutionContext;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Debug)]
    struct NoopExecutor;

    #[async_trait]
    impl crate::core::check::CheckExecutor for NoopExecutor {
        async fn evaluate(&self, _ctx: &ExecutionContext) -> Result<CheckOutcome> {
            Ok(CheckOutcome::passed(0))
        }
    }

    fn definition() -> CheckDefinition {
        CheckDefinition::new(
            "patient_rows",
            "Patient table sanity",
            CheckCategory::DataQuality,
            Arc::new(NoopExecutor),
        )
    }

    #[test]
    fn zero_failures_is_passed() {
        let result = CheckResult::evaluated(&definition(), 10, 0, Vec::new(), ResultTiming::immediate());
        assert_eq!(result.status, CheckStatus::Passed);
        assert_eq!(result.failed_records, 0);
        assert!(result.sample_failures.is_empty());
        assert!(result.error_message.is_none());
    }

    #[test]
    fn failed_records_clamped_to_total() {
        let result = CheckResult::evaluated(&definition(), 5, 9, Vec::new(), ResultTiming::immediate());
        assert_eq!(result.status, CheckStatus::Failed);
        assert!(result.failed_records <= result.total_tested);
    }

    #[test]
    fn error_results_always_carry_a_message() {
        let result = CheckResult::error(&definition(), "", ResultTiming::immediate());
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.total_tested, 0);
        assert!(!result.error_message.as_deref().unwrap_or("").is_empty());
    }

    #[test]
    fn success_rate_excludes_skips_and_handles_empty() {
        let mut counts = StatusCounts::default();
        assert_eq!(counts.success_rate(), 0.0);
        counts.record(CheckStatus::Passed);
        counts.record(CheckStatus::Failed);
        counts.record(CheckStatus::Error);
        counts.record(CheckStatus::Skipped);
        assert_eq!(counts.total(), 4);
        assert!((counts.success_rate() - 1.0 / 3.0).abs() < f64::EPSILON);
    }
}
