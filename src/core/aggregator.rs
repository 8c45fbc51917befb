//! Run-level aggregation of check results.

use crate::core::result::{CheckResult, RunSummary, StatusCounts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// A point-in-time view of a run in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    /// Number of checks the run was asked to execute
    pub total: usize,
    /// Checks that have produced a result so far
    pub completed: usize,
    /// Per-status counts over completed checks
    pub counts: StatusCounts,
    /// Passed / (passed + failed + errored) so far, 0.0 before anything ran
    pub success_rate: f64,
}

/// Folds results into running counts as workers complete.
///
/// The aggregator is the one piece of mutable run-level state shared across
/// workers; counters live behind a lock and recording takes arrival order,
/// not input order. A caller driving a progress display can [`snapshot`]
/// at any time without disturbing the results already handed out.
///
/// [`snapshot`]: RunAggregator::snapshot
#[derive(Debug)]
pub struct RunAggregator {
    total: usize,
    counts: Mutex<StatusCounts>,
}

impl RunAggregator {
    /// Creates an aggregator expecting `total` results.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            counts: Mutex::new(StatusCounts::default()),
        }
    }

    /// Records one completed result.
    pub fn record(&self, result: &CheckResult) {
        let mut counts = match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        counts.record(result.status);
    }

    /// Observes current progress without mutating anything.
    pub fn snapshot(&self) -> RunProgress {
        let counts = match self.counts.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        RunProgress {
            total: self.total,
            completed: counts.total(),
            counts,
            success_rate: counts.success_rate(),
        }
    }

    /// Folds a completed, already-ordered result sequence into the final
    /// summary.
    ///
    /// Counts are recomputed from the sequence itself so the summary is
    /// internally consistent even if a caller never routed results through
    /// [`record`](RunAggregator::record).
    pub fn summarize(
        run_id: impl Into<String>,
        results: Vec<CheckResult>,
        started_at: DateTime<Utc>,
        total_duration: Duration,
    ) -> RunSummary {
        let mut counts = StatusCounts::default();
        for result in &results {
            counts.record(result.status);
        }
        RunSummary {
            run_id: run_id.into(),
            results,
            success_rate: counts.success_rate(),
            counts,
            started_at,
            total_duration,
        }
    }
}
