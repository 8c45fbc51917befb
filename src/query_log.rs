//! Append-only audit log of executed validation queries.
//!
//! Every query the engine runs on behalf of a check is recorded here, along
//! with per-check start and completion events, so a run can be reviewed and
//! replayed query by query. The sink is one JSON-lines file per run, named by
//! the run id.
//!
//! The log is a side channel, never on the critical path: a write failure is
//! reported once as a process-level warning and then swallowed. Recording
//! must never fail, block, or delay a check.

use crate::core::CheckStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// Which point of a check's lifecycle an event records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum QueryPhase {
    /// The engine handed the check to a worker
    Started,
    /// One SQL statement was sent to the warehouse
    Query,
    /// The check produced its result
    Completed {
        /// Terminal status of the check
        status: CheckStatus,
        /// Wall-clock execution time in milliseconds, including retries
        duration_ms: u64,
    },
}

/// One record in the query log.
///
/// Sequence numbers order events by arrival within a run; no global ordering
/// across concurrently executing checks is implied beyond that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEvent {
    /// Run this event belongs to
    pub run_id: String,
    /// Arrival order within the run, starting at 1
    pub sequence: u64,
    /// Check that triggered the event
    pub check_name: String,
    /// Short machine-friendly label for what the query does
    pub purpose: String,
    /// The exact SQL sent, present on `Query` events
    pub query: Option<String>,
    /// Lifecycle point
    #[serde(flatten)]
    pub phase: QueryPhase,
    /// When the event was recorded
    pub recorded_at: DateTime<Utc>,
}

/// The run-scoped query log sink.
///
/// Cheap to share (`Arc`) and safe for concurrent appends; writes are
/// serialized by an internal lock, events ordered by arrival.
#[derive(Debug)]
pub struct QueryLog {
    run_id: String,
    sink: Option<Mutex<File>>,
    path: Option<PathBuf>,
    sequence: AtomicU64,
    write_failed: AtomicBool,
}

impl QueryLog {
    /// Opens a log file for the given run under `dir`, creating the
    /// directory if needed. The file is `<run_id>.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory or file cannot be created.
    /// Failing to *open* the sink is a setup problem; failing to *write* to
    /// it later is not.
    pub fn create(dir: impl AsRef<Path>, run_id: impl Into<String>) -> crate::error::Result<Self> {
        let run_id = run_id.into();
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{run_id}.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            run_id,
            sink: Some(Mutex::new(file)),
            path: Some(path),
            sequence: AtomicU64::new(0),
            write_failed: AtomicBool::new(false),
        })
    }

    /// A log that records nothing. Used when auditing is not wanted and by
    /// tests that do not care about the sink.
    pub fn disabled(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            sink: None,
            path: None,
            sequence: AtomicU64::new(0),
            write_failed: AtomicBool::new(false),
        }
    }

    /// The run id this log is keyed by.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Path of the sink file, if the log is enabled.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of events recorded so far.
    pub fn recorded(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Records a check-started event.
    pub fn record_started(&self, check_name: &str) {
        self.record(check_name, "execution", None, QueryPhase::Started);
    }

    /// Records one executed SQL statement.
    pub fn record_query(&self, check_name: &str, purpose: &str, sql: &str) {
        self.record(check_name, purpose, Some(sql.to_string()), QueryPhase::Query);
    }

    /// Records a check-completed event with its terminal status.
    pub fn record_completed(&self, check_name: &str, status: CheckStatus, duration_ms: u64) {
        self.record(
            check_name,
            "execution",
            None,
            QueryPhase::Completed {
                status,
                duration_ms,
            },
        );
    }

    fn record(&self, check_name: &str, purpose: &str, query: Option<String>, phase: QueryPhase) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let Some(sink) = &self.sink else {
            return;
        };
        let event = QueryEvent {
            run_id: self.run_id.clone(),
            sequence,
            check_name: check_name.to_string(),
            purpose: purpose.to_string(),
            query,
            phase,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.append(sink, &event) {
            // Warn once per run; the sink stays best-effort after that.
            if !self.write_failed.swap(true, Ordering::Relaxed) {
                warn!(
                    log.path = ?self.path,
                    error = %e,
                    "query log write failed; further events for this run will be dropped silently"
                );
            }
        }
    }

    fn append(&self, sink: &Mutex<File>, event: &QueryEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = match sink.lock() {
            Ok(guard) => guard,
            // A poisoned lock means a writer panicked mid-append; the file
            // is still usable for whole-line appends.
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_log_counts_but_writes_nothing() {
        let log = QueryLog::disabled("run-test");
        log.record_started("checkA");
        log.record_query("checkA", "violations", "SELECT 1");
        assert_eq!(log.recorded(), 2);
        assert!(log.path().is_none());
    }

    #[test]
    fn events_append_as_json_lines_keyed_by_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let log = QueryLog::create(dir.path(), "run-20260101T000000000Z").unwrap();
        log.record_started("checkA");
        log.record_query("checkA", "violations", "SELECT COUNT(*) FROM t");
        log.record_completed("checkA", CheckStatus::Passed, 42);

        let contents = std::fs::read_to_string(log.path().unwrap()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: QueryEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.run_id, "run-20260101T000000000Z");
        assert_eq!(first.sequence, 1);
        assert_eq!(first.phase, QueryPhase::Started);

        let second: QueryEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.query.as_deref(), Some("SELECT COUNT(*) FROM t"));

        let third: QueryEvent = serde_json::from_str(lines[2]).unwrap();
        match third.phase {
            QueryPhase::Completed {
                status,
                duration_ms,
            } => {
                assert_eq!(status, CheckStatus::Passed);
                assert_eq!(duration_ms, 42);
            }
            other => panic!("expected completed event, got {other:?}"),
        }
    }
}
