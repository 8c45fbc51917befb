//! # cohort-guard: Data Quality Validation for Relational Cohort Datasets
//!
//! cohort-guard runs a catalogue of declarative data-quality checks
//! (NULL/emptiness detection, referential-integrity joins, terminology
//! mapping-chain validation, and business-rule predicates) against a remote
//! analytical warehouse, and reports pass/fail/error status with counts and
//! timing.
//!
//! The crate is the *execution engine* of a validation framework: it takes a
//! set of declared checks, resolves them against live data, runs them with
//! bounded concurrency, enforces per-check timeout and retry policy, and
//! aggregates heterogeneous results into a uniform, ordered report. CLI
//! parsing, YAML loading, terminal rendering, and the concrete warehouse
//! driver are collaborators, not residents.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cohort_guard::prelude::*;
//! use cohort_guard::checks::{NullRateCheck, RelationshipCheck};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn example(provider: &dyn cohort_guard::source::ConnectionProvider)
//! #     -> cohort_guard::Result<()> {
//! // Register checks once, at startup.
//! let mut registry = CheckRegistry::new();
//! registry.register(CheckDefinition::new(
//!     "patient_nhs_number",
//!     "Every patient row carries an NHS number hash",
//!     CheckCategory::DataQuality,
//!     Arc::new(NullRateCheck::new("PATIENT", "nhs_number_hash")),
//! ))?;
//! registry.register(CheckDefinition::new(
//!     "encounter_patient_fk",
//!     "Encounters reference an existing patient",
//!     CheckCategory::ReferentialIntegrity,
//!     Arc::new(RelationshipCheck::new("ENCOUNTER", "patient_id", "PATIENT", "id")),
//! ))?;
//!
//! // Connect once per run; the context is shared read-only by all workers.
//! let run_id = generate_run_id();
//! let query_log = Arc::new(QueryLog::create("sql_logs", &run_id)?);
//! let ctx = ExecutionContext::connect(
//!     provider,
//!     "dev",
//!     HashMap::from([("source".into(), "COHORT_DB".into())]),
//!     HashMap::from([("masked".into(), "MASKED".into())]),
//!     query_log,
//! ).await?;
//!
//! // Run with bounded concurrency; results come back in input order.
//! let engine = ExecutionEngine::new(ExecutionPolicy::default());
//! let summary = engine.run(registry.all(), ctx).await;
//! println!("{}/{} passed", summary.counts.passed, summary.counts.total());
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - **Failure isolation**: one check's query error, timeout, or panic
//!   becomes that check's error result and never aborts siblings or the
//!   run. Only a refused connection is fatal.
//! - **Deterministic ordering**: results are reordered to the input
//!   sequence before the summary is returned; concurrency is never
//!   observable in output ordering.
//! - **Failing data is not an error**: a check that finds violating rows is
//!   `Failed` with counts and capped samples; `Error` is reserved for
//!   checks that could not run.
//! - **Auditability**: every executed query is appended to a run-scoped
//!   JSON-lines log, best effort, off the critical path.

pub mod checks;
pub mod core;
pub mod error;
pub mod prelude;
pub mod query_log;
pub mod source;

pub use error::{GuardError, QueryClass, Result};
