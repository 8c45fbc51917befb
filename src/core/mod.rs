//! Core validation types: definitions, registry, engine, results.
//!
//! ## Architecture
//!
//! ```text
//! CheckRegistry ──resolve──▶ [CheckDefinition]
//!                                  │
//!                                  ▼
//!                          ExecutionEngine ──▶ bounded worker pool
//!                                  │                 │
//!                                  │        ExecutionContext (shared, read-only)
//!                                  │                 │
//!                                  ▼                 ▼
//!                            [CheckResult]      QueryLog (audit side channel)
//!                                  │
//!                                  ▼
//!                            RunAggregator ──▶ RunSummary
//! ```
//!
//! Data flows from the registry's selected definitions through the engine's
//! fan-out and back into an input-ordered summary; the query log taps the
//! engine's per-check events off the critical path.

mod aggregator;
mod check;
mod context;
mod engine;
mod registry;
mod result;

pub use aggregator::{RunAggregator, RunProgress};
pub use check::{
    CheckCategory, CheckDefinition, CheckExecutor, CheckOutcome, SampleFailure,
    SAMPLE_FAILURE_CAP,
};
pub use context::{generate_run_id, ExecutionContext};
pub use engine::{ExecutionEngine, ExecutionPolicy, RetryBackoff};
pub use registry::{CheckRegistry, Suite};
pub use result::{CheckResult, CheckStatus, ResultTiming, RunSummary, StatusCounts};
