//! Prelude for commonly used types and traits in cohort-guard.

pub use crate::core::{
    generate_run_id, CheckCategory, CheckDefinition, CheckExecutor, CheckOutcome, CheckRegistry,
    CheckResult, CheckStatus, ExecutionContext, ExecutionEngine, ExecutionPolicy, RetryBackoff,
    RunAggregator, RunProgress, RunSummary, Suite,
};
pub use crate::error::{GuardError, QueryClass, Result};
pub use crate::query_log::{QueryEvent, QueryLog};
pub use crate::source::{ConnectionProvider, QueryHandle, QueryOutput};
