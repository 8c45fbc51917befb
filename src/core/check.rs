//! Check definitions and the executor capability.

use crate::core::context::ExecutionContext;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Maximum number of example violating rows carried in any outcome.
///
/// Samples exist to make a failure diagnosable from the report alone; beyond
/// a couple of dozen rows they only inflate memory and log size.
pub const SAMPLE_FAILURE_CAP: usize = 25;

/// The closed set of check categories.
///
/// Categories drive suite grouping and report sectioning; they are not an
/// extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    /// NULL/emptiness and completeness rules
    DataQuality,
    /// Foreign-key relationship validation
    ReferentialIntegrity,
    /// Terminology chain traversal (source id → map → concept)
    ConceptMapping,
    /// Demographic/person-level pattern rules
    PersonPatterns,
    /// Anything that does not fit the above
    Other,
}

impl CheckCategory {
    /// The snake_case label used in reports and log records.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCategory::DataQuality => "data_quality",
            CheckCategory::ReferentialIntegrity => "referential_integrity",
            CheckCategory::ConceptMapping => "concept_mapping",
            CheckCategory::PersonPatterns => "person_patterns",
            CheckCategory::Other => "other",
        }
    }
}

/// One example violating row, capped in number per outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFailure {
    /// Identifier of the offending record (natural key or mapping id)
    pub record: String,
    /// What is wrong with it; for chain checks this names the hop that broke
    pub detail: String,
}

impl SampleFailure {
    /// Creates a sample failure entry.
    pub fn new(record: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            record: record.into(),
            detail: detail.into(),
        }
    }
}

/// What an executor observed when it ran.
///
/// Executors report raw counts; the engine derives the pass/fail status from
/// them. A check that could not run meaningfully (for example a relationship
/// whose columns do not exist in the target schema) reports `Skipped` rather
/// than failing or erroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check ran and examined data.
    Evaluated {
        /// Rows examined by the rule
        total_tested: u64,
        /// Rows violating the rule
        failed_records: u64,
        /// Up to [`SAMPLE_FAILURE_CAP`] example violations
        sample_failures: Vec<SampleFailure>,
    },
    /// The check could not be applied to this environment.
    Skipped {
        /// Why the check was skipped
        reason: String,
    },
}

impl CheckOutcome {
    /// An outcome with zero failures.
    pub fn passed(total_tested: u64) -> Self {
        CheckOutcome::Evaluated {
            total_tested,
            failed_records: 0,
            sample_failures: Vec::new(),
        }
    }

    /// An evaluated outcome; samples are truncated to the cap.
    pub fn evaluated(
        total_tested: u64,
        failed_records: u64,
        mut sample_failures: Vec<SampleFailure>,
    ) -> Self {
        sample_failures.truncate(SAMPLE_FAILURE_CAP);
        CheckOutcome::Evaluated {
            total_tested,
            failed_records,
            sample_failures,
        }
    }

    /// A skipped outcome with the given reason.
    pub fn skipped(reason: impl Into<String>) -> Self {
        CheckOutcome::Skipped {
            reason: reason.into(),
        }
    }
}

/// The capability that evaluates one check.
///
/// All check shapes, from row-count rules to join-based existence rules and
/// free-form SQL predicates, implement this one trait.
/// Implementations must be stateless: the same executor value may be
/// evaluated concurrently against the same shared context, and is only
/// handed a read-only view of it.
#[async_trait]
pub trait CheckExecutor: Debug + Send + Sync {
    /// Runs the check against the shared execution context.
    ///
    /// # Errors
    ///
    /// Any error returned here is scoped to this check: the engine converts
    /// it to an error result and sibling checks are unaffected.
    async fn evaluate(&self, ctx: &ExecutionContext) -> Result<CheckOutcome>;
}

/// An immutable declarative record describing one validation.
///
/// Definitions are created at registry-build time and never mutated; the
/// `name` is the sole key for lookup and deduplication.
#[derive(Debug, Clone)]
pub struct CheckDefinition {
    name: String,
    description: String,
    category: CheckCategory,
    executor: Arc<dyn CheckExecutor>,
}

impl CheckDefinition {
    /// Creates a definition from its parts.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: CheckCategory,
        executor: Arc<dyn CheckExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            executor,
        }
    }

    /// The unique check name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable explanation of what the check validates.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The category this check reports under.
    pub fn category(&self) -> CheckCategory {
        self.category
    }

    /// The executor capability for this check.
    pub fn executor(&self) -> &Arc<dyn CheckExecutor> {
        &self.executor
    }
}
