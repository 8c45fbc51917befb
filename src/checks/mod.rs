//! Built-in check executor variants.
//!
//! Each variant implements [`CheckExecutor`](crate::core::CheckExecutor) for
//! one check shape:
//!
//! - [`NullRateCheck`]: NULL/emptiness detection on a single column
//! - [`SqlPredicateCheck`]: free-form read-only SQL business rules
//! - [`RelationshipCheck`]: foreign-key orphan detection, composite keys
//!   supported
//! - [`ConceptMappingCheck`]: terminology chain traversal through a mapping
//!   table to a terminal concept table
//!
//! All variants build their SQL against the run's
//! [`ExecutionContext`](crate::core::ExecutionContext), execute through its
//! query handle, and report raw counts; pass/fail status is derived by the
//! engine.

mod completeness;
mod concept_map;
mod predicate;
mod referential;

pub use completeness::NullRateCheck;
pub use concept_map::ConceptMappingCheck;
pub use predicate::SqlPredicateCheck;
pub use referential::RelationshipCheck;

/// Quotes a single SQL identifier.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{ident}\"")
}
