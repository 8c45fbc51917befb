//! The query-execution seam between the validation engine and the remote
//! warehouse.
//!
//! The engine never speaks a wire protocol itself. It is written against two
//! narrow capabilities: a [`ConnectionProvider`] that can hand out a session
//! for a logical environment, and a [`QueryHandle`] that can execute read-only
//! SQL and return a small tabular result. Concrete drivers (Snowflake,
//! DuckDB, an in-memory double in tests) live outside this crate.
//!
//! A [`QueryHandle`] must be safe for concurrent queries from multiple
//! workers; implementations that wrap a connection without that property
//! should pool internally.

use crate::error::{GuardError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Supplies ready-to-use query sessions per logical environment.
///
/// Owns credential and session lifecycle. Acquisition failure is the one
/// fatal precondition of a validation run: if no handle can be established,
/// the run aborts before any check executes.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Establishes (or checks out) a session for the named environment.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Connection`] if no usable session can be
    /// established.
    async fn acquire(&self, environment: &str) -> Result<Arc<dyn QueryHandle>>;
}

/// An established session capable of executing read-only SQL.
///
/// Implementations must be thread-safe for concurrent queries; the execution
/// engine shares a single handle read-only across all workers.
#[async_trait]
pub trait QueryHandle: Debug + Send + Sync {
    /// Executes the given SQL text and returns its tabular result.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Query`] with a transient/permanent
    /// classification; the engine's retry policy inspects that
    /// classification.
    async fn execute(&self, sql: &str) -> Result<QueryOutput>;
}

/// A small, fully materialized tabular query result.
///
/// Validation queries are aggregates or capped samples, so results are tiny
/// by construction; nothing here streams. Cells are JSON values so the seam
/// stays independent of any driver's native type system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOutput {
    /// Column names, in select order.
    pub columns: Vec<String>,
    /// Row-major cell values.
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    /// Creates an output from column names and rows.
    pub fn new<C, S>(columns: C, rows: Vec<Vec<Value>>) -> Self
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// An output with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a column by case-insensitive name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// The first row, or an error when the result is empty.
    ///
    /// Aggregate validation queries always produce exactly one row; an empty
    /// result here means the query did not have the expected shape.
    pub fn first_row(&self) -> Result<&[Value]> {
        self.rows
            .first()
            .map(Vec::as_slice)
            .ok_or_else(|| GuardError::permanent_query("query returned no rows"))
    }

    /// Reads a cell from a row as a non-negative integer, by column name.
    ///
    /// Missing columns, NULLs and non-numeric cells are all shape errors:
    /// the SQL this engine issues aliases every aggregate explicitly.
    pub fn u64_value(&self, row: &[Value], column: &str) -> Result<u64> {
        let idx = self.column_index(column).ok_or_else(|| {
            GuardError::permanent_query(format!("result has no column '{column}'"))
        })?;
        match row.get(idx) {
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
                GuardError::permanent_query(format!("column '{column}' is not a non-negative integer"))
            }),
            Some(other) => Err(GuardError::permanent_query(format!(
                "column '{column}' is not numeric: {other}"
            ))),
            None => Err(GuardError::permanent_query(format!(
                "row is narrower than column '{column}'"
            ))),
        }
    }

    /// Reads a cell from a row as display text, by column name.
    ///
    /// NULL cells render as the literal string `NULL`; numbers and booleans
    /// render via their JSON form. Used for sample-failure rows, where any
    /// value needs a readable representation.
    pub fn display_value(&self, row: &[Value], column: &str) -> String {
        let Some(idx) = self.column_index(column) else {
            return String::from("?");
        };
        match row.get(idx) {
            Some(Value::Null) | None => String::from("NULL"),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryOutput {
        QueryOutput::new(
            ["TOTAL_TESTED", "FAILED_RECORDS", "NOTE"],
            vec![vec![json!(120), json!(3), json!("three orphans")]],
        )
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let out = sample();
        assert_eq!(out.column_index("total_tested"), Some(0));
        assert_eq!(out.column_index("missing"), None);
    }

    #[test]
    fn u64_value_reads_aggregates() {
        let out = sample();
        let row = out.first_row().unwrap().to_vec();
        assert_eq!(out.u64_value(&row, "TOTAL_TESTED").unwrap(), 120);
        assert_eq!(out.u64_value(&row, "failed_records").unwrap(), 3);
        assert!(out.u64_value(&row, "NOTE").is_err());
    }

    #[test]
    fn empty_result_is_a_shape_error() {
        let out = QueryOutput::empty();
        assert!(out.first_row().is_err());
    }

    #[test]
    fn display_value_renders_nulls() {
        let out = QueryOutput::new(["ID", "VALUE"], vec![vec![json!("row-9"), Value::Null]]);
        let row = out.rows[0].clone();
        assert_eq!(out.display_value(&row, "ID"), "row-9");
        assert_eq!(out.display_value(&row, "VALUE"), "NULL");
    }
}
