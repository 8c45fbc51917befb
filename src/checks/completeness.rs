//! NULL/emptiness detection for a single column.

use super::quote_ident;
use crate::core::{CheckExecutor, CheckOutcome, ExecutionContext, SampleFailure, SAMPLE_FAILURE_CAP};
use crate::error::Result;
use async_trait::async_trait;

/// Counts rows whose column is NULL (and optionally blank).
///
/// `total_tested` is the table's row count; `failed_records` is the number
/// of rows with a missing value. A table with no rows passes vacuously.
///
/// # Examples
///
/// ```rust
/// use cohort_guard::checks::NullRateCheck;
///
/// let check = NullRateCheck::new("PATIENT", "nhs_number_hash")
///     .include_empty_strings(true);
/// assert_eq!(check.column(), "nhs_number_hash");
/// ```
#[derive(Debug, Clone)]
pub struct NullRateCheck {
    table: String,
    column: String,
    key_column: String,
    db_key: String,
    schema_key: String,
    include_empty_strings: bool,
}

impl NullRateCheck {
    /// Creates a check for `table.column` in the default source location.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            key_column: String::from("id"),
            db_key: String::from("source"),
            schema_key: String::from("masked"),
            include_empty_strings: false,
        }
    }

    /// Overrides the database/schema keys this check resolves against.
    pub fn in_location(mut self, db_key: impl Into<String>, schema_key: impl Into<String>) -> Self {
        self.db_key = db_key.into();
        self.schema_key = schema_key.into();
        self
    }

    /// Column used to identify offending rows in sample failures.
    /// Defaults to `id`.
    pub fn key_column(mut self, key_column: impl Into<String>) -> Self {
        self.key_column = key_column.into();
        self
    }

    /// When `true`, whitespace-only strings count as missing too.
    pub fn include_empty_strings(mut self, include: bool) -> Self {
        self.include_empty_strings = include;
        self
    }

    /// The validated column.
    pub fn column(&self) -> &str {
        &self.column
    }

    fn missing_condition(&self) -> String {
        let col = quote_ident(&self.column);
        if self.include_empty_strings {
            format!("({col} IS NULL OR TRIM(CAST({col} AS VARCHAR)) = '')")
        } else {
            format!("{col} IS NULL")
        }
    }
}

#[async_trait]
impl CheckExecutor for NullRateCheck {
    async fn evaluate(&self, ctx: &ExecutionContext) -> Result<CheckOutcome> {
        let table = ctx.qualified_table(&self.db_key, &self.schema_key, &self.table)?;
        let condition = self.missing_condition();
        let check_name = format!("{}_{}_completeness", self.table, self.column);

        let aggregate_sql = format!(
            "SELECT COUNT(*) AS TOTAL_TESTED, \
             COUNT(CASE WHEN {condition} THEN 1 END) AS FAILED_RECORDS \
             FROM {table}"
        );
        let output = ctx.run_query(&check_name, "missing_value_counts", &aggregate_sql).await?;
        let row = output.first_row()?.to_vec();
        let total_tested = output.u64_value(&row, "TOTAL_TESTED")?;
        let failed_records = output.u64_value(&row, "FAILED_RECORDS")?;

        if failed_records == 0 {
            return Ok(CheckOutcome::passed(total_tested));
        }

        let key = quote_ident(&self.key_column);
        let sample_sql = format!(
            "SELECT {key} AS RECORD_KEY FROM {table} WHERE {condition} LIMIT {SAMPLE_FAILURE_CAP}"
        );
        let samples = ctx.run_query(&check_name, "missing_value_samples", &sample_sql).await?;
        let sample_failures = samples
            .rows
            .iter()
            .map(|r| {
                SampleFailure::new(
                    samples.display_value(r, "RECORD_KEY"),
                    format!("missing value in {}", self.column),
                )
            })
            .collect();

        Ok(CheckOutcome::evaluated(total_tested, failed_records, sample_failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_handling_changes_the_condition() {
        let plain = NullRateCheck::new("PATIENT", "birth_year");
        assert_eq!(plain.missing_condition(), "\"birth_year\" IS NULL");

        let with_blanks = NullRateCheck::new("PATIENT", "postcode_hash").include_empty_strings(true);
        assert!(with_blanks.missing_condition().contains("TRIM"));
    }
}
