//! Free-form SQL business-rule checks.

use crate::core::{CheckExecutor, CheckOutcome, ExecutionContext, SampleFailure};
use crate::error::{GuardError, Result};
use async_trait::async_trait;

/// Keywords that would make a validation query mutate the dataset. Every
/// check in this engine is read-only.
const FORBIDDEN_KEYWORDS: [&str; 9] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "MERGE", "GRANT",
];

/// A business-rule check expressed as one SQL query.
///
/// The query must return a single row with `TOTAL_TESTED` and
/// `FAILED_RECORDS` columns; an optional `FAILURE_DETAILS` column is carried
/// into the sample failures. The placeholder `{DATABASE}` is substituted
/// with the configured source database name before execution, so rule SQL
/// stays environment-independent.
///
/// # Examples
///
/// ```rust
/// use cohort_guard::checks::SqlPredicateCheck;
///
/// let check = SqlPredicateCheck::new(
///     "SELECT COUNT(*) AS TOTAL_TESTED, \
///      COUNT(CASE WHEN \"end_date\" < \"start_date\" THEN 1 END) AS FAILED_RECORDS \
///      FROM \"{DATABASE}\".\"MASKED\".\"EPISODE_OF_CARE\"",
/// ).unwrap();
/// assert!(check.query().contains("{DATABASE}"));
///
/// // Mutating statements are rejected at construction.
/// assert!(SqlPredicateCheck::new("DELETE FROM \"EPISODE_OF_CARE\"").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct SqlPredicateCheck {
    query: String,
    db_key: String,
}

impl SqlPredicateCheck {
    /// Creates a predicate check from its SQL text.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Configuration`] when the SQL contains a
    /// data-modifying keyword.
    pub fn new(query: impl Into<String>) -> Result<Self> {
        let query = query.into();
        validate_read_only(&query)?;
        Ok(Self {
            query,
            db_key: String::from("source"),
        })
    }

    /// Overrides the database key substituted into `{DATABASE}`.
    pub fn with_database_key(mut self, db_key: impl Into<String>) -> Self {
        self.db_key = db_key.into();
        self
    }

    /// The raw query text, placeholders intact.
    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Rejects SQL that could modify data or schema. Word-boundary aware so
/// column names like `created_at` do not trip the `CREATE` keyword.
fn validate_read_only(sql: &str) -> Result<()> {
    let upper = sql.to_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .collect();
    for keyword in FORBIDDEN_KEYWORDS {
        if words.contains(&keyword) {
            return Err(GuardError::Configuration(format!(
                "validation SQL must be read-only, found '{keyword}'"
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl CheckExecutor for SqlPredicateCheck {
    async fn evaluate(&self, ctx: &ExecutionContext) -> Result<CheckOutcome> {
        let database = ctx.database(&self.db_key)?;
        let sql = self.query.replace("{DATABASE}", database);

        let output = ctx.run_query("sql_predicate", "business_rule", &sql).await?;
        if output.rows.is_empty() {
            return Err(GuardError::permanent_query(
                "predicate query returned no rows; expected one summary row",
            ));
        }
        let row = output.first_row()?.to_vec();
        let total_tested = output.u64_value(&row, "TOTAL_TESTED")?;
        let failed_records = output.u64_value(&row, "FAILED_RECORDS")?;

        let sample_failures = if failed_records > 0 && output.column_index("FAILURE_DETAILS").is_some()
        {
            vec![SampleFailure::new(
                "summary",
                output.display_value(&row, "FAILURE_DETAILS"),
            )]
        } else {
            Vec::new()
        };

        Ok(CheckOutcome::evaluated(total_tested, failed_records, sample_failures))
    }
}
