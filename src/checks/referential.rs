//! Foreign-key relationship validation.

use super::quote_ident;
use crate::core::{CheckExecutor, CheckOutcome, ExecutionContext, SampleFailure, SAMPLE_FAILURE_CAP};
use crate::error::{GuardError, Result};
use async_trait::async_trait;

/// One column pair of a (possibly composite) foreign key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeyPair {
    /// Foreign-key column on the child table
    pub child_column: String,
    /// Referenced key column on the parent table
    pub parent_column: String,
}

/// Detects child rows whose foreign key has no matching parent row.
///
/// `total_tested` is the number of child rows carrying a key (all rows when
/// NULL keys are not exempt); `failed_records` is the number of those with
/// no parent match. A relationship with zero child rows passes vacuously.
///
/// NULL foreign keys are exempt by default: an optional reference that was
/// never set is not an orphan. Relationships that intend NOT NULL semantics
/// can turn the exemption off per relationship with
/// [`exempt_null_keys`](RelationshipCheck::exempt_null_keys), which makes a
/// NULL key count as a violation.
///
/// Before validating, the check confirms all referenced columns exist in the
/// target schema and reports `Skipped` (not an error) when any are missing,
/// so a schema drift surfaces as a diagnosable skip instead of a failed
/// query.
///
/// # Examples
///
/// ```rust
/// use cohort_guard::checks::RelationshipCheck;
///
/// let check = RelationshipCheck::new("ENCOUNTER", "patient_id", "PATIENT", "id");
/// assert_eq!(check.child_table(), "ENCOUNTER");
///
/// // Composite keys are ordered column pairs.
/// let composite = RelationshipCheck::new("APPOINTMENT", "schedule_id", "SCHEDULE", "id")
///     .and_key_pair("practitioner_id", "practitioner_id");
/// assert_eq!(composite.key_pairs().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RelationshipCheck {
    child_table: String,
    parent_table: String,
    key_pairs: Vec<KeyPair>,
    child_key_column: String,
    exempt_null_keys: bool,
    preflight_columns: bool,
    db_key: String,
    schema_key: String,
}

impl RelationshipCheck {
    /// Creates a single-column relationship check.
    pub fn new(
        child_table: impl Into<String>,
        child_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            parent_table: parent_table.into(),
            key_pairs: vec![KeyPair {
                child_column: child_column.into(),
                parent_column: parent_column.into(),
            }],
            child_key_column: String::from("id"),
            exempt_null_keys: true,
            preflight_columns: true,
            db_key: String::from("source"),
            schema_key: String::from("masked"),
        }
    }

    /// Appends another column pair, making the key composite.
    pub fn and_key_pair(
        mut self,
        child_column: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        self.key_pairs.push(KeyPair {
            child_column: child_column.into(),
            parent_column: parent_column.into(),
        });
        self
    }

    /// Sets whether NULL foreign keys are exempt from orphan claims.
    /// Defaults to `true`.
    pub fn exempt_null_keys(mut self, exempt: bool) -> Self {
        self.exempt_null_keys = exempt;
        self
    }

    /// Disables the information-schema column preflight. Useful against
    /// warehouses where the information schema is not readable.
    pub fn skip_column_preflight(mut self) -> Self {
        self.preflight_columns = false;
        self
    }

    /// Column identifying child rows in sample failures. Defaults to `id`.
    pub fn child_key_column(mut self, column: impl Into<String>) -> Self {
        self.child_key_column = column.into();
        self
    }

    /// Overrides the database/schema keys this check resolves against.
    pub fn in_location(mut self, db_key: impl Into<String>, schema_key: impl Into<String>) -> Self {
        self.db_key = db_key.into();
        self.schema_key = schema_key.into();
        self
    }

    /// The child (referencing) table.
    pub fn child_table(&self) -> &str {
        &self.child_table
    }

    /// The ordered key column pairs.
    pub fn key_pairs(&self) -> &[KeyPair] {
        &self.key_pairs
    }

    fn check_name(&self) -> String {
        format!(
            "{}_{}_to_{}",
            self.child_table,
            self.key_pairs
                .iter()
                .map(|p| p.child_column.as_str())
                .collect::<Vec<_>>()
                .join("_"),
            self.parent_table
        )
    }

    fn join_condition(&self) -> String {
        self.key_pairs
            .iter()
            .map(|p| {
                format!(
                    "src.{} = ref.{}",
                    quote_ident(&p.child_column),
                    quote_ident(&p.parent_column)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Every component of a composite key must be present for the row to
    /// claim a reference.
    fn key_present_condition(&self) -> String {
        self.key_pairs
            .iter()
            .map(|p| format!("src.{} IS NOT NULL", quote_ident(&p.child_column)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn no_match_condition(&self) -> String {
        // Any parent key column NULL after a LEFT JOIN means no match.
        format!(
            "ref.{} IS NULL",
            quote_ident(&self.key_pairs[0].parent_column)
        )
    }

    fn violation_condition(&self) -> String {
        if self.exempt_null_keys {
            self.no_match_condition()
        } else {
            let key_missing = self
                .key_pairs
                .iter()
                .map(|p| format!("src.{} IS NULL", quote_ident(&p.child_column)))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("({key_missing} OR {})", self.no_match_condition())
        }
    }

    /// Looks up the referenced columns in the information schema, returning
    /// the missing `table.column` pairs.
    async fn missing_columns(&self, ctx: &ExecutionContext) -> Result<Vec<String>> {
        let database = ctx.database(&self.db_key)?;
        let schema = ctx.schema(&self.schema_key)?;
        let sql = format!(
            "SELECT TABLE_NAME, COLUMN_NAME \
             FROM \"{database}\".INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_SCHEMA = '{schema}' \
             AND TABLE_NAME IN ('{}', '{}')",
            self.child_table, self.parent_table
        );
        let output = ctx.run_query(&self.check_name(), "column_preflight", &sql).await?;

        let table_idx = output.column_index("TABLE_NAME");
        let column_idx = output.column_index("COLUMN_NAME");
        let (Some(table_idx), Some(column_idx)) = (table_idx, column_idx) else {
            return Err(GuardError::permanent_query(
                "information schema result missing TABLE_NAME/COLUMN_NAME",
            ));
        };
        let available: Vec<(String, String)> = output
            .rows
            .iter()
            .filter_map(|row| {
                let table = row.get(table_idx)?.as_str()?;
                let column = row.get(column_idx)?.as_str()?;
                Some((table.to_string(), column.to_string()))
            })
            .collect();

        let mut required: Vec<(String, String)> = vec![
            (self.child_table.clone(), self.child_key_column.clone()),
        ];
        for pair in &self.key_pairs {
            required.push((self.child_table.clone(), pair.child_column.clone()));
            required.push((self.parent_table.clone(), pair.parent_column.clone()));
        }

        Ok(required
            .into_iter()
            .filter(|req| !available.contains(req))
            .map(|(table, column)| format!("{table}.{column}"))
            .collect())
    }
}

#[async_trait]
impl CheckExecutor for RelationshipCheck {
    async fn evaluate(&self, ctx: &ExecutionContext) -> Result<CheckOutcome> {
        let check_name = self.check_name();

        if self.preflight_columns {
            let missing = self.missing_columns(ctx).await?;
            if !missing.is_empty() {
                return Ok(CheckOutcome::skipped(format!(
                    "missing columns: {}",
                    missing.join(", ")
                )));
            }
        }

        let child = ctx.qualified_table(&self.db_key, &self.schema_key, &self.child_table)?;
        let parent = ctx.qualified_table(&self.db_key, &self.schema_key, &self.parent_table)?;
        let join = self.join_condition();
        let violation = self.violation_condition();

        let scope = if self.exempt_null_keys {
            format!(" WHERE {}", self.key_present_condition())
        } else {
            String::new()
        };
        let aggregate_sql = format!(
            "SELECT COUNT(*) AS TOTAL_TESTED, \
             COUNT(CASE WHEN {violation} THEN 1 END) AS FAILED_RECORDS \
             FROM {child} src LEFT JOIN {parent} ref ON {join}{scope}"
        );
        let output = ctx.run_query(&check_name, "orphan_counts", &aggregate_sql).await?;
        let row = output.first_row()?.to_vec();
        let total_tested = output.u64_value(&row, "TOTAL_TESTED")?;
        let failed_records = output.u64_value(&row, "FAILED_RECORDS")?;

        if failed_records == 0 {
            return Ok(CheckOutcome::passed(total_tested));
        }

        let key = quote_ident(&self.child_key_column);
        let fk_columns = self
            .key_pairs
            .iter()
            .enumerate()
            .map(|(i, p)| format!("src.{} AS FK_{i}", quote_ident(&p.child_column)))
            .collect::<Vec<_>>()
            .join(", ");
        let sample_sql = format!(
            "SELECT src.{key} AS RECORD_KEY, {fk_columns} \
             FROM {child} src LEFT JOIN {parent} ref ON {join} \
             WHERE {violation}{} LIMIT {SAMPLE_FAILURE_CAP}",
            if self.exempt_null_keys {
                format!(" AND {}", self.key_present_condition())
            } else {
                String::new()
            }
        );
        let samples = ctx.run_query(&check_name, "orphan_samples", &sample_sql).await?;
        let sample_failures = samples
            .rows
            .iter()
            .map(|r| {
                let dangling = self
                    .key_pairs
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        format!(
                            "{}={}",
                            p.child_column,
                            samples.display_value(r, &format!("FK_{i}"))
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                SampleFailure::new(
                    samples.display_value(r, "RECORD_KEY"),
                    format!("no row in {} for {dangling}", self.parent_table),
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
    fn composite_keys_join_on_every_pair() {
        let check = RelationshipCheck::new("APPOINTMENT", "schedule_id", "SCHEDULE", "id")
            .and_key_pair("location_id", "location_id");
        assert_eq!(
            check.join_condition(),
            "src.\"schedule_id\" = ref.\"id\" AND src.\"location_id\" = ref.\"location_id\""
        );
        assert_eq!(
            check.key_present_condition(),
            "src.\"schedule_id\" IS NOT NULL AND src.\"location_id\" IS NOT NULL"
        );
    }

    #[test]
    fn null_exemption_changes_the_violation_condition() {
        let exempt = RelationshipCheck::new("ENCOUNTER", "patient_id", "PATIENT", "id");
        assert_eq!(exempt.violation_condition(), "ref.\"id\" IS NULL");

        let strict = RelationshipCheck::new("ENCOUNTER", "patient_id", "PATIENT", "id")
            .exempt_null_keys(false);
        assert_eq!(
            strict.violation_condition(),
            "(src.\"patient_id\" IS NULL OR ref.\"id\" IS NULL)"
        );
    }

    #[test]
    fn check_name_describes_the_relationship() {
        let check = RelationshipCheck::new("ENCOUNTER", "patient_id", "PATIENT", "id");
        assert_eq!(check.check_name(), "ENCOUNTER_patient_id_to_PATIENT");
    }
}
