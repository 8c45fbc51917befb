//! Terminology chain-traversal validation.
//!
//! A mapping id on a source table must resolve through the mapping table to
//! a terminal concept row: `source.<field> → CONCEPT_MAP.source_code_id →
//! CONCEPT.id`. This is a chain traversal rather than a single join: the
//! check reports *which hop* broke for every failing id, and can
//! additionally require that an id resolves to exactly one concept.

use super::quote_ident;
use crate::core::{CheckExecutor, CheckOutcome, ExecutionContext, SampleFailure, SAMPLE_FAILURE_CAP};
use crate::error::Result;
use async_trait::async_trait;

/// Validates a two-hop terminology chain from a source column to a terminal
/// concept.
///
/// `total_tested` counts source rows with a non-NULL mapping id (NULL ids
/// have nothing to resolve). A row fails when its id dead-ends at either
/// hop or lands on a concept with a NULL `code` or `display`. With
/// [`require_unique`](ConceptMappingCheck::require_unique) set, an id that
/// resolves to more than one concept also fails.
///
/// # Examples
///
/// ```rust
/// use cohort_guard::checks::ConceptMappingCheck;
///
/// let check = ConceptMappingCheck::new("OBSERVATION", "observation_core_concept_id")
///     .require_unique(true);
/// assert_eq!(check.concept_field(), "observation_core_concept_id");
/// ```
#[derive(Debug, Clone)]
pub struct ConceptMappingCheck {
    source_table: String,
    concept_field: String,
    map_table: String,
    concept_table: String,
    require_unique: bool,
    db_key: String,
    source_schema_key: String,
    terminology_schema_key: String,
}

impl ConceptMappingCheck {
    /// Creates a check for `source_table.concept_field` against the default
    /// `CONCEPT_MAP`/`CONCEPT` terminology tables.
    pub fn new(source_table: impl Into<String>, concept_field: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            concept_field: concept_field.into(),
            map_table: String::from("CONCEPT_MAP"),
            concept_table: String::from("CONCEPT"),
            require_unique: false,
            db_key: String::from("source"),
            source_schema_key: String::from("masked"),
            terminology_schema_key: String::from("terminology"),
        }
    }

    /// Overrides the mapping and terminal table names.
    pub fn through(
        mut self,
        map_table: impl Into<String>,
        concept_table: impl Into<String>,
    ) -> Self {
        self.map_table = map_table.into();
        self.concept_table = concept_table.into();
        self
    }

    /// When `true`, an id resolving to more than one concept is a failure.
    pub fn require_unique(mut self, require: bool) -> Self {
        self.require_unique = require;
        self
    }

    /// Overrides the database and schema keys.
    pub fn in_location(
        mut self,
        db_key: impl Into<String>,
        source_schema_key: impl Into<String>,
        terminology_schema_key: impl Into<String>,
    ) -> Self {
        self.db_key = db_key.into();
        self.source_schema_key = source_schema_key.into();
        self.terminology_schema_key = terminology_schema_key.into();
        self
    }

    /// The mapping-id column being validated.
    pub fn concept_field(&self) -> &str {
        &self.concept_field
    }

    fn check_name(&self) -> String {
        format!("{}_{}_mapping", self.source_table, self.concept_field)
    }

    /// The subquery selecting mapping ids that resolve to more than one
    /// concept.
    fn multi_target_subquery(&self, map: &str, concept: &str) -> String {
        format!(
            "SELECT cm2.\"source_code_id\" FROM {map} cm2 \
             JOIN {concept} c2 ON cm2.\"target_code_id\" = c2.\"id\" \
             GROUP BY cm2.\"source_code_id\" HAVING COUNT(DISTINCT c2.\"id\") > 1"
        )
    }
}

#[async_trait]
impl CheckExecutor for ConceptMappingCheck {
    async fn evaluate(&self, ctx: &ExecutionContext) -> Result<CheckOutcome> {
        let check_name = self.check_name();
        let source =
            ctx.qualified_table(&self.db_key, &self.source_schema_key, &self.source_table)?;
        let map = ctx.qualified_table(&self.db_key, &self.terminology_schema_key, &self.map_table)?;
        let concept =
            ctx.qualified_table(&self.db_key, &self.terminology_schema_key, &self.concept_table)?;
        let field = quote_ident(&self.concept_field);

        let broken_chain = "cm.\"source_code_id\" IS NULL \
             OR c.\"id\" IS NULL \
             OR c.\"code\" IS NULL \
             OR c.\"display\" IS NULL";
        let (multi_clause, multi_column) = if self.require_unique {
            let subquery = self.multi_target_subquery(&map, &concept);
            (
                format!(" OR src.{field} IN ({subquery})"),
                format!(
                    ", COUNT(CASE WHEN src.{field} IN ({subquery}) THEN 1 END) AS MULTI_TARGET",
                ),
            )
        } else {
            (String::new(), String::new())
        };

        let aggregate_sql = format!(
            "SELECT COUNT(*) AS TOTAL_TESTED, \
             COUNT(CASE WHEN {broken_chain}{multi_clause} THEN 1 END) AS FAILED_RECORDS, \
             COUNT(CASE WHEN cm.\"source_code_id\" IS NULL THEN 1 END) AS MISSING_MAP, \
             COUNT(CASE WHEN cm.\"source_code_id\" IS NOT NULL AND c.\"id\" IS NULL THEN 1 END) AS MISSING_CONCEPT, \
             COUNT(CASE WHEN c.\"id\" IS NOT NULL AND c.\"code\" IS NULL THEN 1 END) AS NULL_CODE, \
             COUNT(CASE WHEN c.\"id\" IS NOT NULL AND c.\"display\" IS NULL THEN 1 END) AS NULL_DISPLAY\
             {multi_column} \
             FROM {source} src \
             LEFT JOIN {map} cm ON src.{field} = cm.\"source_code_id\" \
             LEFT JOIN {concept} c ON cm.\"target_code_id\" = c.\"id\" \
             WHERE src.{field} IS NOT NULL"
        );
        let output = ctx.run_query(&check_name, "chain_counts", &aggregate_sql).await?;
        let row = output.first_row()?.to_vec();
        let total_tested = output.u64_value(&row, "TOTAL_TESTED")?;
        let failed_records = output.u64_value(&row, "FAILED_RECORDS")?;

        if failed_records == 0 {
            return Ok(CheckOutcome::passed(total_tested));
        }

        let multi_hop_case = if self.require_unique {
            format!(
                " WHEN src.{field} IN ({}) THEN 'multiple targets'",
                self.multi_target_subquery(&map, &concept)
            )
        } else {
            String::new()
        };
        let sample_sql = format!(
            "SELECT DISTINCT src.{field} AS RECORD_KEY, \
             CASE WHEN cm.\"source_code_id\" IS NULL THEN '{map_hop}' \
             WHEN c.\"id\" IS NULL THEN '{concept_hop}' \
             WHEN c.\"code\" IS NULL THEN '{concept_hop}.code' \
             WHEN c.\"display\" IS NULL THEN '{concept_hop}.display'{multi_hop_case} \
             END AS BROKEN_HOP \
             FROM {source} src \
             LEFT JOIN {map} cm ON src.{field} = cm.\"source_code_id\" \
             LEFT JOIN {concept} c ON cm.\"target_code_id\" = c.\"id\" \
             WHERE src.{field} IS NOT NULL AND ({broken_chain}{multi_clause}) \
             LIMIT {SAMPLE_FAILURE_CAP}",
            map_hop = self.map_table,
            concept_hop = self.concept_table,
        );
        let samples = ctx.run_query(&check_name, "chain_samples", &sample_sql).await?;
        let sample_failures = samples
            .rows
            .iter()
            .map(|r| {
                SampleFailure::new(
                    samples.display_value(r, "RECORD_KEY"),
                    format!("chain broke at {}", samples.display_value(r, "BROKEN_HOP")),
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
    fn check_name_names_the_field() {
        let check = ConceptMappingCheck::new("OBSERVATION", "observation_core_concept_id");
        assert_eq!(check.check_name(), "OBSERVATION_observation_core_concept_id_mapping");
    }

    #[test]
    fn uniqueness_subquery_groups_by_mapping_id() {
        let check = ConceptMappingCheck::new("OBSERVATION", "concept_id").require_unique(true);
        let subquery = check.multi_target_subquery("\"M\"", "\"C\"");
        assert!(subquery.contains("HAVING COUNT(DISTINCT c2.\"id\") > 1"));
    }
}
