//! The shared, read-only execution context for a validation run.

use crate::error::{GuardError, Result};
use crate::query_log::QueryLog;
use crate::source::{ConnectionProvider, QueryHandle, QueryOutput};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Everything a check executor needs to run, constructed once per run and
/// shared read-only across all concurrent workers.
///
/// Holds the acquired warehouse session, the target environment's database
/// and schema names, and the query-log sink. Never mutated after
/// construction, so it is safe for concurrent reads without synchronization.
#[derive(Debug)]
pub struct ExecutionContext {
    environment: String,
    run_id: String,
    handle: Arc<dyn QueryHandle>,
    databases: HashMap<String, String>,
    schemas: HashMap<String, String>,
    query_log: Arc<QueryLog>,
}

impl ExecutionContext {
    /// Acquires a session for `environment` and builds the context.
    ///
    /// This is the one fail-fast precondition of a run: if the provider
    /// refuses to hand out a session, no results are produced at all.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Connection`] when acquisition fails.
    pub async fn connect(
        provider: &dyn ConnectionProvider,
        environment: impl Into<String>,
        databases: HashMap<String, String>,
        schemas: HashMap<String, String>,
        query_log: Arc<QueryLog>,
    ) -> Result<Arc<Self>> {
        let environment = environment.into();
        let handle = provider.acquire(&environment).await?;
        debug!(environment = %environment, run_id = %query_log.run_id(), "warehouse session acquired");
        Ok(Arc::new(Self {
            environment,
            run_id: query_log.run_id().to_string(),
            handle,
            databases,
            schemas,
            query_log,
        }))
    }

    /// Builds a context around an already-established session.
    ///
    /// Useful when the caller manages session lifecycle itself, and for
    /// tests that inject a scripted handle.
    pub fn with_handle(
        environment: impl Into<String>,
        handle: Arc<dyn QueryHandle>,
        databases: HashMap<String, String>,
        schemas: HashMap<String, String>,
        query_log: Arc<QueryLog>,
    ) -> Arc<Self> {
        Arc::new(Self {
            environment: environment.into(),
            run_id: query_log.run_id().to_string(),
            handle,
            databases,
            schemas,
            query_log,
        })
    }

    /// The logical environment this run targets.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The run identifier shared with the query log.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The query-log sink for this run.
    pub fn query_log(&self) -> &Arc<QueryLog> {
        &self.query_log
    }

    /// Resolves a database key (e.g. `source`, `terminology`) to its
    /// configured name.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Configuration`] for unknown keys.
    pub fn database(&self, key: &str) -> Result<&str> {
        self.databases
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| GuardError::Configuration(format!("unknown database key '{key}'")))
    }

    /// Resolves a schema key (e.g. `masked`, `terminology`) to its
    /// configured name.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Configuration`] for unknown keys.
    pub fn schema(&self, key: &str) -> Result<&str> {
        self.schemas
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| GuardError::Configuration(format!("unknown schema key '{key}'")))
    }

    /// Renders the fully qualified, quoted three-part name for a table.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Configuration`] when either key is unknown.
    pub fn qualified_table(&self, db_key: &str, schema_key: &str, table: &str) -> Result<String> {
        let database = self.database(db_key)?;
        let schema = self.schema(schema_key)?;
        Ok(format!("\"{database}\".\"{schema}\".\"{table}\""))
    }

    /// Executes one SQL statement on the run's session, recording it to the
    /// query log first.
    ///
    /// Logging is best effort and never fails the query; execution errors
    /// propagate with their transient/permanent classification intact.
    pub async fn run_query(
        &self,
        check_name: &str,
        purpose: &str,
        sql: &str,
    ) -> Result<QueryOutput> {
        self.query_log.record_query(check_name, purpose, sql);
        debug!(
            check.name = %check_name,
            query.purpose = %purpose,
            query.len = sql.len(),
            "executing validation query"
        );
        self.handle.execute(sql).await
    }
}

/// Generates a run identifier from the current UTC time.
///
/// Millisecond precision keeps ids unique across back-to-back interactive
/// runs without pulling in a random-id dependency.
pub fn generate_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct EchoHandle;

    #[async_trait]
    impl QueryHandle for EchoHandle {
        async fn execute(&self, _sql: &str) -> Result<QueryOutput> {
            Ok(QueryOutput::empty())
        }
    }

    fn context() -> Arc<ExecutionContext> {
        let databases = HashMap::from([("source".to_string(), "COHORT_DB".to_string())]);
        let schemas = HashMap::from([("masked".to_string(), "MASKED".to_string())]);
        ExecutionContext::with_handle(
            "dev",
            Arc::new(EchoHandle),
            databases,
            schemas,
            Arc::new(QueryLog::disabled("run-test")),
        )
    }

    #[test]
    fn qualified_table_quotes_all_parts() {
        let ctx = context();
        assert_eq!(
            ctx.qualified_table("source", "masked", "PATIENT").unwrap(),
            "\"COHORT_DB\".\"MASKED\".\"PATIENT\""
        );
    }

    #[test]
    fn unknown_keys_are_configuration_errors() {
        let ctx = context();
        let err = ctx.qualified_table("nope", "masked", "PATIENT").unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
    }

    #[tokio::test]
    async fn run_query_records_to_the_log() {
        let ctx = context();
        ctx.run_query("checkA", "violations", "SELECT 1").await.unwrap();
        assert_eq!(ctx.query_log().recorded(), 1);
    }

    #[test]
    fn run_ids_carry_the_prefix() {
        assert!(generate_run_id().starts_with("run-"));
    }
}
