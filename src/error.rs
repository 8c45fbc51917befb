//! Error types for the cohort-guard validation engine.
//!
//! This module provides the error handling strategy for the crate using
//! `thiserror` for automatic error trait implementations. The taxonomy
//! separates run-setup failures (configuration, connection), which abort a
//! run before any check executes, from per-check failures (query, timeout),
//! which the execution engine converts into per-check error results.

use thiserror::Error;

/// Classification of a query failure, as reported by the warehouse
/// connection.
///
/// The execution engine's retry policy inspects this classification: only
/// transient failures (connection resets, warehouse hiccups) are worth
/// retrying, while permanent failures (malformed SQL, permission denied)
/// never are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryClass {
    /// Retrying the same query is likely to succeed.
    Transient,
    /// Retrying the same query will fail the same way.
    Permanent,
}

/// The main error type for the cohort-guard library.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Error related to configuration (bad database/schema keys, malformed
    /// check parameters). Fatal before any check runs.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A check with the same name is already registered.
    #[error("Check '{name}' is already registered")]
    DuplicateCheck {
        /// Name of the conflicting check
        name: String,
    },

    /// One or more requested check names could not be resolved against the
    /// registry. Every unresolved name is listed so configuration problems
    /// are diagnosed in a single pass.
    #[error("Unknown checks: {}", names.join(", "))]
    UnknownChecks {
        /// All names that failed to resolve
        names: Vec<String>,
    },

    /// No usable session could be established for an environment. Fatal:
    /// the run aborts before producing any results.
    #[error("Connection to environment '{environment}' failed: {message}")]
    Connection {
        /// Logical environment name the session was requested for
        environment: String,
        /// Detailed error message from the connection provider
        message: String,
    },

    /// A single check's query failed. Scoped to that check only: the engine
    /// converts this into a per-check error result, never a run abort.
    #[error("Query failed ({classification:?}): {message}")]
    Query {
        /// Detailed error message from the query handle
        message: String,
        /// Whether a retry of the same query is likely to succeed
        classification: QueryClass,
    },

    /// A single check exceeded its execution budget.
    #[error("Check timed out after {seconds:.1}s")]
    Timeout {
        /// The budget that was exceeded, in seconds
        seconds: f64,
    },

    /// Error from I/O operations (query-log sink).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, GuardError>`.
///
/// This is the standard `Result` type used throughout the library.
pub type Result<T> = std::result::Result<T, GuardError>;

impl GuardError {
    /// Creates a transient query error.
    pub fn transient_query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            classification: QueryClass::Transient,
        }
    }

    /// Creates a permanent query error.
    pub fn permanent_query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            classification: QueryClass::Permanent,
        }
    }

    /// Creates a connection error for the given environment.
    pub fn connection(environment: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            environment: environment.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error is a query failure classified as
    /// transient, i.e. a candidate for retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GuardError::Query {
                classification: QueryClass::Transient,
                ..
            }
        )
    }

    /// Returns true if this error is scoped to run setup rather than to a
    /// single check. Setup errors abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GuardError::Configuration(_)
                | GuardError::DuplicateCheck { .. }
                | GuardError::UnknownChecks { .. }
                | GuardError::Connection { .. }
        )
    }
}
