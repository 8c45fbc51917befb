//! The check registry: the validated, executable catalogue of checks.
//!
//! Configuration is parsed into definitions first, and only fully validated
//! definitions are registered; "is the config well-formed" is decided here,
//! before any check runs, separately from "does the check pass".

use crate::core::check::{CheckCategory, CheckDefinition};
use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named, ordered group of check names.
///
/// Suites come from external configuration and are resolved against the
/// registry at run time; membership is validated at resolution, not at
/// config load, so a registry is queryable before any suite is parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    /// Suite name
    pub name: String,
    /// What this suite covers
    #[serde(default)]
    pub description: String,
    /// Ordered member check names
    pub checks: Vec<String>,
}

/// A mapping from check name to an executable definition.
///
/// Preserves registration order for the category view; lookups go through a
/// name index. Registration rejects duplicates, resolution reports every
/// unknown name at once.
#[derive(Debug, Default)]
pub struct CheckRegistry {
    definitions: Vec<CheckDefinition>,
    index: HashMap<String, usize>,
}

impl CheckRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::DuplicateCheck`] when a check with the same
    /// name is already present.
    pub fn register(&mut self, definition: CheckDefinition) -> Result<()> {
        if self.index.contains_key(definition.name()) {
            return Err(GuardError::DuplicateCheck {
                name: definition.name().to_string(),
            });
        }
        self.index
            .insert(definition.name().to_string(), self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true when no checks are registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Looks up one definition by name.
    pub fn get(&self, name: &str) -> Option<&CheckDefinition> {
        self.index.get(name).map(|&i| &self.definitions[i])
    }

    /// Resolves a sequence of names into definitions, in the requested
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::UnknownChecks`] listing every name that failed
    /// to resolve, so configuration problems are diagnosed in one pass.
    pub fn resolve<I, S>(&self, names: I) -> Result<Vec<CheckDefinition>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolved = Vec::new();
        let mut unknown = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.get(name) {
                Some(def) => resolved.push(def.clone()),
                None => unknown.push(name.to_string()),
            }
        }
        if !unknown.is_empty() {
            return Err(GuardError::UnknownChecks { names: unknown });
        }
        Ok(resolved)
    }

    /// All definitions in a category, in registration order.
    pub fn by_category(&self, category: CheckCategory) -> Vec<CheckDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.category() == category)
            .cloned()
            .collect()
    }

    /// Resolves a suite's members against the registry, in suite order.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::UnknownChecks`] listing every member the
    /// registry does not know.
    pub fn resolve_suite(&self, suite: &Suite) -> Result<Vec<CheckDefinition>> {
        self.resolve(&suite.checks)
    }

    /// All definitions in registration order.
    pub fn all(&self) -> Vec<CheckDefinition> {
        self.definitions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::check::{CheckExecutor, CheckOutcome};
    use crate::core::context::ExecutionContext;
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Debug)]
    struct NoopExecutor;

    #[async_trait]
    impl CheckExecutor for NoopExecutor {
        async fn evaluate(&self, _ctx: &ExecutionContext) -> Result<CheckOutcome> {
            Ok(CheckOutcome::passed(0))
        }
    }

    fn def(name: &str, category: CheckCategory) -> CheckDefinition {
        CheckDefinition::new(name, format!("{name} description"), category, Arc::new(NoopExecutor))
    }

    fn registry() -> CheckRegistry {
        let mut registry = CheckRegistry::new();
        registry.register(def("null_patient_id", CheckCategory::DataQuality)).unwrap();
        registry.register(def("encounter_patient_fk", CheckCategory::ReferentialIntegrity)).unwrap();
        registry.register(def("observation_core_concept", CheckCategory::ConceptMapping)).unwrap();
        registry
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = registry();
        let err = registry.register(def("null_patient_id", CheckCategory::Other)).unwrap_err();
        assert!(matches!(err, GuardError::DuplicateCheck { name } if name == "null_patient_id"));
    }

    #[test]
    fn resolve_preserves_requested_order() {
        let registry = registry();
        let defs = registry
            .resolve(["observation_core_concept", "null_patient_id"])
            .unwrap();
        let names: Vec<&str> = defs.iter().map(|d| d.name()).collect();
        assert_eq!(names, ["observation_core_concept", "null_patient_id"]);
    }

    #[test]
    fn resolve_reports_every_unknown_name() {
        let registry = registry();
        let err = registry
            .resolve(["null_patient_id", "missing_one", "missing_two"])
            .unwrap_err();
        match err {
            GuardError::UnknownChecks { names } => {
                assert_eq!(names, vec!["missing_one".to_string(), "missing_two".to_string()]);
            }
            other => panic!("expected UnknownChecks, got {other:?}"),
        }
    }

    #[test]
    fn category_view_keeps_registration_order() {
        let mut registry = registry();
        registry.register(def("null_encounter_id", CheckCategory::DataQuality)).unwrap();
        let names: Vec<String> = registry
            .by_category(CheckCategory::DataQuality)
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, ["null_patient_id", "null_encounter_id"]);
    }

    #[test]
    fn suite_membership_validated_at_resolution() {
        let registry = registry();
        let suite = Suite {
            name: "smoke".into(),
            description: String::new(),
            checks: vec!["encounter_patient_fk".into(), "not_registered".into()],
        };
        assert!(matches!(
            registry.resolve_suite(&suite),
            Err(GuardError::UnknownChecks { .. })
        ));
    }
}
