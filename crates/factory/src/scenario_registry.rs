//! Scenarios a factory knows how to run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use horde_core::{DagId, ScenarioName};

/// Description of one DAG of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagSpec {
    pub id: DagId,
    /// Entry DAG of the scenario.
    #[serde(default)]
    pub is_root: bool,
    /// Executed by the minions of the ramp-up.
    #[serde(default = "default_true")]
    pub is_under_load: bool,
}

const fn default_true() -> bool {
    true
}

impl DagSpec {
    pub fn new(id: impl Into<DagId>) -> Self {
        Self {
            id: id.into(),
            is_root: false,
            is_under_load: true,
        }
    }

    #[must_use]
    pub const fn root(mut self) -> Self {
        self.is_root = true;
        self
    }

    /// A DAG run once by a singleton minion.
    #[must_use]
    pub const fn singleton(mut self) -> Self {
        self.is_under_load = false;
        self
    }
}

/// Description of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: ScenarioName,
    pub dags: Vec<DagSpec>,
}

impl ScenarioSpec {
    pub fn new(name: impl Into<ScenarioName>, dags: Vec<DagSpec>) -> Self {
        Self {
            name: name.into(),
            dags,
        }
    }

    pub fn root_dag(&self) -> Option<&DagSpec> {
        self.dags.iter().find(|dag| dag.is_root)
    }

    /// The root DAG, when it is run by the under-load minions.
    pub fn root_under_load_dag(&self) -> Option<&DagSpec> {
        self.root_dag().filter(|dag| dag.is_under_load)
    }

    pub fn under_load_dag_ids(&self) -> Vec<DagId> {
        self.dags
            .iter()
            .filter(|dag| dag.is_under_load)
            .map(|dag| dag.id.clone())
            .collect()
    }

    pub fn singleton_dag_ids(&self) -> Vec<DagId> {
        self.dags
            .iter()
            .filter(|dag| !dag.is_under_load)
            .map(|dag| dag.id.clone())
            .collect()
    }
}

/// Registry of the scenarios loaded in the factory.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    scenarios: HashMap<ScenarioName, ScenarioSpec>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_scenario(mut self, scenario: ScenarioSpec) -> Self {
        self.register(scenario);
        self
    }

    pub fn register(&mut self, scenario: ScenarioSpec) {
        self.scenarios.insert(scenario.name.clone(), scenario);
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioSpec> {
        self.scenarios.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scenarios.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &ScenarioName> {
        self.scenarios.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_under_load_dag_ignores_singleton_root() {
        let scenario = ScenarioSpec::new(
            "s",
            vec![DagSpec::new("setup").root().singleton(), DagSpec::new("main")],
        );
        assert!(scenario.root_dag().is_some());
        assert!(scenario.root_under_load_dag().is_none());
        assert_eq!(scenario.singleton_dag_ids(), vec!["setup".to_string()]);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ScenarioRegistry::new()
            .with_scenario(ScenarioSpec::new("s", vec![DagSpec::new("d1").root()]));
        assert!(registry.contains("s"));
        assert_eq!(
            registry.get("s").and_then(ScenarioSpec::root_dag).map(|d| d.id.as_str()),
            Some("d1")
        );
    }
}
