//! Local index of the minions and DAGs assigned to this factory.
//!
//! Owned by one factory for the lifetime of a campaign, reset when the
//! campaign completes. Snapshots are cheap persistent-map clones.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use im::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::trace;

use horde_core::{DagId, MinionId, ScenarioName};

use crate::scenario_registry::ScenarioRegistry;

/// Minions of a scenario and their DAGs run by this factory.
pub type MinionAssignments = HashMap<MinionId, HashSet<DagId>>;

pub struct LocalAssignmentStore {
    registry: Arc<ScenarioRegistry>,
    assignments: RwLock<HashMap<ScenarioName, MinionAssignments>>,
}

impl LocalAssignmentStore {
    pub fn new(registry: Arc<ScenarioRegistry>) -> Self {
        Self {
            registry,
            assignments: RwLock::new(HashMap::new()),
        }
    }

    /// Merge assignments into the index.
    pub async fn save(&self, scenario: &str, assignments: &BTreeMap<MinionId, BTreeSet<DagId>>) {
        if assignments.is_empty() {
            return;
        }
        let mut all = self.assignments.write().await;
        let scenario_assignments = all.entry(scenario.to_string()).or_default();
        for (minion, dags) in assignments {
            scenario_assignments
                .entry(minion.clone())
                .or_default()
                .extend(dags.iter().cloned());
        }
        trace!(scenario = %scenario, minions = assignments.len(), "Local assignments saved");
    }

    pub async fn reset(&self) {
        self.assignments.write().await.clear();
    }

    pub async fn is_local(&self, scenario: &str, minion: &str, dag: &str) -> bool {
        self.assignments
            .read()
            .await
            .get(scenario)
            .and_then(|minions| minions.get(minion))
            .is_some_and(|dags| dags.contains(dag))
    }

    /// Whether the root under-load DAG of the minion runs in this factory,
    /// which makes this factory the one driving the minion's ramp-up.
    pub async fn has_root_under_load_locally(&self, scenario: &str, minion: &str) -> bool {
        let Some(root) = self
            .registry
            .get(scenario)
            .and_then(|spec| spec.root_under_load_dag())
        else {
            return false;
        };
        self.is_local(scenario, minion, &root.id).await
    }

    pub async fn has_minions_assigned(&self, scenario: &str) -> bool {
        self.assignments
            .read()
            .await
            .get(scenario)
            .is_some_and(|minions| !minions.is_empty())
    }

    /// Snapshot of all the assignments.
    pub async fn assignments(&self) -> HashMap<ScenarioName, MinionAssignments> {
        self.assignments.read().await.clone()
    }

    /// Snapshot of the assignments of one scenario.
    pub async fn assignments_of(&self, scenario: &str) -> MinionAssignments {
        self.assignments
            .read()
            .await
            .get(scenario)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario_registry::{DagSpec, ScenarioSpec};

    fn store() -> LocalAssignmentStore {
        let registry = ScenarioRegistry::new()
            .with_scenario(ScenarioSpec::new(
                "scenario-1",
                vec![DagSpec::new("dag-1").root(), DagSpec::new("dag-2")],
            ))
            .with_scenario(ScenarioSpec::new(
                "scenario-2",
                vec![DagSpec::new("dag-a").root().singleton(), DagSpec::new("dag-b")],
            ));
        LocalAssignmentStore::new(Arc::new(registry))
    }

    fn assignment(minion: &str, dags: &[&str]) -> BTreeMap<MinionId, BTreeSet<DagId>> {
        BTreeMap::from([(
            minion.to_string(),
            dags.iter().map(ToString::to_string).collect(),
        )])
    }

    #[tokio::test]
    async fn test_save_merges_dags_of_same_minion() {
        let store = store();
        store.save("scenario-1", &assignment("m1", &["dag-1"])).await;
        store.save("scenario-1", &assignment("m1", &["dag-2"])).await;

        assert!(store.is_local("scenario-1", "m1", "dag-1").await);
        assert!(store.is_local("scenario-1", "m1", "dag-2").await);
        assert!(!store.is_local("scenario-1", "m2", "dag-1").await);
        assert_eq!(store.assignments_of("scenario-1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_root_under_load_requires_local_root() {
        let store = store();
        store.save("scenario-1", &assignment("m1", &["dag-1"])).await;
        store.save("scenario-1", &assignment("m2", &["dag-2"])).await;

        assert!(store.has_root_under_load_locally("scenario-1", "m1").await);
        assert!(!store.has_root_under_load_locally("scenario-1", "m2").await);
        assert!(!store.has_root_under_load_locally("unknown", "m1").await);
    }

    #[tokio::test]
    async fn test_singleton_root_is_never_root_under_load() {
        let store = store();
        store.save("scenario-2", &assignment("m1", &["dag-a"])).await;
        assert!(!store.has_root_under_load_locally("scenario-2", "m1").await);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let store = store();
        store.save("scenario-1", &assignment("m1", &["dag-1"])).await;
        assert!(store.has_minions_assigned("scenario-1").await);

        store.reset().await;

        assert!(!store.has_minions_assigned("scenario-1").await);
        assert!(store.assignments().await.is_empty());
    }
}
