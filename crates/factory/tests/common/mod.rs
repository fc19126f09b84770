//! Shared fixtures for the factory behavioural tests.

#![allow(dead_code)]

use std::sync::Arc;

use horde_factory::{
    AssignmentMode, CoordinationStore, DagSpec, FactoryConfig, InMemoryCoordinationStore,
    LocalAssignmentStore, MinionAssignmentKeeper, ScenarioRegistry, ScenarioSpec,
};

pub const CAMPAIGN: &str = "campaign-1";
pub const TENANT: &str = "acme";

/// `checkout`: root d1 plus d2 and d3. `browse`: root b1 plus a singleton `setup`.
pub fn registry() -> Arc<ScenarioRegistry> {
    Arc::new(
        ScenarioRegistry::new()
            .with_scenario(ScenarioSpec::new(
                "checkout",
                vec![DagSpec::new("d1").root(), DagSpec::new("d2"), DagSpec::new("d3")],
            ))
            .with_scenario(ScenarioSpec::new(
                "browse",
                vec![DagSpec::new("b1").root(), DagSpec::new("setup").singleton()],
            )),
    )
}

pub fn shared_store() -> Arc<InMemoryCoordinationStore> {
    Arc::new(InMemoryCoordinationStore::new())
}

pub fn keeper_with(
    store: &Arc<InMemoryCoordinationStore>,
    config: FactoryConfig,
) -> MinionAssignmentKeeper {
    let registry = registry();
    let local_store = Arc::new(LocalAssignmentStore::new(Arc::clone(&registry)));
    let store: Arc<dyn CoordinationStore> = store.clone();
    MinionAssignmentKeeper::new(config, store, registry, local_store)
}

pub fn keeper(
    store: &Arc<InMemoryCoordinationStore>,
    node: &str,
    strategy: AssignmentMode,
) -> MinionAssignmentKeeper {
    keeper_with(
        store,
        FactoryConfig::for_node(node)
            .with_tenant(TENANT)
            .with_strategy(strategy),
    )
}

pub fn ids(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix}{i}")).collect()
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}
