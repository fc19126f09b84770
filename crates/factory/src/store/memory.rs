//! In-process coordination store.
//!
//! The whole key space sits behind one async mutex, which makes every plain
//! operation and every primitive invocation atomic for all the factories
//! sharing the store instance.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use horde_core::{CampaignCompletionState, DagId, MinionId};

use super::keys::{self, KeyLayout, MINIONS_FIELD, SCENARIOS_FIELD};
use super::{
    AssignOutcome, AssignRequest, AssignmentMode, CompleteRequest, CoordinationStore, Primitive,
    PrimitiveHandle, RegisterRequest, StoreError,
};

#[derive(Debug, Clone)]
enum Value {
    Set(BTreeSet<String>),
    Hash(BTreeMap<String, String>),
    Counters(BTreeMap<String, i64>),
}

impl Value {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Hash(_) => "hash",
            Self::Counters(_) => "counters",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Set(set) => set.is_empty(),
            Self::Hash(hash) => hash.is_empty(),
            Self::Counters(counters) => counters.is_empty(),
        }
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &Value) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
        found: found.type_name(),
    }
}

#[derive(Debug, Default)]
struct KeySpace {
    entries: HashMap<String, Value>,
}

impl KeySpace {
    fn set(&self, key: &str) -> Result<Option<&BTreeSet<String>>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Value::Set(set)) => Ok(Some(set)),
            Some(other) => Err(wrong_type(key, "set", other)),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut BTreeSet<String>, StoreError> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(BTreeSet::new()))
        {
            Value::Set(set) => Ok(set),
            other => Err(wrong_type(key, "set", other)),
        }
    }

    fn hash(&self, key: &str) -> Result<Option<&BTreeMap<String, String>>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(Some(hash)),
            Some(other) => Err(wrong_type(key, "hash", other)),
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut BTreeMap<String, String>, StoreError> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(BTreeMap::new()))
        {
            Value::Hash(hash) => Ok(hash),
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    fn counters(&self, key: &str) -> Result<Option<&BTreeMap<String, i64>>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Value::Counters(counters)) => Ok(Some(counters)),
            Some(other) => Err(wrong_type(key, "counters", other)),
        }
    }

    fn counters_mut(&mut self, key: &str) -> Result<&mut BTreeMap<String, i64>, StoreError> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Counters(BTreeMap::new()))
        {
            Value::Counters(counters) => Ok(counters),
            other => Err(wrong_type(key, "counters", other)),
        }
    }

    fn counter(&self, key: &str, field: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .counters(key)?
            .and_then(|counters| counters.get(field))
            .copied())
    }

    fn increment(&mut self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let value = self.counters_mut(key)?.entry(field.to_string()).or_insert(0);
        *value = value.saturating_add(delta);
        Ok(*value)
    }

    /// Empty collections do not exist.
    fn prune(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(Value::is_empty) {
            self.entries.remove(key);
        }
    }

    fn delete_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REGISTER
    // ═══════════════════════════════════════════════════════════════════════

    fn register(&mut self, request: &RegisterRequest) -> Result<usize, StoreError> {
        let RegisterRequest {
            layout,
            scenario,
            dag_ids,
            minions,
            under_load,
            mode,
        } = request;
        let remaining_key = layout.minion_remaining_dags(scenario);

        // A minion with a DAG counter or an assignment is already in play.
        let mut fresh: Vec<MinionId> = Vec::with_capacity(minions.len());
        for minion in minions {
            let known = self.counter(&remaining_key, minion)?.is_some()
                || self
                    .entries
                    .contains_key(&layout.minion_assigned_dags(scenario, minion))
                || fresh.contains(minion);
            if known {
                trace!(minion = %minion, scenario = %scenario, "Minion already registered");
            } else {
                fresh.push(minion.clone());
            }
        }
        if fresh.is_empty() || dag_ids.is_empty() {
            return Ok(0);
        }

        let dag_count = i64::try_from(dag_ids.len()).unwrap_or(i64::MAX);
        for key in [remaining_key, layout.minion_total_dags(scenario)] {
            let counters = self.counters_mut(&key)?;
            for minion in &fresh {
                counters.insert(minion.clone(), dag_count);
            }
        }

        if !*under_load && *mode == AssignmentMode::SingleLocation {
            let encoded = keys::encode_list(dag_ids);
            let singletons = self.hash_mut(&layout.singleton_minions(scenario))?;
            for minion in &fresh {
                singletons.insert(minion.clone(), encoded.clone());
            }
            return Ok(fresh.len());
        }

        for minion in &fresh {
            self.set_mut(&layout.minion_unassigned_dags(scenario, minion))?
                .extend(dag_ids.iter().cloned());
        }
        if *under_load {
            self.set_mut(&layout.under_load_minions(scenario))?
                .extend(fresh.iter().cloned());
            let added = i64::try_from(fresh.len()).unwrap_or(i64::MAX);
            self.increment(&layout.scenario_counters(scenario), MINIONS_FIELD, added)?;
            let counted = self.hash_mut(&layout.counted_scenarios())?;
            if !counted.contains_key(scenario.as_str()) {
                counted.insert(scenario.clone(), "1".to_string());
                self.increment(&layout.campaign_counters(), SCENARIOS_FIELD, 1)?;
            }
        }
        self.set_mut(&layout.unassigned_minions(scenario))?
            .extend(fresh.iter().cloned());
        Ok(fresh.len())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ASSIGN
    // ═══════════════════════════════════════════════════════════════════════

    fn assign(&mut self, request: &AssignRequest) -> Result<AssignOutcome, StoreError> {
        let AssignRequest {
            layout,
            scenario,
            channel,
            root_dag,
            mode,
            batch_size,
            capacity,
        } = request;
        let mut outcome = AssignOutcome::default();

        let factory_dags = self
            .set(&layout.factory_dags(scenario, channel))?
            .cloned()
            .unwrap_or_default();
        if factory_dags.is_empty() {
            return Ok(outcome);
        }

        if *mode == AssignmentMode::SingleLocation {
            self.claim_singletons(request, &factory_dags, &mut outcome)?;
        }

        let evaluated_key = layout.evaluated_minions(scenario, channel);
        let unassigned_minions_key = layout.unassigned_minions(scenario);
        let evaluated = self.set(&evaluated_key)?.cloned().unwrap_or_default();
        let candidates: Vec<MinionId> = self
            .set(&unassigned_minions_key)?
            .map(|unassigned| {
                unassigned
                    .difference(&evaluated)
                    .take(*batch_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let under_load = self
            .set(&layout.under_load_minions(scenario))?
            .cloned()
            .unwrap_or_default();

        for minion in candidates {
            let is_under_load = under_load.contains(&minion);
            if is_under_load && outcome.assigned_under_load >= *capacity {
                break;
            }
            self.set_mut(&evaluated_key)?.insert(minion.clone());
            outcome.evaluated = outcome.evaluated.saturating_add(1);

            let unassigned_key = layout.minion_unassigned_dags(scenario, &minion);
            let unassigned = self.set(&unassigned_key)?.cloned().unwrap_or_default();
            let taken: BTreeSet<DagId> = match mode {
                AssignmentMode::DistributedMinion => {
                    unassigned.intersection(&factory_dags).cloned().collect()
                }
                AssignmentMode::SingleLocation
                    if unassigned.contains(root_dag) && factory_dags.contains(root_dag) =>
                {
                    unassigned.clone()
                }
                AssignmentMode::SingleLocation => BTreeSet::new(),
            };

            if !taken.is_empty() {
                self.set_mut(&unassigned_key)?
                    .retain(|dag| !taken.contains(dag));
                let assigned = self.hash_mut(&layout.minion_assigned_dags(scenario, &minion))?;
                for dag in &taken {
                    assigned.insert(dag.clone(), channel.clone());
                }
                if taken.contains(root_dag) {
                    self.hash_mut(&layout.root_owners(scenario))?
                        .insert(minion.clone(), channel.clone());
                }
                if is_under_load {
                    outcome.assigned_under_load = outcome.assigned_under_load.saturating_add(1);
                }
                trace!(minion = %minion, channel = %channel, dags = ?taken, "DAGs assigned");
                outcome.assignments.insert(minion.clone(), taken);
            }

            self.prune(&unassigned_key);
            if self.set(&unassigned_key)?.is_none() {
                self.set_mut(&unassigned_minions_key)?.remove(&minion);
                self.prune(&unassigned_minions_key);
            }
        }

        Ok(outcome)
    }

    /// Assign all the singleton minions of the scenario to the first factory
    /// able to run all of them.
    fn claim_singletons(
        &mut self,
        request: &AssignRequest,
        factory_dags: &BTreeSet<DagId>,
        outcome: &mut AssignOutcome,
    ) -> Result<(), StoreError> {
        let AssignRequest {
            layout,
            scenario,
            channel,
            ..
        } = request;
        let singletons_key = layout.singleton_minions(scenario);
        let singletons: BTreeMap<MinionId, BTreeSet<DagId>> = match self.hash(&singletons_key)? {
            Some(encoded) => encoded
                .iter()
                .map(|(minion, dags)| (minion.clone(), keys::decode_list(dags)))
                .collect(),
            None => return Ok(()),
        };

        let registry_key = layout.singletons_registry();
        let owner = self
            .hash(&registry_key)?
            .and_then(|registry| registry.get(scenario.as_str()))
            .cloned();
        if owner.is_some_and(|owner| owner != *channel) {
            return Ok(());
        }
        if !singletons.values().all(|dags| dags.is_subset(factory_dags)) {
            return Ok(());
        }

        self.hash_mut(&registry_key)?
            .insert(scenario.clone(), channel.clone());
        for (minion, dags) in singletons {
            let assigned = self.hash_mut(&layout.minion_assigned_dags(scenario, &minion))?;
            for dag in &dags {
                assigned.insert(dag.clone(), channel.clone());
            }
            outcome.assignments.insert(minion, dags);
        }
        self.entries.remove(&singletons_key);
        debug!(scenario = %scenario, channel = %channel, "Singleton minions claimed");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // COMPLETE
    // ═══════════════════════════════════════════════════════════════════════

    fn complete(&mut self, request: &CompleteRequest) -> Result<CampaignCompletionState, StoreError> {
        let CompleteRequest {
            layout,
            scenario,
            minion,
            dag_ids,
            might_restart,
        } = request;
        let mut state = CampaignCompletionState::default();

        let remaining_key = layout.minion_remaining_dags(scenario);
        let Some(current) = self.counter(&remaining_key, minion)? else {
            // Unknown minion, or campaign already purged.
            return Ok(state);
        };
        let done = i64::try_from(dag_ids.len()).unwrap_or(i64::MAX);
        let remaining = current.saturating_sub(done).max(0);
        if remaining > 0 {
            self.counters_mut(&remaining_key)?
                .insert(minion.clone(), remaining);
            return Ok(state);
        }
        state.minion_complete = true;

        let under_load_key = layout.under_load_minions(scenario);
        let is_under_load = self
            .set(&under_load_key)?
            .is_some_and(|minions| minions.contains(minion));
        if is_under_load && *might_restart {
            let total_key = layout.minion_total_dags(scenario);
            let total = self.counter(&total_key, minion)?.unwrap_or(current);
            self.counters_mut(&remaining_key)?
                .insert(minion.clone(), total);
            return Ok(state);
        }

        self.forget_minion(layout, scenario, minion)?;
        if !is_under_load {
            return Ok(state);
        }
        self.set_mut(&under_load_key)?.remove(minion);
        self.prune(&under_load_key);

        let scenario_left = self.increment(&layout.scenario_counters(scenario), MINIONS_FIELD, -1)?;
        if scenario_left > 0 {
            return Ok(state);
        }
        state.scenario_complete = true;

        let campaign_left = self.increment(&layout.campaign_counters(), SCENARIOS_FIELD, -1)?;
        if campaign_left > 0 {
            return Ok(state);
        }
        state.campaign_complete = true;

        let purged = self.delete_prefix(layout.campaign_prefix());
        debug!(prefix = %layout.campaign_prefix(), purged, "Campaign keys purged");
        Ok(state)
    }

    fn forget_minion(
        &mut self,
        layout: &KeyLayout,
        scenario: &str,
        minion: &MinionId,
    ) -> Result<(), StoreError> {
        for key in [
            layout.minion_remaining_dags(scenario),
            layout.minion_total_dags(scenario),
        ] {
            self.counters_mut(&key)?.remove(minion);
            self.prune(&key);
        }
        self.entries
            .remove(&layout.minion_assigned_dags(scenario, minion));
        self.entries
            .remove(&layout.minion_unassigned_dags(scenario, minion));
        Ok(())
    }
}

/// Coordination store living in the memory of the process.
#[derive(Debug, Default)]
pub struct InMemoryCoordinationStore {
    keyspace: Mutex<KeySpace>,
    loaded: RwLock<HashSet<PrimitiveHandle>>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every loaded primitive, as a store restart would.
    pub async fn evict_primitives(&self) {
        self.loaded.write().await.clear();
    }

    pub async fn is_loaded(&self, primitive: Primitive) -> bool {
        self.loaded.read().await.contains(&primitive.handle())
    }

    /// Keys currently present under a prefix, sorted.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let keyspace = self.keyspace.lock().await;
        let mut keys: Vec<String> = keyspace
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    async fn ensure_loaded(
        &self,
        handle: &PrimitiveHandle,
        primitive: Primitive,
    ) -> Result<(), StoreError> {
        let loaded = self.loaded.read().await;
        if *handle == primitive.handle() && loaded.contains(handle) {
            Ok(())
        } else {
            Err(StoreError::unknown_primitive(handle.clone()))
        }
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn load(&self, primitive: Primitive) -> Result<PrimitiveHandle, StoreError> {
        let handle = primitive.handle();
        self.loaded.write().await.insert(handle.clone());
        debug!(primitive = ?primitive, handle = %handle, "Primitive loaded");
        Ok(handle)
    }

    async fn register(
        &self,
        handle: &PrimitiveHandle,
        request: RegisterRequest,
    ) -> Result<usize, StoreError> {
        self.ensure_loaded(handle, Primitive::Register).await?;
        self.keyspace.lock().await.register(&request)
    }

    async fn assign(
        &self,
        handle: &PrimitiveHandle,
        request: AssignRequest,
    ) -> Result<AssignOutcome, StoreError> {
        self.ensure_loaded(handle, Primitive::Assign).await?;
        self.keyspace.lock().await.assign(&request)
    }

    async fn complete(
        &self,
        handle: &PrimitiveHandle,
        request: CompleteRequest,
    ) -> Result<CampaignCompletionState, StoreError> {
        self.ensure_loaded(handle, Primitive::Complete).await?;
        self.keyspace.lock().await.complete(&request)
    }

    async fn add_to_set(&self, key: &str, members: &[String]) -> Result<usize, StoreError> {
        let mut keyspace = self.keyspace.lock().await;
        let set = keyspace.set_mut(key)?;
        let added = members
            .iter()
            .filter(|member| set.insert((*member).clone()))
            .count();
        keyspace.prune(key);
        Ok(added)
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .keyspace
            .lock()
            .await
            .set(key)?
            .cloned()
            .unwrap_or_default())
    }

    async fn hash_set_all(
        &self,
        key: &str,
        fields: BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut keyspace = self.keyspace.lock().await;
        keyspace.hash_mut(key)?.extend(fields);
        keyspace.prune(key);
        Ok(())
    }

    async fn hash_set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let mut keyspace = self.keyspace.lock().await;
        let hash = keyspace.hash_mut(key)?;
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self
            .keyspace
            .lock()
            .await
            .hash(key)?
            .cloned()
            .unwrap_or_default())
    }

    async fn counter_set(&self, key: &str, field: &str, value: i64) -> Result<(), StoreError> {
        self.keyspace
            .lock()
            .await
            .counters_mut(key)?
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn counter_increment(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        self.keyspace.lock().await.increment(key, field, delta)
    }

    async fn counter_get(&self, key: &str, field: &str) -> Result<Option<i64>, StoreError> {
        self.keyspace.lock().await.counter(key, field)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut keyspace = self.keyspace.lock().await;
        Ok(keys
            .iter()
            .filter(|key| keyspace.entries.remove(key.as_str()).is_some())
            .count())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        Ok(self.keyspace.lock().await.delete_prefix(prefix))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.keyspace.lock().await.entries.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;

    fn layout() -> KeyLayout {
        KeyLayout::new("acme", "campaign-1")
    }

    async fn loaded_store() -> InMemoryCoordinationStore {
        let store = InMemoryCoordinationStore::new();
        store.load(Primitive::Assign).await.unwrap();
        store.load(Primitive::Complete).await.unwrap();
        store
    }

    async fn register(store: &InMemoryCoordinationStore, minions: &[&str], dags: &[&str]) {
        let layout = layout();
        let minions: Vec<String> = minions.iter().map(ToString::to_string).collect();
        let dags: Vec<String> = dags.iter().map(ToString::to_string).collect();
        store
            .add_to_set(&layout.unassigned_minions("s"), &minions)
            .await
            .unwrap();
        store
            .add_to_set(&layout.under_load_minions("s"), &minions)
            .await
            .unwrap();
        for minion in &minions {
            store
                .add_to_set(&layout.minion_unassigned_dags("s", minion), &dags)
                .await
                .unwrap();
            let count = i64::try_from(dags.len()).unwrap();
            store
                .counter_set(&layout.minion_remaining_dags("s"), minion, count)
                .await
                .unwrap();
        }
    }

    fn request(channel: &str, mode: AssignmentMode, capacity: u32) -> AssignRequest {
        AssignRequest {
            layout: layout(),
            scenario: "s".to_string(),
            channel: channel.to_string(),
            root_dag: "d1".to_string(),
            mode,
            batch_size: 10,
            capacity,
        }
    }

    #[tokio::test]
    async fn test_invocation_of_unloaded_primitive_fails() {
        let store = InMemoryCoordinationStore::new();
        let result = store
            .assign(
                &Primitive::Assign.handle(),
                request("c1", AssignmentMode::DistributedMinion, 10),
            )
            .await;
        assert!(matches!(result, Err(StoreError::UnknownPrimitive(_))));
    }

    #[tokio::test]
    async fn test_distributed_assign_splits_dags_by_factory_support() {
        let store = loaded_store().await;
        register(&store, &["m1"], &["d1", "d2"]).await;
        let layout = layout();
        store
            .add_to_set(&layout.factory_dags("s", "c1"), &["d1".to_string()])
            .await
            .unwrap();
        store
            .add_to_set(&layout.factory_dags("s", "c2"), &["d2".to_string()])
            .await
            .unwrap();
        let handle = Primitive::Assign.handle();

        let first = store
            .assign(&handle, request("c1", AssignmentMode::DistributedMinion, 10))
            .await
            .unwrap();
        let second = store
            .assign(&handle, request("c2", AssignmentMode::DistributedMinion, 10))
            .await
            .unwrap();

        assert_eq!(first.assignments["m1"], BTreeSet::from(["d1".to_string()]));
        assert_eq!(second.assignments["m1"], BTreeSet::from(["d2".to_string()]));
        let owners = store.hash_get_all(&layout.root_owners("s")).await.unwrap();
        assert_eq!(owners.get("m1").map(String::as_str), Some("c1"));
        assert!(!store.exists(&layout.unassigned_minions("s")).await.unwrap());
    }

    #[tokio::test]
    async fn test_single_location_assign_requires_root_dag() {
        let store = loaded_store().await;
        register(&store, &["m1"], &["d1", "d2"]).await;
        let layout = layout();
        store
            .add_to_set(&layout.factory_dags("s", "c2"), &["d2".to_string()])
            .await
            .unwrap();
        store
            .add_to_set(&layout.factory_dags("s", "c1"), &["d1".to_string()])
            .await
            .unwrap();
        let handle = Primitive::Assign.handle();

        let without_root = store
            .assign(&handle, request("c2", AssignmentMode::SingleLocation, 10))
            .await
            .unwrap();
        let with_root = store
            .assign(&handle, request("c1", AssignmentMode::SingleLocation, 10))
            .await
            .unwrap();

        assert_eq!(without_root.evaluated, 1);
        assert!(without_root.assignments.is_empty());
        assert_eq!(
            with_root.assignments["m1"],
            BTreeSet::from(["d1".to_string(), "d2".to_string()])
        );
    }

    #[tokio::test]
    async fn test_assign_stops_at_capacity() {
        let store = loaded_store().await;
        register(&store, &["m1", "m2", "m3"], &["d1"]).await;
        store
            .add_to_set(&layout().factory_dags("s", "c1"), &["d1".to_string()])
            .await
            .unwrap();

        let outcome = store
            .assign(
                &Primitive::Assign.handle(),
                request("c1", AssignmentMode::DistributedMinion, 2),
            )
            .await
            .unwrap();

        assert_eq!(outcome.assigned_under_load, 2);
        assert_eq!(outcome.assignments.len(), 2);
    }

    #[tokio::test]
    async fn test_complete_decrements_until_minion_done() {
        let store = loaded_store().await;
        register(&store, &["m1"], &["d1", "d2"]).await;
        let layout = layout();
        store
            .counter_set(&layout.scenario_counters("s"), MINIONS_FIELD, 2)
            .await
            .unwrap();
        let handle = Primitive::Complete.handle();
        let complete = |dags: Vec<&str>| CompleteRequest {
            layout: layout.clone(),
            scenario: "s".to_string(),
            minion: "m1".to_string(),
            dag_ids: dags.into_iter().map(ToString::to_string).collect(),
            might_restart: false,
        };

        let partial = store.complete(&handle, complete(vec!["d1"])).await.unwrap();
        let done = store.complete(&handle, complete(vec!["d2"])).await.unwrap();
        let again = store.complete(&handle, complete(vec!["d2"])).await.unwrap();

        assert_eq!(partial, CampaignCompletionState::default());
        assert!(done.minion_complete);
        assert!(!done.scenario_complete);
        assert_eq!(again, CampaignCompletionState::default());
    }

    #[tokio::test]
    async fn test_wrong_type_is_reported() {
        let store = InMemoryCoordinationStore::new();
        store.counter_set("k", "f", 1).await.unwrap();
        let result = store.add_to_set("k", &["x".to_string()]).await;
        assert!(matches!(result, Err(StoreError::WrongType { expected: "set", .. })));
    }
}
