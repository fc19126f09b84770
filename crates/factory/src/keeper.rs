//! Minion assignment keeper.
//!
//! Registers the minions of a campaign in the coordination store, pulls
//! bounded batches of them for this factory and rolls the completion of
//! their DAGs up into minion, scenario and campaign completion.
//!
//! The atomic primitives are invoked by their content-hash handle. When the
//! store does not know the handle, the primitive is loaded again under the
//! reload lock and the invocation retried once; callers never see it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use horde_core::{
    CampaignCompletionState, ChannelName, DagId, FactoryScenarioAssignment, MinionId,
    MinionsStartingLine, ScenarioName,
};

use crate::config::FactoryConfig;
use crate::errors::KeeperError;
use crate::local_store::LocalAssignmentStore;
use crate::scenario_registry::ScenarioRegistry;
use crate::store::keys;
use crate::store::{
    AssignRequest, AssignmentMode, CompleteRequest, CoordinationStore, KeyLayout, Primitive,
    PrimitiveHandle, RegisterRequest, StoreError,
};

/// Minion to DAG to channel of the factory running it.
pub type FactoriesChannels = BTreeMap<MinionId, BTreeMap<DagId, ChannelName>>;

/// Minions assigned by one call, with their DAGs.
pub type Assignments = BTreeMap<MinionId, BTreeSet<DagId>>;

pub struct MinionAssignmentKeeper {
    config: FactoryConfig,
    store: Arc<dyn CoordinationStore>,
    registry: Arc<ScenarioRegistry>,
    local_store: Arc<LocalAssignmentStore>,
    register_handle: PrimitiveHandle,
    assign_handle: PrimitiveHandle,
    complete_handle: PrimitiveHandle,
    /// Only held while a primitive is reloaded.
    reload_lock: Mutex<()>,
    /// Maximal minion count by (campaign, scenario).
    limits: RwLock<HashMap<(String, ScenarioName), u32>>,
}

impl MinionAssignmentKeeper {
    pub fn new(
        config: FactoryConfig,
        store: Arc<dyn CoordinationStore>,
        registry: Arc<ScenarioRegistry>,
        local_store: Arc<LocalAssignmentStore>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            local_store,
            register_handle: Primitive::Register.handle(),
            assign_handle: Primitive::Assign.handle(),
            complete_handle: Primitive::Complete.handle(),
            reload_lock: Mutex::new(()),
            limits: RwLock::new(HashMap::new()),
        }
    }

    pub const fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn local_store(&self) -> &Arc<LocalAssignmentStore> {
        &self.local_store
    }

    const fn mode(&self) -> AssignmentMode {
        self.config.assignment.strategy
    }

    fn layout(&self, campaign_key: &str) -> KeyLayout {
        KeyLayout::new(&self.config.tenant, campaign_key)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REGISTRATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Record the DAGs this factory runs for each assigned scenario.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    pub async fn assign_factory_dags(
        &self,
        campaign_key: &str,
        assignments: &[FactoryScenarioAssignment],
    ) -> Result<(), KeeperError> {
        let layout = self.layout(campaign_key);
        let mut limits = self.limits.write().await;
        for assignment in assignments {
            self.store
                .add_to_set(
                    &layout.factory_dags(&assignment.scenario, &self.config.unicast_channel),
                    &assignment.dags,
                )
                .await?;
            limits.insert(
                (campaign_key.to_string(), assignment.scenario.clone()),
                assignment.maximal_minion_count,
            );
            debug!(
                campaign = %campaign_key,
                scenario = %assignment.scenario,
                dags = ?assignment.dags,
                "Factory DAGs recorded"
            );
        }
        Ok(())
    }

    /// Add minions to the pool of work to distribute.
    ///
    /// Registration is one atomic store operation and is idempotent: minions
    /// already registered or assigned are skipped, so registering them again
    /// never hands them to a second factory.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    pub async fn register_minions_to_assign(
        &self,
        campaign_key: &str,
        scenario: &str,
        dag_ids: &[DagId],
        minion_ids: &[MinionId],
        under_load: bool,
    ) -> Result<usize, KeeperError> {
        if minion_ids.is_empty() || dag_ids.is_empty() {
            return Ok(0);
        }
        let request = RegisterRequest {
            layout: self.layout(campaign_key),
            scenario: scenario.to_string(),
            dag_ids: dag_ids.to_vec(),
            minions: minion_ids.to_vec(),
            under_load,
            mode: self.mode(),
        };
        let registered = self
            .with_reload(Primitive::Register, || {
                self.store.register(&self.register_handle, request.clone())
            })
            .await?;
        debug!(
            campaign = %campaign_key,
            scenario = %scenario,
            requested = minion_ids.len(),
            registered,
            under_load,
            "Minions registered for assignment"
        );
        Ok(registered)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ASSIGNMENT
    // ═══════════════════════════════════════════════════════════════════════

    /// Pull minions for this factory until none is left to evaluate or the
    /// maximal minion count of the scenario is reached.
    ///
    /// # Errors
    ///
    /// Returns `AssignmentTimeout` when the loop exceeds its deadline, after
    /// releasing the scratch keys of this factory.
    pub async fn assign(
        &self,
        campaign_key: &str,
        scenario: &str,
    ) -> Result<Assignments, KeeperError> {
        let spec = self
            .registry
            .get(scenario)
            .ok_or_else(|| KeeperError::unknown_scenario(scenario))?;
        let root_dag = spec
            .root_under_load_dag()
            .or_else(|| spec.root_dag())
            .map(|dag| dag.id.clone())
            .ok_or_else(|| KeeperError::MissingRootDag(scenario.to_string()))?;
        let limit = self
            .limits
            .read()
            .await
            .get(&(campaign_key.to_string(), scenario.to_string()))
            .copied()
            .unwrap_or(u32::MAX);
        let layout = self.layout(campaign_key);
        let deadline = self.config.assignment.timeout();

        let result = timeout(deadline, self.assign_loop(&layout, scenario, &root_dag, limit)).await;

        let scratch = layout.evaluated_minions(scenario, &self.config.unicast_channel);
        if let Err(e) = self.store.delete(&[scratch]).await {
            warn!(error = %e, scenario = %scenario, "Failed to release the assignment scratch key");
        }

        let assignments = match result {
            Ok(assignments) => assignments?,
            Err(_) => {
                warn!(
                    campaign = %campaign_key,
                    scenario = %scenario,
                    timeout_ms = deadline.as_millis(),
                    "Assignment timeout exceeded"
                );
                return Err(KeeperError::assignment_timeout(campaign_key, scenario, deadline));
            }
        };

        self.local_store.save(scenario, &assignments).await;
        info!(
            campaign = %campaign_key,
            scenario = %scenario,
            minions = assignments.len(),
            "Minions assigned to factory"
        );
        Ok(assignments)
    }

    async fn assign_loop(
        &self,
        layout: &KeyLayout,
        scenario: &str,
        root_dag: &DagId,
        limit: u32,
    ) -> Result<Assignments, KeeperError> {
        let mut assignments = Assignments::new();
        let mut assigned_under_load: u32 = 0;

        loop {
            let capacity = limit.saturating_sub(assigned_under_load);
            if capacity == 0 {
                debug!(scenario = %scenario, limit, "Maximal minion count reached");
                break;
            }
            let request = AssignRequest {
                layout: layout.clone(),
                scenario: scenario.to_string(),
                channel: self.config.unicast_channel.clone(),
                root_dag: root_dag.clone(),
                mode: self.mode(),
                batch_size: self.config.assignment.evaluation_batch_size,
                capacity,
            };
            let outcome = self
                .with_reload(Primitive::Assign, || {
                    self.store.assign(&self.assign_handle, request.clone())
                })
                .await?;

            assigned_under_load = assigned_under_load.saturating_add(outcome.assigned_under_load);
            for (minion, dags) in outcome.assignments {
                assignments.entry(minion).or_default().extend(dags);
            }
            if outcome.evaluated == 0 {
                break;
            }
        }
        Ok(assignments)
    }

    /// Invoke a primitive, loading it again once if the store forgot it.
    async fn with_reload<T, F, Fut>(&self, primitive: Primitive, invoke: F) -> Result<T, KeeperError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match invoke().await {
            Err(StoreError::UnknownPrimitive(handle)) => {
                {
                    let _guard = self.reload_lock.lock().await;
                    let loaded = self.store.load(primitive).await?;
                    debug!(primitive = ?primitive, stale = %handle, loaded = %loaded, "Primitive reloaded");
                }
                Ok(invoke().await?)
            }
            other => Ok(other?),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════

    /// # Errors
    ///
    /// Returns error if the store fails.
    pub async fn get_ids_of_minions_under_load(
        &self,
        campaign_key: &str,
        scenario: &str,
    ) -> Result<Vec<MinionId>, KeeperError> {
        let layout = self.layout(campaign_key);
        Ok(self
            .store
            .set_members(&layout.under_load_minions(scenario))
            .await?
            .into_iter()
            .collect())
    }

    /// Resolve which factory runs each (minion, DAG) pair.
    ///
    /// In single-location mode all the DAGs of a minion run in the factory
    /// owning it, so the answer is always this factory's channel.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    pub async fn get_factories_channels(
        &self,
        campaign_key: &str,
        scenario: &str,
        minion_ids: &[MinionId],
        dag_ids: &[DagId],
    ) -> Result<FactoriesChannels, KeeperError> {
        if self.mode() == AssignmentMode::SingleLocation {
            return Ok(minion_ids
                .iter()
                .map(|minion| {
                    let channels = dag_ids
                        .iter()
                        .map(|dag| (dag.clone(), self.config.unicast_channel.clone()))
                        .collect();
                    (minion.clone(), channels)
                })
                .collect());
        }

        let layout = self.layout(campaign_key);
        let mut channels = FactoriesChannels::new();
        for minion in minion_ids {
            let assigned = self
                .store
                .hash_get_all(&layout.minion_assigned_dags(scenario, minion))
                .await?;
            let resolved: BTreeMap<DagId, ChannelName> = assigned
                .into_iter()
                .filter(|(dag, _)| dag_ids.contains(dag))
                .collect();
            channels.insert(minion.clone(), resolved);
        }
        Ok(channels)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // COMPLETION
    // ═══════════════════════════════════════════════════════════════════════

    /// Record the completion of DAGs of a minion.
    ///
    /// Once the campaign is complete, its keys are purged from the store and
    /// the local assignments are reset; later calls for the campaign are
    /// no-ops.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    pub async fn execution_complete(
        &self,
        campaign_key: &str,
        scenario: &str,
        minion: &str,
        dag_ids: &[DagId],
        might_restart: bool,
    ) -> Result<CampaignCompletionState, KeeperError> {
        let request = CompleteRequest {
            layout: self.layout(campaign_key),
            scenario: scenario.to_string(),
            minion: minion.to_string(),
            dag_ids: dag_ids.to_vec(),
            might_restart,
        };
        let state = self
            .with_reload(Primitive::Complete, || {
                self.store.complete(&self.complete_handle, request.clone())
            })
            .await?;

        if state.scenario_complete {
            info!(campaign = %campaign_key, scenario = %scenario, "Scenario complete");
        }
        if state.campaign_complete {
            info!(campaign = %campaign_key, "Campaign complete, resetting assignments");
            self.local_store.reset().await;
            self.limits
                .write()
                .await
                .retain(|(campaign, _), _| campaign != campaign_key);
        }
        Ok(state)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RAMP-UP SCHEDULE
    // ═══════════════════════════════════════════════════════════════════════

    /// Spread the under-load minions of a scenario over starting lines.
    ///
    /// # Errors
    ///
    /// Returns `UnscheduledMinions` when the lines cannot start every minion;
    /// nothing is written in that case.
    pub async fn schedule(
        &self,
        campaign_key: &str,
        scenario: &str,
        starting_lines: impl IntoIterator<Item = MinionsStartingLine>,
    ) -> Result<(), KeeperError> {
        let layout = self.layout(campaign_key);
        let minions = self.get_ids_of_minions_under_load(campaign_key, scenario).await?;
        let mut pending = minions.into_iter();
        let mut plan: BTreeMap<u64, Vec<MinionId>> = BTreeMap::new();

        for line in starting_lines {
            let count = usize::try_from(line.count).unwrap_or(usize::MAX);
            let starting: Vec<MinionId> = pending.by_ref().take(count).collect();
            if starting.is_empty() {
                break;
            }
            plan.entry(line.offset_ms).or_default().extend(starting);
        }

        let unscheduled = pending.count();
        if unscheduled > 0 {
            return Err(KeeperError::UnscheduledMinions(unscheduled, scenario.to_string()));
        }

        let encoded = plan
            .iter()
            .map(|(offset, minions)| (offset.to_string(), keys::encode_list(minions)))
            .collect();
        self.store
            .hash_set_all(&layout.schedule(scenario), encoded)
            .await?;
        debug!(campaign = %campaign_key, scenario = %scenario, lines = plan.len(), "Ramp-up scheduled");
        Ok(())
    }

    /// Read the plan written by [`MinionAssignmentKeeper::schedule`], by
    /// start offset in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    pub async fn read_schedule_plan(
        &self,
        campaign_key: &str,
        scenario: &str,
    ) -> Result<BTreeMap<u64, Vec<MinionId>>, KeeperError> {
        let layout = self.layout(campaign_key);
        let encoded = self
            .store
            .hash_get_all(&layout.schedule(scenario))
            .await?;
        Ok(encoded
            .into_iter()
            .filter_map(|(offset, minions)| {
                offset
                    .parse::<u64>()
                    .ok()
                    .map(|offset| (offset, keys::decode_list::<Vec<MinionId>>(&minions)))
            })
            .collect())
    }
}
