//! A factory running in the same process as the head.
//!
//! It answers every directive of the campaigns it joined, competes with its
//! siblings for minions through the keeper and runs each minion by waiting
//! for a fixed duration before reporting its completion.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use horde_core::{
    CampaignKey, ChannelHub, ChannelName, DagId, Directive, DirectiveKind, Error, ExecutionProfile,
    FactoryScenarioAssignment, Feedback, FeedbackKind, MinionId, MinionsStartingLine, NodeId,
    ScenarioName,
};
use horde_factory::{MinionAssignmentKeeper, Teardown};

/// Minions to start after a delay, with the DAGs they run.
type StartingGroup = (Duration, Vec<(MinionId, Vec<DagId>)>);

#[derive(Debug, Clone)]
pub struct FactorySettings {
    pub broadcast_channel: ChannelName,
    pub feedback_channel: ChannelName,
    /// Whether the head asks for a ramp-up schedule before the warm-up.
    pub schedule_ramp_up: bool,
    pub minion_duration: Duration,
}

impl FactorySettings {
    /// Ramp-up preparation directives received per scenario before the
    /// minions start.
    const fn preparations_before_start(&self) -> usize {
        if self.schedule_ramp_up { 2 } else { 1 }
    }
}

/// Publishes the feedbacks of one factory.
#[derive(Clone)]
struct FeedbackLink {
    node: NodeId,
    channel: ChannelName,
    feedbacks: Arc<ChannelHub<Feedback>>,
}

impl FeedbackLink {
    async fn send(&self, campaign: &str, kind: FeedbackKind, result: Result<(), String>) {
        let feedback = match result {
            Ok(()) => Feedback::completed(campaign, self.node.clone(), kind),
            Err(error) => {
                warn!(node = %self.node, campaign = %campaign, error = %error, "Reporting a failure");
                Feedback::failed(campaign, self.node.clone(), kind, error)
            }
        };
        self.feedbacks.publish(&self.channel, feedback).await;
    }
}

pub struct SimulatedFactory {
    keeper: Arc<MinionAssignmentKeeper>,
    teardown: Teardown,
    link: FeedbackLink,
    settings: FactorySettings,
    /// Scenarios this factory runs, by campaign.
    assigned: HashMap<CampaignKey, HashSet<ScenarioName>>,
    preparations: HashMap<(CampaignKey, ScenarioName), usize>,
    running: Vec<JoinHandle<()>>,
}

impl SimulatedFactory {
    pub fn new(
        keeper: Arc<MinionAssignmentKeeper>,
        feedbacks: Arc<ChannelHub<Feedback>>,
        settings: FactorySettings,
    ) -> Self {
        let config = keeper.config();
        let link = FeedbackLink {
            node: config.node_id.clone(),
            channel: settings.feedback_channel.clone(),
            feedbacks,
        };
        Self {
            teardown: Teardown::new(config.teardown.clone()),
            keeper,
            link,
            settings,
            assigned: HashMap::new(),
            preparations: HashMap::new(),
            running: Vec::new(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.link.node
    }

    /// Subscribe to the broadcast and unicast channels, then handle the
    /// directives until the last joined campaign completes.
    pub async fn spawn(self, directives: &ChannelHub<Directive>) -> JoinHandle<()> {
        let mut broadcast = directives.subscribe(&self.settings.broadcast_channel).await;
        let mut unicast = directives
            .subscribe(&self.keeper.config().unicast_channel)
            .await;
        let mut factory = self;
        tokio::spawn(async move {
            info!(node = %factory.node_id(), "Simulated factory started");
            loop {
                let received = tokio::select! {
                    directive = broadcast.recv() => directive,
                    directive = unicast.recv() => directive,
                };
                match received {
                    Ok(directive) => {
                        if factory.handle(directive).await {
                            break;
                        }
                    }
                    Err(Error::ChannelLagged { channel, skipped }) => {
                        warn!(node = %factory.node_id(), channel = %channel, skipped, "Directives lagged");
                    }
                    Err(e) => {
                        debug!(node = %factory.node_id(), error = %e, "Directive channel closed");
                        break;
                    }
                }
            }
            factory.stop_minions();
            info!(node = %factory.node_id(), "Simulated factory stopped");
        })
    }

    /// Returns `true` once no joined campaign is left.
    async fn handle(&mut self, directive: Directive) -> bool {
        let key = directive.campaign_key;
        trace!(node = %self.link.node, campaign = %key, channel = %directive.channel, "Directive received");

        match directive.kind {
            DirectiveKind::FactoryAssignment { assignments } => {
                self.join(&key, &assignments).await;
            }

            // Answered even before joining, so an early abort never stalls.
            DirectiveKind::CampaignAbort { scenarios, hard } => {
                let stopped = self.stop_minions();
                info!(node = %self.link.node, campaign = %key, hard, stopped, "Campaign aborted");
                let minions = self.local_minions(&scenarios).await;
                let result = self.tear_down("abort", minions).await;
                self.link.send(&key, FeedbackKind::CampaignAbort, result).await;
            }

            DirectiveKind::CampaignShutdown => {
                self.stop_minions();
                let scenarios: Vec<ScenarioName> = self
                    .assigned
                    .get(&key)
                    .map(|scenarios| scenarios.iter().cloned().collect())
                    .unwrap_or_default();
                let minions = self.local_minions(&scenarios).await;
                let result = self.tear_down("campaign", minions).await;
                self.link.send(&key, FeedbackKind::CampaignShutdown, result).await;
            }

            _ if !self.assigned.contains_key(&key) => {
                trace!(node = %self.link.node, campaign = %key, "Directive of another campaign ignored");
            }

            DirectiveKind::MinionsDeclaration {
                scenario,
                minions_count,
            } => {
                if self.runs(&key, &scenario) {
                    self.assign_minions(&key, scenario, minions_count).await;
                }
            }

            DirectiveKind::MinionsRampUpPreparation {
                scenario,
                execution_profile,
                start_offset_ms,
                speed_factor,
            } => {
                if self.runs(&key, &scenario) {
                    self.prepare(&key, scenario, &execution_profile, start_offset_ms, speed_factor)
                        .await;
                }
            }

            DirectiveKind::ScenarioWarmUp { scenario } => {
                if self.runs(&key, &scenario) {
                    self.link
                        .send(&key, FeedbackKind::ScenarioWarmUp { scenario }, Ok(()))
                        .await;
                }
            }

            DirectiveKind::MinionsShutdown {
                scenario,
                minion_ids,
            } => {
                if let Err(e) = self.tear_down(&scenario, minion_ids).await {
                    warn!(node = %self.link.node, scenario = %scenario, error = %e, "Minions shutdown incomplete");
                }
            }

            DirectiveKind::CampaignScenarioShutdown { scenario } => {
                if self.runs(&key, &scenario) {
                    let minions = self.local_minions(std::slice::from_ref(&scenario)).await;
                    let result = self.tear_down(&scenario, minions).await;
                    self.link
                        .send(&key, FeedbackKind::CampaignScenarioShutdown { scenario }, result)
                        .await;
                }
            }

            DirectiveKind::CompleteCampaign {
                successful,
                message,
            } => {
                let left = self.leave(&key, successful, message.as_deref()).await;
                return left && self.assigned.is_empty();
            }
        }
        false
    }

    fn runs(&self, key: &str, scenario: &str) -> bool {
        self.assigned
            .get(key)
            .is_some_and(|scenarios| scenarios.contains(scenario))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CAMPAIGN MEMBERSHIP
    // ═══════════════════════════════════════════════════════════════════════

    async fn join(&mut self, key: &str, assignments: &[FactoryScenarioAssignment]) {
        let result = self
            .keeper
            .assign_factory_dags(key, assignments)
            .await
            .map_err(|e| e.to_string());
        if result.is_ok() {
            let scenarios = assignments.iter().map(|a| a.scenario.clone()).collect();
            self.assigned.insert(key.to_string(), scenarios);
            info!(node = %self.link.node, campaign = %key, scenarios = assignments.len(), "Joined campaign");
        }
        self.link
            .send(key, FeedbackKind::FactoryAssignment { scenario: None }, result)
            .await;
    }

    async fn leave(&mut self, key: &str, successful: bool, message: Option<&str>) -> bool {
        if self.assigned.remove(key).is_none() {
            return false;
        }
        self.preparations.retain(|(campaign, _), _| campaign != key);
        self.stop_minions();
        self.keeper.local_store().reset().await;
        info!(
            node = %self.link.node,
            campaign = %key,
            successful,
            message = message.unwrap_or_default(),
            "Left campaign"
        );
        true
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MINIONS
    // ═══════════════════════════════════════════════════════════════════════

    async fn assign_minions(&self, key: &str, scenario: ScenarioName, declared: u32) {
        let result = match self.keeper.assign(key, &scenario).await {
            Ok(assignments) => {
                debug!(
                    node = %self.link.node,
                    scenario = %scenario,
                    declared,
                    assigned = assignments.len(),
                    "Minions assigned"
                );
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        };
        self.link
            .send(key, FeedbackKind::MinionsAssignment { scenario }, result)
            .await;
    }

    /// The last preparation of a scenario starts its minions; the one
    /// before, if any, schedules the ramp-up.
    async fn prepare(
        &mut self,
        key: &str,
        scenario: ScenarioName,
        profile: &ExecutionProfile,
        start_offset_ms: u64,
        speed_factor: f64,
    ) {
        let seen = self
            .preparations
            .entry((key.to_string(), scenario.clone()))
            .or_insert(0);
        *seen = seen.saturating_add(1);
        let seen = *seen;
        let expected = self.settings.preparations_before_start();

        if seen < expected {
            let result = self.schedule(key, &scenario, profile, start_offset_ms).await;
            self.link
                .send(key, FeedbackKind::MinionsRampUpPreparation { scenario }, result)
                .await;
        } else if seen == expected {
            match self.plan_minions(key, &scenario, start_offset_ms, speed_factor).await {
                Ok(groups) => {
                    let kind = FeedbackKind::MinionsStart {
                        scenario: scenario.clone(),
                    };
                    self.link.send(key, kind, Ok(())).await;
                    self.start_minions(key, &scenario, groups);
                }
                Err(e) => {
                    self.link
                        .send(key, FeedbackKind::MinionsStart { scenario }, Err(e))
                        .await;
                }
            }
        } else {
            debug!(node = %self.link.node, scenario = %scenario, "Minions already started");
        }
    }

    async fn schedule(
        &self,
        key: &str,
        scenario: &str,
        profile: &ExecutionProfile,
        start_offset_ms: u64,
    ) -> Result<(), String> {
        let total = self
            .keeper
            .get_ids_of_minions_under_load(key, scenario)
            .await
            .map_err(|e| e.to_string())?
            .len();
        self.keeper
            .schedule(key, scenario, starting_lines(profile, total, start_offset_ms))
            .await
            .map_err(|e| e.to_string())
    }

    /// Minions whose root DAG runs here, grouped by start delay.
    async fn plan_minions(
        &self,
        key: &str,
        scenario: &str,
        start_offset_ms: u64,
        speed_factor: f64,
    ) -> Result<Vec<StartingGroup>, String> {
        let local = self.keeper.local_store().assignments_of(scenario).await;
        let plan: BTreeMap<u64, Vec<MinionId>> = if self.settings.schedule_ramp_up {
            self.keeper
                .read_schedule_plan(key, scenario)
                .await
                .map_err(|e| e.to_string())?
        } else {
            BTreeMap::from([(start_offset_ms, local.keys().cloned().collect())])
        };

        let mut groups: Vec<StartingGroup> = Vec::new();
        for (offset_ms, minions) in plan {
            let mut group = Vec::new();
            for minion in minions {
                if !self
                    .keeper
                    .local_store()
                    .has_root_under_load_locally(scenario, &minion)
                    .await
                {
                    continue;
                }
                let dags = local
                    .get(&minion)
                    .map(|dags| dags.iter().cloned().collect())
                    .unwrap_or_default();
                group.push((minion, dags));
            }
            if !group.is_empty() {
                groups.push((scaled(offset_ms, speed_factor), group));
            }
        }
        Ok(groups)
    }

    fn start_minions(&mut self, key: &str, scenario: &str, groups: Vec<StartingGroup>) {
        let started: usize = groups.iter().map(|(_, group)| group.len()).sum();
        let runner = MinionRunner {
            keeper: Arc::clone(&self.keeper),
            link: self.link.clone(),
            duration: self.settings.minion_duration,
        };
        let (key, scenario_name) = (key.to_string(), scenario.to_string());
        self.running.push(tokio::spawn(async move {
            runner.run(&key, &scenario_name, groups).await;
        }));
        info!(node = %self.link.node, scenario = %scenario, minions = started, "Minions started");
    }

    fn stop_minions(&mut self) -> usize {
        let handles: Vec<JoinHandle<()>> = self.running.drain(..).collect();
        handles.iter().for_each(JoinHandle::abort);
        handles.len()
    }

    async fn local_minions(&self, scenarios: &[ScenarioName]) -> Vec<MinionId> {
        let mut minions = Vec::new();
        for scenario in scenarios {
            minions.extend(self.keeper.local_store().assignments_of(scenario).await.keys().cloned());
        }
        minions
    }

    async fn tear_down(&self, label: &str, minions: Vec<MinionId>) -> Result<(), String> {
        let stats = self
            .teardown
            .run(label, minions, |minion| async move {
                trace!(minion = %minion, "Minion stopped");
                Ok::<(), String>(())
            })
            .await
            .map_err(|e| e.to_string())?;
        debug!(
            node = %self.link.node,
            label,
            done = stats.done,
            failed = stats.failed,
            timed_out = stats.timed_out,
            "Teardown complete"
        );
        Ok(())
    }
}

/// Runs the minions of one scenario of a factory.
struct MinionRunner {
    keeper: Arc<MinionAssignmentKeeper>,
    link: FeedbackLink,
    duration: Duration,
}

impl MinionRunner {
    async fn run(&self, key: &str, scenario: &str, groups: Vec<StartingGroup>) {
        join_all(groups.into_iter().map(|(delay, minions)| async move {
            tokio::time::sleep(delay).await;
            join_all(
                minions
                    .into_iter()
                    .map(|(minion, dags)| self.run_minion(key, scenario, minion, dags)),
            )
            .await;
        }))
        .await;
    }

    async fn run_minion(&self, key: &str, scenario: &str, minion: MinionId, dags: Vec<DagId>) {
        tokio::time::sleep(self.duration).await;
        match self
            .keeper
            .execution_complete(key, scenario, &minion, &dags, false)
            .await
        {
            Ok(state) => {
                if state.minion_complete {
                    let kind = FeedbackKind::CompleteMinion {
                        scenario: scenario.to_string(),
                        minion_id: minion,
                    };
                    self.link.send(key, kind, Ok(())).await;
                }
                if state.scenario_complete {
                    let kind = FeedbackKind::EndOfCampaignScenario {
                        scenario: scenario.to_string(),
                    };
                    self.link.send(key, kind, Ok(())).await;
                }
            }
            Err(e) => {
                self.link
                    .send(key, FeedbackKind::FailedCampaign, Err(e.to_string()))
                    .await;
            }
        }
    }
}

/// Offset of a starting line once the speed factor applies.
fn scaled(offset_ms: u64, speed_factor: f64) -> Duration {
    let offset = Duration::from_millis(offset_ms);
    if speed_factor.is_finite() && speed_factor > 0.0 {
        offset.div_f64(speed_factor)
    } else {
        offset
    }
}

/// Starting lines of an execution profile.
///
/// The `regular` profile starts `minions_per_period` minions every
/// `period_ms`. Every other profile starts all the minions at once.
pub fn starting_lines(
    profile: &ExecutionProfile,
    total: usize,
    start_offset_ms: u64,
) -> Vec<MinionsStartingLine> {
    let total = u32::try_from(total).unwrap_or(u32::MAX);
    let parameter = |name: &str| profile.parameters.get(name).and_then(Value::as_u64);
    let regular = (profile.kind == "regular")
        .then(|| parameter("period_ms").zip(parameter("minions_per_period")))
        .flatten()
        .and_then(|(period, per_period)| Some((period, u32::try_from(per_period).ok()?)))
        .filter(|(_, per_period)| *per_period > 0);

    match regular {
        Some((period_ms, per_period)) => (0..total.div_ceil(per_period))
            .map(|line| {
                let offset = u64::from(line).saturating_mul(period_ms);
                MinionsStartingLine::new(per_period, start_offset_ms.saturating_add(offset))
            })
            .collect(),
        None => vec![MinionsStartingLine::new(total, start_offset_ms)],
    }
}
