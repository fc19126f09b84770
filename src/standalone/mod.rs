//! Standalone mode: a head and its factories in one process.
//!
//! The head and the simulated factories talk over in-process channel hubs
//! and the factories share one in-memory coordination store, the way
//! separate processes would share a message broker and a key-value store.

mod factory;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use horde_core::{
    ChannelHub, Directive, Feedback, FactoryConfiguration, FactoryScenarioAssignment, MinionId,
    ScenarioConfiguration, UlidIdGenerator,
};
use horde_factory::{
    CoordinationStore, FactoryConfig, InMemoryCoordinationStore, LocalAssignmentStore,
    MinionAssignmentKeeper, ScenarioRegistry,
};
use horde_head::{
    AbortConfiguration, CampaignExecutionContext, CampaignOrchestrator, CampaignOutcome,
    CampaignReport, InMemoryCampaignReportStateKeeper, InMemoryFactoryDirectory, RunningCampaign,
};

use crate::config::{CampaignConfig, HordeConfig};

pub use factory::{FactorySettings, SimulatedFactory, starting_lines};

/// Time left to the factories to settle once the campaign is complete.
const FACTORY_GRACE: Duration = Duration::from_secs(2);

/// Administrative abort requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortRequest {
    pub after: Duration,
    pub configuration: AbortConfiguration,
}

impl AbortRequest {
    pub const fn new(after: Duration, hard: bool) -> Self {
        let configuration = if hard {
            AbortConfiguration::hard()
        } else {
            AbortConfiguration::soft()
        };
        Self {
            after,
            configuration,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StandaloneRun {
    pub outcome: CampaignOutcome,
    pub report: Option<CampaignReport>,
}

/// Run the configured campaign to its end.
///
/// # Errors
///
/// Returns error if the configuration is invalid, the minions cannot be
/// registered or the campaign cannot be started.
pub async fn run(config: &HordeConfig, abort: Option<AbortRequest>) -> Result<StandaloneRun> {
    config.validate().map_err(|e| anyhow!(e)).context("Invalid configuration")?;
    let campaign = &config.campaign;
    let capacity = config.head.channel_capacity;
    let directives: Arc<ChannelHub<Directive>> = Arc::new(ChannelHub::with_capacity(capacity));
    let feedbacks: Arc<ChannelHub<Feedback>> = Arc::new(ChannelHub::with_capacity(capacity));

    let registry = Arc::new(campaign.scenario_registry());
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let nodes = campaign.factory_nodes();
    let keepers: Vec<Arc<MinionAssignmentKeeper>> = nodes
        .iter()
        .map(|node| keeper(config, node, &store, &registry))
        .collect();

    // The minions are registered once for the whole campaign.
    let registrar = keepers
        .first()
        .context("At least one factory is required")?;
    register_minions(registrar, campaign, &registry).await?;

    let settings = FactorySettings {
        broadcast_channel: config.head.broadcast_channel.clone(),
        feedback_channel: config.head.feedback_channel.clone(),
        schedule_ramp_up: campaign.schedule_ramp_up,
        minion_duration: campaign.minion_duration(),
    };
    let mut factories = Vec::with_capacity(keepers.len());
    for keeper in &keepers {
        let factory =
            SimulatedFactory::new(Arc::clone(keeper), Arc::clone(&feedbacks), settings.clone());
        factories.push(factory.spawn(&directives).await);
    }

    let directory = Arc::new(InMemoryFactoryDirectory::with_idle_nodes(nodes.iter().cloned()));
    let reports = Arc::new(InMemoryCampaignReportStateKeeper::new());
    let context = CampaignExecutionContext::new(directory, reports.clone(), Arc::new(UlidIdGenerator));
    let orchestrator = Arc::new(CampaignOrchestrator::new(
        config.head.clone(),
        context,
        Arc::clone(&directives),
        Arc::clone(&feedbacks),
    ));
    let listener = orchestrator.spawn_feedback_listener().await;

    let running = running_campaign(campaign, &keepers);
    orchestrator
        .start(running)
        .await
        .with_context(|| format!("Failed to start campaign '{}'", campaign.key))?;
    info!(campaign = %campaign.key, factories = nodes.len(), "Campaign running");

    let abort_timer = abort.map(|request| arm_abort(&orchestrator, &campaign.key, request));

    let outcome = orchestrator
        .wait_for_completion(&campaign.key)
        .await
        .with_context(|| format!("Campaign '{}' ended abnormally", campaign.key));

    if let Some(timer) = abort_timer {
        timer.abort();
    }
    settle(factories).await;
    listener.abort();
    orchestrator.shutdown().await;

    let outcome = outcome?;
    let report = reports.report(&campaign.key).await;
    info!(
        campaign = %outcome.key,
        successful = outcome.successful,
        status = ?report.as_ref().map(|report| report.status),
        "Campaign finished"
    );
    Ok(StandaloneRun { outcome, report })
}

fn keeper(
    config: &HordeConfig,
    node: &str,
    store: &Arc<dyn CoordinationStore>,
    registry: &Arc<ScenarioRegistry>,
) -> Arc<MinionAssignmentKeeper> {
    let factory_config = FactoryConfig {
        node_id: node.to_string(),
        unicast_channel: format!("{node}-unicast"),
        ..config.factory.clone()
    }
    .with_tenant(config.campaign.tenant.clone());
    Arc::new(MinionAssignmentKeeper::new(
        factory_config,
        Arc::clone(store),
        Arc::clone(registry),
        Arc::new(LocalAssignmentStore::new(Arc::clone(registry))),
    ))
}

async fn register_minions(
    keeper: &MinionAssignmentKeeper,
    campaign: &CampaignConfig,
    registry: &ScenarioRegistry,
) -> Result<()> {
    for scenario in &campaign.scenarios {
        let spec = registry
            .get(&scenario.name)
            .with_context(|| format!("Unknown scenario '{}'", scenario.name))?;
        let minions: Vec<MinionId> = (1..=scenario.minions)
            .map(|i| format!("{}-minion-{i}", scenario.name))
            .collect();
        keeper
            .register_minions_to_assign(
                &campaign.key,
                &scenario.name,
                &spec.under_load_dag_ids(),
                &minions,
                true,
            )
            .await
            .with_context(|| format!("Failed to register the minions of '{}'", scenario.name))?;
        debug!(campaign = %campaign.key, scenario = %scenario.name, minions = minions.len(), "Minions registered");
    }
    Ok(())
}

/// Every factory runs every scenario and takes at most its share of the
/// minions, so the work spreads across the factories.
fn running_campaign(
    campaign: &CampaignConfig,
    keepers: &[Arc<MinionAssignmentKeeper>],
) -> RunningCampaign {
    let factories = u32::try_from(keepers.len()).unwrap_or(u32::MAX).max(1);
    let scenarios = campaign.scenarios.iter().fold(
        RunningCampaign::new(campaign.key.clone(), campaign.tenant.clone())
            .with_speed_factor(campaign.speed_factor)
            .with_start_offset_ms(campaign.start_offset_ms)
            .with_schedule_ramp_up(campaign.schedule_ramp_up)
            .with_timeouts(campaign.soft_timeout(), campaign.hard_timeout()),
        |running, scenario| {
            running.with_scenario(
                scenario.name.clone(),
                ScenarioConfiguration::new(scenario.minions, scenario.execution_profile.clone()),
            )
        },
    );
    keepers.iter().fold(scenarios, |running, keeper| {
        let config = keeper.config();
        let factory = campaign.scenarios.iter().fold(
            FactoryConfiguration::new(config.unicast_channel.clone()),
            |factory, scenario| {
                factory.with_assignment(
                    FactoryScenarioAssignment::new(scenario.name.clone(), scenario.dags.clone())
                        .with_maximal_minion_count(scenario.minions.div_ceil(factories)),
                )
            },
        );
        running.with_factory(config.node_id.clone(), factory)
    })
}

fn arm_abort(
    orchestrator: &Arc<CampaignOrchestrator>,
    key: &str,
    request: AbortRequest,
) -> JoinHandle<()> {
    let orchestrator = Arc::clone(orchestrator);
    let key = key.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(request.after).await;
        info!(campaign = %key, hard = request.configuration.hard, "Aborting campaign");
        if let Err(e) = orchestrator.abort(&key, request.configuration).await {
            warn!(campaign = %key, error = %e, "Abort failed");
        }
    })
}

/// Wait for the factories to leave the campaign, then stop the stragglers.
async fn settle(factories: Vec<JoinHandle<()>>) {
    let aborts: Vec<_> = factories.iter().map(JoinHandle::abort_handle).collect();
    if tokio::time::timeout(FACTORY_GRACE, join_all(factories))
        .await
        .is_err()
    {
        warn!(grace_ms = FACTORY_GRACE.as_millis(), "Factories still running, stopping them");
        aborts.iter().for_each(tokio::task::AbortHandle::abort);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_each_factory_takes_its_share_of_minions() {
        let config = HordeConfig::default();
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let registry = Arc::new(config.campaign.scenario_registry());
        let keepers: Vec<_> = config
            .campaign
            .factory_nodes()
            .iter()
            .map(|node| keeper(&config, node, &store, &registry))
            .collect();

        let running = running_campaign(&config.campaign, &keepers);

        assert_eq!(running.factory_nodes(), vec!["factory-1", "factory-2"]);
        let factory = running.factories.get("factory-2").unwrap();
        assert_eq!(factory.unicast_channel, "factory-2-unicast");
        let checkout = factory.assignment.get("checkout").unwrap();
        assert_eq!(checkout.maximal_minion_count, 10);
        assert_eq!(checkout.dags, vec!["login", "checkout"]);
    }

    #[test]
    fn test_hard_abort_request() {
        let request = AbortRequest::new(Duration::from_millis(5), true);
        assert!(request.configuration.hard);
    }
}
