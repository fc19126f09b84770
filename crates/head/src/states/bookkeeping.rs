//! Factory bookkeeping shared by the phases.

use tracing::{info, warn};

use horde_core::{Feedback, NodeId, ScenarioName};

use crate::campaign::RunningCampaign;
use crate::context::CampaignExecutionContext;

/// A factory declining a scenario, or the whole campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declined {
    pub node: NodeId,
    pub scenario: Option<ScenarioName>,
    /// The factory had nothing left to run and went back to the pool.
    pub released: bool,
}

/// Unassign what a factory declined and release it when it has no scenario
/// left.
///
/// Returns `None` when the factory is not part of the campaign anymore.
pub async fn decline(
    ctx: &CampaignExecutionContext,
    campaign: &mut RunningCampaign,
    feedback: &Feedback,
) -> Option<Declined> {
    let node = feedback.node_id.clone();
    if !campaign.contains(&node) {
        return None;
    }
    let scenario = feedback.scenario().map(ToString::to_string);
    let empty = scenario
        .as_deref()
        .is_none_or(|scenario| campaign.unassign_scenario_of_factory(scenario, &node));
    warn!(
        campaign = %campaign.key,
        node = %node,
        scenario = ?scenario,
        "Factory declined its assignment"
    );

    if empty {
        campaign.unassign_factory(&node);
        if let Err(e) = ctx
            .factory_directory
            .release(campaign, std::slice::from_ref(&node))
            .await
        {
            warn!(campaign = %campaign.key, node = %node, error = %e, "Failed to release factory");
        }
        info!(campaign = %campaign.key, node = %node, "Factory released, nothing left to run");
    }
    Some(Declined {
        node,
        scenario,
        released: empty,
    })
}

/// Remove the factories that cannot answer anymore.
///
/// Returns `false`, leaving the campaign untouched, when none of them is
/// healthy. A directory failure counts every factory as healthy.
pub async fn keep_healthy_factories(
    ctx: &CampaignExecutionContext,
    campaign: &mut RunningCampaign,
) -> bool {
    let nodes = campaign.factory_nodes();
    let health = match ctx.factory_directory.health(&nodes).await {
        Ok(health) => health,
        Err(e) => {
            warn!(campaign = %campaign.key, error = %e, "Factory health unavailable, keeping all factories");
            return !nodes.is_empty();
        }
    };
    let (healthy, unhealthy): (Vec<NodeId>, Vec<NodeId>) = nodes
        .into_iter()
        .partition(|node| health.get(node).is_some_and(|state| state.is_healthy()));
    if healthy.is_empty() {
        return false;
    }
    for node in &unhealthy {
        warn!(campaign = %campaign.key, node = %node, state = ?health.get(node), "Unhealthy factory left out of the abort");
        campaign.unassign_factory(node);
    }
    true
}
