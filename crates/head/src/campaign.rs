//! The campaign as the head sees it while running it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use horde_core::{
    CampaignKey, ChannelName, FactoryConfiguration, NodeId, ScenarioConfiguration, ScenarioName,
    Tenant,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningCampaign {
    pub key: CampaignKey,
    pub tenant: Tenant,
    pub scenarios: BTreeMap<ScenarioName, ScenarioConfiguration>,
    /// Factories still taking part in the campaign, by node id.
    pub factories: BTreeMap<NodeId, FactoryConfiguration>,
    pub broadcast_channel: ChannelName,
    pub feedback_channel: ChannelName,
    /// Final message, set when the campaign fails.
    pub message: Option<String>,
    pub speed_factor: f64,
    pub start_offset_ms: u64,
    /// Whether the ramp-up is computed before the warm-up.
    pub schedule_ramp_up: bool,
    pub soft_timeout: Option<Duration>,
    pub hard_timeout: Option<Duration>,
}

impl RunningCampaign {
    pub fn new(key: impl Into<CampaignKey>, tenant: impl Into<Tenant>) -> Self {
        Self {
            key: key.into(),
            tenant: tenant.into(),
            scenarios: BTreeMap::new(),
            factories: BTreeMap::new(),
            broadcast_channel: "directives-broadcast".to_string(),
            feedback_channel: "feedbacks".to_string(),
            message: None,
            speed_factor: 1.0,
            start_offset_ms: 0,
            schedule_ramp_up: true,
            soft_timeout: None,
            hard_timeout: None,
        }
    }

    #[must_use]
    pub fn with_scenario(
        mut self,
        name: impl Into<ScenarioName>,
        configuration: ScenarioConfiguration,
    ) -> Self {
        self.scenarios.insert(name.into(), configuration);
        self
    }

    #[must_use]
    pub fn with_factory(mut self, node: impl Into<NodeId>, factory: FactoryConfiguration) -> Self {
        self.factories.insert(node.into(), factory);
        self
    }

    #[must_use]
    pub fn with_channels(
        mut self,
        broadcast: impl Into<ChannelName>,
        feedback: impl Into<ChannelName>,
    ) -> Self {
        self.broadcast_channel = broadcast.into();
        self.feedback_channel = feedback.into();
        self
    }

    #[must_use]
    pub const fn with_speed_factor(mut self, speed_factor: f64) -> Self {
        self.speed_factor = speed_factor;
        self
    }

    #[must_use]
    pub const fn with_start_offset_ms(mut self, start_offset_ms: u64) -> Self {
        self.start_offset_ms = start_offset_ms;
        self
    }

    #[must_use]
    pub const fn with_schedule_ramp_up(mut self, schedule_ramp_up: bool) -> Self {
        self.schedule_ramp_up = schedule_ramp_up;
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, soft: Option<Duration>, hard: Option<Duration>) -> Self {
        self.soft_timeout = soft;
        self.hard_timeout = hard;
        self
    }

    pub fn contains(&self, node: &str) -> bool {
        self.factories.contains_key(node)
    }

    pub fn factory_nodes(&self) -> Vec<NodeId> {
        self.factories.keys().cloned().collect()
    }

    pub fn scenario_names(&self) -> Vec<ScenarioName> {
        self.scenarios.keys().cloned().collect()
    }

    /// Scenarios assigned to each factory.
    pub fn scenarios_by_factory(&self) -> im::HashMap<NodeId, im::HashSet<ScenarioName>> {
        self.factories
            .iter()
            .filter(|(_, factory)| !factory.assignment.is_empty())
            .map(|(node, factory)| (node.clone(), factory.assignment.keys().cloned().collect()))
            .collect()
    }

    /// Remove a factory from the campaign.
    pub fn unassign_factory(&mut self, node: &str) -> Option<FactoryConfiguration> {
        self.factories.remove(node)
    }

    /// Remove a scenario from the assignment of a factory.
    ///
    /// Returns `true` when the factory has no scenario left; it stays in the
    /// campaign until the caller unassigns it.
    pub fn unassign_scenario_of_factory(&mut self, scenario: &str, node: &str) -> bool {
        self.factories.get_mut(node).is_some_and(|factory| {
            factory.assignment.remove(scenario);
            factory.assignment.is_empty()
        })
    }
}
