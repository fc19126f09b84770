//! Directives sent by the head to the factories.

use serde::{Deserialize, Serialize};

use crate::types::{
    CampaignKey, ChannelName, ExecutionProfile, FactoryScenarioAssignment, MinionId, ScenarioName,
};

/// Unique identifier of a directive.
pub type DirectiveId = String;

/// A command published by the head on a broadcast or unicast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub id: DirectiveId,
    pub campaign_key: CampaignKey,
    /// Broadcast channel or a factory's unicast channel.
    pub channel: ChannelName,
    pub kind: DirectiveKind,
}

/// Payload of a directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectiveKind {
    /// Scenarios and DAGs a factory has to run.
    FactoryAssignment {
        assignments: Vec<FactoryScenarioAssignment>,
    },
    /// Number of minions to create for a scenario.
    MinionsDeclaration {
        scenario: ScenarioName,
        minions_count: u32,
    },
    /// Prepare the ramp-up of a scenario.
    MinionsRampUpPreparation {
        scenario: ScenarioName,
        execution_profile: ExecutionProfile,
        start_offset_ms: u64,
        speed_factor: f64,
    },
    ScenarioWarmUp {
        scenario: ScenarioName,
    },
    MinionsShutdown {
        scenario: ScenarioName,
        minion_ids: Vec<MinionId>,
    },
    CampaignScenarioShutdown {
        scenario: ScenarioName,
    },
    CampaignAbort {
        scenarios: Vec<ScenarioName>,
        hard: bool,
    },
    CampaignShutdown,
    /// Final signal of a campaign.
    CompleteCampaign {
        successful: bool,
        message: Option<String>,
    },
}

impl Directive {
    pub fn new(
        id: impl Into<DirectiveId>,
        campaign_key: impl Into<CampaignKey>,
        channel: impl Into<ChannelName>,
        kind: DirectiveKind,
    ) -> Self {
        Self {
            id: id.into(),
            campaign_key: campaign_key.into(),
            channel: channel.into(),
            kind,
        }
    }

    /// Scenario targeted by the directive, if any.
    pub fn scenario(&self) -> Option<&str> {
        match &self.kind {
            DirectiveKind::MinionsDeclaration { scenario, .. }
            | DirectiveKind::MinionsRampUpPreparation { scenario, .. }
            | DirectiveKind::ScenarioWarmUp { scenario }
            | DirectiveKind::MinionsShutdown { scenario, .. }
            | DirectiveKind::CampaignScenarioShutdown { scenario } => Some(scenario.as_str()),
            DirectiveKind::FactoryAssignment { .. }
            | DirectiveKind::CampaignAbort { .. }
            | DirectiveKind::CampaignShutdown
            | DirectiveKind::CompleteCampaign { .. } => None,
        }
    }

    /// Short name of the directive kind, for logs.
    pub const fn name(&self) -> &'static str {
        match self.kind {
            DirectiveKind::FactoryAssignment { .. } => "factory-assignment",
            DirectiveKind::MinionsDeclaration { .. } => "minions-declaration",
            DirectiveKind::MinionsRampUpPreparation { .. } => "minions-ramp-up-preparation",
            DirectiveKind::ScenarioWarmUp { .. } => "scenario-warm-up",
            DirectiveKind::MinionsShutdown { .. } => "minions-shutdown",
            DirectiveKind::CampaignScenarioShutdown { .. } => "campaign-scenario-shutdown",
            DirectiveKind::CampaignAbort { .. } => "campaign-abort",
            DirectiveKind::CampaignShutdown => "campaign-shutdown",
            DirectiveKind::CompleteCampaign { .. } => "complete-campaign",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_of_scoped_directive() {
        let directive = Directive::new(
            "d-1",
            "c-1",
            "broadcast",
            DirectiveKind::ScenarioWarmUp {
                scenario: "scenario-1".to_string(),
            },
        );
        assert_eq!(directive.scenario(), Some("scenario-1"));
        assert_eq!(directive.name(), "scenario-warm-up");
    }

    #[test]
    fn test_campaign_wide_directive_has_no_scenario() {
        let directive = Directive::new("d-2", "c-1", "broadcast", DirectiveKind::CampaignShutdown);
        assert_eq!(directive.scenario(), None);
    }

    #[test]
    fn test_directive_is_tagged_in_json() {
        let directive = Directive::new(
            "d-3",
            "c-1",
            "broadcast",
            DirectiveKind::CompleteCampaign {
                successful: true,
                message: None,
            },
        );
        let json = serde_json::to_value(&directive).unwrap_or_default();
        assert_eq!(json["kind"]["type"], "complete_campaign");
    }
}
