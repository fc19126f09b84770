//! Running phase: the minions execute until every scenario is shut down.

use itertools::Itertools;
use tracing::{debug, trace, warn};

use horde_core::{DirectiveKind, Error, Feedback, FeedbackKind};

use super::{CampaignState, Phase};
use crate::context::CampaignExecutionContext;

impl CampaignState {
    pub(super) async fn process_running(
        self,
        ctx: &CampaignExecutionContext,
        feedback: &Feedback,
    ) -> Self {
        let Self {
            campaign,
            phase,
            initialized,
        } = self;
        let Phase::Running {
            directives,
            mut expected_scenarios,
        } = phase
        else {
            return Self::staying(campaign, phase, initialized);
        };

        if let Some(scenario) = feedback.scenario() {
            if !campaign.scenarios.contains_key(scenario) {
                let error = Error::malformed_message(format!("unknown scenario '{scenario}'"));
                warn!(campaign = %campaign.key, node = %feedback.node_id, error = %error, "Feedback dropped");
                return Self::staying(
                    campaign,
                    Phase::Running {
                        directives,
                        expected_scenarios,
                    },
                    initialized,
                );
            }
        }

        match &feedback.kind {
            FeedbackKind::CompleteMinion {
                scenario,
                minion_id,
            } => {
                trace!(campaign = %campaign.key, scenario = %scenario, minion = %minion_id, "Minion complete");
                let shutdown = ctx.broadcast(
                    &campaign,
                    DirectiveKind::MinionsShutdown {
                        scenario: scenario.clone(),
                        minion_ids: vec![minion_id.clone()],
                    },
                );
                Self::running_with(campaign, vec![shutdown], expected_scenarios)
            }

            FeedbackKind::EndOfCampaignScenario { scenario } => {
                if let Err(e) = ctx.report_keeper.complete(&campaign.key, scenario).await {
                    warn!(campaign = %campaign.key, scenario = %scenario, error = %e, "Failed to record scenario completion");
                }
                debug!(campaign = %campaign.key, scenario = %scenario, "Scenario complete, shutting it down");
                let shutdown = ctx.broadcast(
                    &campaign,
                    DirectiveKind::CampaignScenarioShutdown {
                        scenario: scenario.clone(),
                    },
                );
                Self::running_with(campaign, vec![shutdown], expected_scenarios)
            }

            FeedbackKind::CampaignScenarioShutdown { scenario } if feedback.status.is_done() => {
                expected_scenarios.remove(scenario);
                if expected_scenarios.is_empty() {
                    debug!(campaign = %campaign.key, "Every scenario shut down");
                    return Self::completion(campaign);
                }
                trace!(
                    campaign = %campaign.key,
                    remaining = %expected_scenarios.iter().sorted().join(", "),
                    "Scenarios still running"
                );
                Self::staying(
                    campaign,
                    Phase::Running {
                        directives,
                        expected_scenarios,
                    },
                    initialized,
                )
            }

            FeedbackKind::EndOfCampaign => {
                debug!(campaign = %campaign.key, node = %feedback.node_id, "End of campaign");
                Self::completion(campaign)
            }

            _ => Self::staying(
                campaign,
                Phase::Running {
                    directives,
                    expected_scenarios,
                },
                initialized,
            ),
        }
    }
}
