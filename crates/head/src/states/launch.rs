//! Phases preparing the factories, up to the start of the minions.

use futures::future::join_all;
use itertools::Itertools;
use tracing::{debug, trace, warn};

use horde_core::{Directive, DirectiveKind, Feedback, FeedbackKind};

use super::bookkeeping::Declined;
use super::{CampaignState, NodeScenarios, Phase};
use crate::campaign::RunningCampaign;
use crate::context::CampaignExecutionContext;

fn answer(expected: &mut NodeScenarios, node: &str, scenario: &str) {
    if let Some(scenarios) = expected.get_mut(node) {
        scenarios.remove(scenario);
        if scenarios.is_empty() {
            expected.remove(node);
        }
    }
}

/// Forget what a declining factory will never answer.
fn forget_declined(expected: &mut NodeScenarios, declined: Option<&Declined>) {
    match declined {
        Some(Declined {
            node,
            released: true,
            ..
        }) => {
            expected.remove(node);
        }
        Some(Declined {
            node,
            scenario: Some(scenario),
            ..
        }) => answer(expected, node, scenario),
        _ => {}
    }
}

impl CampaignState {
    pub(super) fn after_minions_assignment(campaign: RunningCampaign) -> Self {
        if campaign.schedule_ramp_up {
            Self::minions_schedule_ramp_up(campaign)
        } else {
            Self::warmup(campaign)
        }
    }

    pub(super) fn init_launch(&self, ctx: &CampaignExecutionContext) -> Vec<Directive> {
        let campaign = &self.campaign;
        match &self.phase {
            Phase::FactoryAssignment { .. } => campaign
                .factories
                .values()
                .map(|factory| {
                    ctx.directive(
                        campaign,
                        factory.unicast_channel.clone(),
                        DirectiveKind::FactoryAssignment {
                            assignments: factory.assignment.values().cloned().collect(),
                        },
                    )
                })
                .collect(),
            Phase::MinionsAssignment { .. } => campaign
                .scenarios
                .iter()
                .map(|(scenario, configuration)| {
                    ctx.broadcast(
                        campaign,
                        DirectiveKind::MinionsDeclaration {
                            scenario: scenario.clone(),
                            minions_count: configuration.minions_count,
                        },
                    )
                })
                .collect(),
            Phase::MinionsScheduleRampUp { .. } | Phase::MinionsStartup => campaign
                .scenarios
                .iter()
                .map(|(scenario, configuration)| {
                    ctx.broadcast(
                        campaign,
                        DirectiveKind::MinionsRampUpPreparation {
                            scenario: scenario.clone(),
                            execution_profile: configuration.execution_profile.clone(),
                            start_offset_ms: campaign.start_offset_ms,
                            speed_factor: campaign.speed_factor,
                        },
                    )
                })
                .collect(),
            Phase::Warmup { .. } => campaign
                .factories
                .values()
                .flat_map(|factory| {
                    factory.assignment.keys().map(|scenario| {
                        ctx.directive(
                            campaign,
                            factory.unicast_channel.clone(),
                            DirectiveKind::ScenarioWarmUp {
                                scenario: scenario.clone(),
                            },
                        )
                    })
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub(super) async fn process_launch(
        self,
        ctx: &CampaignExecutionContext,
        feedback: &Feedback,
        declined: Option<&Declined>,
    ) -> Self {
        let Self {
            campaign,
            phase,
            initialized,
        } = self;
        let node = feedback.node_id.as_str();
        let done = feedback.status.is_done();

        match phase {
            Phase::FactoryAssignment { mut expected } => {
                let answered =
                    done && matches!(feedback.kind, FeedbackKind::FactoryAssignment { .. });
                if answered || declined.is_some_and(|declined| declined.released) {
                    expected.remove(node);
                }
                if expected.is_empty() {
                    debug!(campaign = %campaign.key, "Every factory accepted its assignment");
                    return Self::minions_assignment(campaign);
                }
                trace!(campaign = %campaign.key, remaining = %expected.iter().join(", "), "Waiting for factory assignments");
                Self::staying(campaign, Phase::FactoryAssignment { expected }, initialized)
            }

            Phase::MinionsAssignment { mut expected } => {
                if let (FeedbackKind::MinionsAssignment { scenario }, true) = (&feedback.kind, done) {
                    answer(&mut expected, node, scenario);
                }
                forget_declined(&mut expected, declined);
                if expected.is_empty() {
                    debug!(campaign = %campaign.key, "Minions assigned in every factory");
                    return Self::after_minions_assignment(campaign);
                }
                Self::staying(campaign, Phase::MinionsAssignment { expected }, initialized)
            }

            Phase::MinionsScheduleRampUp { mut expected } => {
                if let (FeedbackKind::MinionsRampUpPreparation { scenario }, true) =
                    (&feedback.kind, feedback.is_completed())
                {
                    expected.remove(scenario);
                }
                if expected.is_empty() {
                    debug!(campaign = %campaign.key, "Ramp-up scheduled for every scenario");
                    return Self::warmup(campaign);
                }
                trace!(campaign = %campaign.key, remaining = %expected.iter().join(", "), "Waiting for ramp-up schedules");
                Self::staying(campaign, Phase::MinionsScheduleRampUp { expected }, initialized)
            }

            Phase::Warmup { mut expected } => {
                if let (FeedbackKind::ScenarioWarmUp { scenario }, true) = (&feedback.kind, done) {
                    answer(&mut expected, node, scenario);
                }
                forget_declined(&mut expected, declined);
                if expected.is_empty() {
                    debug!(campaign = %campaign.key, "Every scenario warmed up");
                    return Self::minions_startup(campaign);
                }
                Self::staying(campaign, Phase::Warmup { expected }, initialized)
            }

            Phase::MinionsStartup => {
                if matches!(feedback.kind, FeedbackKind::MinionsStart { .. }) && feedback.is_completed() {
                    let starts = campaign
                        .scenarios
                        .keys()
                        .map(|scenario| ctx.report_keeper.start(&campaign.key, scenario));
                    let results = join_all(starts).await;
                    for (scenario, result) in campaign.scenarios.keys().zip(results) {
                        if let Err(e) = result {
                            warn!(campaign = %campaign.key, scenario = %scenario, error = %e, "Failed to record scenario start");
                        }
                    }
                    debug!(campaign = %campaign.key, node = %node, "Minions started");
                    return Self::running(campaign);
                }
                Self::staying(campaign, Phase::MinionsStartup, initialized)
            }

            other => Self::staying(campaign, other, initialized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expectations() -> NodeScenarios {
        let mut expected = NodeScenarios::new();
        expected.insert("node-1".to_string(), ["s1".to_string(), "s2".to_string()].into_iter().collect());
        expected.insert("node-2".to_string(), ["s1".to_string()].into_iter().collect());
        expected
    }

    #[test]
    fn test_last_scenario_answered_removes_node() {
        let mut expected = expectations();
        answer(&mut expected, "node-2", "s1");
        assert!(!expected.contains_key("node-2"));
        assert!(expected.contains_key("node-1"));
    }

    #[test]
    fn test_released_factory_is_forgotten() {
        let mut expected = expectations();
        let declined = Declined {
            node: "node-1".to_string(),
            scenario: Some("s1".to_string()),
            released: true,
        };
        forget_declined(&mut expected, Some(&declined));
        assert!(!expected.contains_key("node-1"));
    }

    #[test]
    fn test_declined_scenario_is_forgotten() {
        let mut expected = expectations();
        let declined = Declined {
            node: "node-1".to_string(),
            scenario: Some("s2".to_string()),
            released: false,
        };
        forget_declined(&mut expected, Some(&declined));
        assert_eq!(expected.get("node-1").map(im::HashSet::len), Some(1));
    }
}
