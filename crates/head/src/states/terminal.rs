//! Phases ending a campaign: aborting, completion, failure and disabled.

use tracing::{debug, error, info, warn};

use horde_core::{Directive, DirectiveKind, ExecutionStatus, Feedback, FeedbackKind};

use super::{ABORTED_MESSAGE, CampaignState, Phase};
use crate::collaborators::ReportSeverity;
use crate::context::CampaignExecutionContext;

impl CampaignState {
    pub(super) async fn init_terminal(&mut self, ctx: &CampaignExecutionContext) -> Vec<Directive> {
        match &self.phase {
            Phase::Aborting { configuration, .. } => {
                if configuration.hard {
                    if let Err(e) = ctx.report_keeper.abort(&self.campaign.key).await {
                        warn!(campaign = %self.campaign.key, error = %e, "Failed to record the abort");
                    }
                }
                vec![ctx.broadcast(
                    &self.campaign,
                    DirectiveKind::CampaignAbort {
                        scenarios: self.campaign.scenario_names(),
                        hard: configuration.hard,
                    },
                )]
            }

            Phase::Completion { .. } => {
                vec![ctx.broadcast(&self.campaign, DirectiveKind::CampaignShutdown)]
            }

            Phase::Failure { error, .. } => {
                let error = error.clone();
                self.campaign.message = Some(error.clone());
                let key = &self.campaign.key;
                if let Err(e) = ctx
                    .report_keeper
                    .report_message(key, None, ReportSeverity::Error, &error)
                    .await
                {
                    warn!(campaign = %key, error = %e, "Failed to report the failure");
                }
                if let Err(e) = ctx
                    .report_keeper
                    .close(key, ExecutionStatus::Failed, Some(&error))
                    .await
                {
                    warn!(campaign = %key, error = %e, "Failed to close the report");
                }
                vec![ctx.broadcast(&self.campaign, DirectiveKind::CampaignShutdown)]
            }

            Phase::Disabled { successful } => {
                let successful = *successful;
                let campaign = &self.campaign;
                let nodes = campaign.factory_nodes();
                if !nodes.is_empty() {
                    if let Err(e) = ctx.factory_directory.release(campaign, &nodes).await {
                        warn!(campaign = %campaign.key, error = %e, "Failed to release the factories");
                    }
                }
                let status = if successful {
                    ExecutionStatus::Successful
                } else {
                    ExecutionStatus::Failed
                };
                if let Err(e) = ctx
                    .report_keeper
                    .close(&campaign.key, status, campaign.message.as_deref())
                    .await
                {
                    warn!(campaign = %campaign.key, error = %e, "Failed to close the report");
                }
                info!(campaign = %campaign.key, successful, message = ?campaign.message, "Campaign disabled");
                vec![ctx.broadcast(
                    campaign,
                    DirectiveKind::CompleteCampaign {
                        successful,
                        message: campaign.message.clone(),
                    },
                )]
            }

            _ => Vec::new(),
        }
    }

    pub(super) async fn process_terminal(
        self,
        ctx: &CampaignExecutionContext,
        feedback: &Feedback,
    ) -> Self {
        let Self {
            campaign,
            phase,
            initialized,
        } = self;
        let node = feedback.node_id.as_str();
        let done = feedback.status.is_done();

        match phase {
            Phase::Aborting {
                configuration,
                reason,
                mut expected,
            } => {
                if done && matches!(feedback.kind, FeedbackKind::CampaignAbort) {
                    if feedback.is_failed() {
                        warn!(campaign = %campaign.key, node = %node, error = %feedback.error_or_empty(), "Factory failed to abort");
                    }
                    expected.remove(node);
                }
                let phase = Phase::Aborting {
                    configuration,
                    reason,
                    expected,
                };
                Self::staying(campaign, phase, initialized).settle(ctx).await
            }

            Phase::Completion { mut expected } => {
                if done && matches!(feedback.kind, FeedbackKind::CampaignShutdown) {
                    expected.remove(node);
                }
                if expected.is_empty() {
                    return Self::disabled(campaign, true);
                }
                Self::staying(campaign, Phase::Completion { expected }, initialized)
            }

            Phase::Failure { error, mut expected } => {
                if done && matches!(feedback.kind, FeedbackKind::CampaignShutdown) {
                    expected.remove(node);
                }
                if expected.is_empty() {
                    return Self::disabled(campaign, false);
                }
                Self::staying(campaign, Phase::Failure { error, expected }, initialized)
            }

            other => {
                debug!(campaign = %campaign.key, phase = other.name(), node = %node, "Feedback ignored");
                Self::staying(campaign, other, initialized)
            }
        }
    }

    /// Every factory answered the abort.
    pub(super) async fn finish_abort(self, ctx: &CampaignExecutionContext) -> Self {
        let (hard, reason) = match &self.phase {
            Phase::Aborting {
                configuration,
                reason,
                ..
            } => (configuration.hard, reason.clone()),
            _ => return self,
        };
        if !hard {
            info!(campaign = %self.campaign.key, "Soft abort complete");
            return Self::completion(self.campaign);
        }
        if let Err(e) = ctx
            .report_keeper
            .close(&self.campaign.key, ExecutionStatus::Aborted, Some(&reason))
            .await
        {
            warn!(campaign = %self.campaign.key, error = %e, "Failed to close the report");
        }
        error!(campaign = %self.campaign.key, "Hard abort complete");
        Self::failure(self.campaign, ABORTED_MESSAGE)
    }
}
