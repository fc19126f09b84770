//! Campaign lifecycle state machine.
//!
//! A campaign is always in exactly one [`Phase`]. Each phase knows which
//! feedbacks it still waits for; a feedback either leaves the state as it
//! is or produces the state of the next phase. A new state is never
//! initialized: its owner calls [`CampaignState::init`] and publishes the
//! returned directives before feeding it anything else.
//!
//! ```text
//! FactoryAssignment → MinionsAssignment → [MinionsScheduleRampUp] → Warmup
//!     → MinionsStartup → Running → Completion → Disabled(successful)
//!
//! any launch phase ──FAILED──▶ Failure → Disabled(failed)
//! any launch phase ──abort───▶ Aborting → Completion (soft) | Failure (hard)
//! ```

pub mod bookkeeping;
mod launch;
mod running;
mod terminal;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use horde_core::{Directive, Feedback, FeedbackKind, NodeId, ScenarioName};

use crate::campaign::RunningCampaign;
use crate::context::CampaignExecutionContext;

/// Error of a campaign stopped by an abort.
pub const ABORTED_MESSAGE: &str = "The campaign was aborted";

/// Scenarios still expected from each factory.
pub type NodeScenarios = im::HashMap<NodeId, im::HashSet<ScenarioName>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortConfiguration {
    /// A hard abort stops the minions immediately and fails the campaign.
    pub hard: bool,
}

impl AbortConfiguration {
    pub const fn soft() -> Self {
        Self { hard: false }
    }

    pub const fn hard() -> Self {
        Self { hard: true }
    }

    /// A hard abort is never downgraded.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            hard: self.hard || other.hard,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    FactoryAssignment {
        expected: im::HashSet<NodeId>,
    },
    MinionsAssignment {
        expected: NodeScenarios,
    },
    MinionsScheduleRampUp {
        expected: im::HashSet<ScenarioName>,
    },
    Warmup {
        expected: NodeScenarios,
    },
    MinionsStartup,
    Running {
        /// Emitted by the next `init`.
        directives: Vec<Directive>,
        expected_scenarios: im::HashSet<ScenarioName>,
    },
    Aborting {
        configuration: AbortConfiguration,
        reason: String,
        expected: im::HashSet<NodeId>,
    },
    Completion {
        expected: im::HashSet<NodeId>,
    },
    Failure {
        error: String,
        expected: im::HashSet<NodeId>,
    },
    Disabled {
        successful: bool,
    },
}

impl Phase {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FactoryAssignment { .. } => "factory-assignment",
            Self::MinionsAssignment { .. } => "minions-assignment",
            Self::MinionsScheduleRampUp { .. } => "minions-schedule-ramp-up",
            Self::Warmup { .. } => "warmup",
            Self::MinionsStartup => "minions-startup",
            Self::Running { .. } => "running",
            Self::Aborting { .. } => "aborting",
            Self::Completion { .. } => "completion",
            Self::Failure { .. } => "failure",
            Self::Disabled { .. } => "disabled",
        }
    }

    /// Phases in which explicit failures and declines are handled.
    const fn is_launching_or_running(&self) -> bool {
        !matches!(
            self,
            Self::Aborting { .. } | Self::Completion { .. } | Self::Failure { .. } | Self::Disabled { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CampaignState {
    campaign: RunningCampaign,
    phase: Phase,
    initialized: bool,
}

impl CampaignState {
    /// First state of a campaign.
    pub fn new(campaign: RunningCampaign) -> Self {
        Self::factory_assignment(campaign)
    }

    const fn with_phase(campaign: RunningCampaign, phase: Phase) -> Self {
        Self {
            campaign,
            phase,
            initialized: false,
        }
    }

    /// Same state, after a feedback that did not end the phase.
    const fn staying(campaign: RunningCampaign, phase: Phase, initialized: bool) -> Self {
        Self {
            campaign,
            phase,
            initialized,
        }
    }

    pub fn factory_assignment(campaign: RunningCampaign) -> Self {
        let expected = campaign.factories.keys().cloned().collect();
        Self::with_phase(campaign, Phase::FactoryAssignment { expected })
    }

    pub fn minions_assignment(campaign: RunningCampaign) -> Self {
        let expected = campaign.scenarios_by_factory();
        Self::with_phase(campaign, Phase::MinionsAssignment { expected })
    }

    pub fn minions_schedule_ramp_up(campaign: RunningCampaign) -> Self {
        let expected = campaign.scenarios.keys().cloned().collect();
        Self::with_phase(campaign, Phase::MinionsScheduleRampUp { expected })
    }

    pub fn warmup(campaign: RunningCampaign) -> Self {
        let expected = campaign.scenarios_by_factory();
        Self::with_phase(campaign, Phase::Warmup { expected })
    }

    pub const fn minions_startup(campaign: RunningCampaign) -> Self {
        Self::with_phase(campaign, Phase::MinionsStartup)
    }

    pub fn running(campaign: RunningCampaign) -> Self {
        let expected_scenarios = campaign.scenarios.keys().cloned().collect();
        Self::running_with(campaign, Vec::new(), expected_scenarios)
    }

    pub const fn running_with(
        campaign: RunningCampaign,
        directives: Vec<Directive>,
        expected_scenarios: im::HashSet<ScenarioName>,
    ) -> Self {
        Self::with_phase(
            campaign,
            Phase::Running {
                directives,
                expected_scenarios,
            },
        )
    }

    /// Aborting state waiting for every factory of the campaign.
    pub fn aborting(
        campaign: RunningCampaign,
        configuration: AbortConfiguration,
        reason: impl Into<String>,
    ) -> Self {
        let expected = campaign.factories.keys().cloned().collect();
        Self::with_phase(
            campaign,
            Phase::Aborting {
                configuration,
                reason: reason.into(),
                expected,
            },
        )
    }

    pub fn completion(campaign: RunningCampaign) -> Self {
        let expected = campaign.factories.keys().cloned().collect();
        Self::with_phase(campaign, Phase::Completion { expected })
    }

    pub fn failure(campaign: RunningCampaign, error: impl Into<String>) -> Self {
        let expected = campaign.factories.keys().cloned().collect();
        Self::with_phase(
            campaign,
            Phase::Failure {
                error: error.into(),
                expected,
            },
        )
    }

    pub const fn disabled(campaign: RunningCampaign, successful: bool) -> Self {
        Self::with_phase(campaign, Phase::Disabled { successful })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════

    pub const fn campaign(&self) -> &RunningCampaign {
        &self.campaign
    }

    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    pub const fn name(&self) -> &'static str {
        self.phase.name()
    }

    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Only `Disabled` is terminal.
    pub const fn is_completed(&self) -> bool {
        matches!(self.phase, Phase::Disabled { .. })
    }

    /// Outcome of a terminal state.
    pub const fn successful(&self) -> Option<bool> {
        match self.phase {
            Phase::Disabled { successful } => Some(successful),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Directives starting the phase. Only the first call emits them.
    pub async fn init(&mut self, ctx: &CampaignExecutionContext) -> Vec<Directive> {
        if self.initialized {
            return Vec::new();
        }
        self.initialized = true;
        let directives = if let Phase::Running { directives, .. } = &mut self.phase {
            std::mem::take(directives)
        } else if self.phase.is_launching_or_running() {
            self.init_launch(ctx)
        } else {
            self.init_terminal(ctx).await
        };
        info!(
            campaign = %self.campaign.key,
            phase = self.name(),
            directives = directives.len(),
            "Campaign phase started"
        );
        directives
    }

    /// Apply a feedback.
    pub async fn process(self, ctx: &CampaignExecutionContext, feedback: &Feedback) -> Self {
        if feedback.campaign_key != self.campaign.key {
            warn!(
                campaign = %self.campaign.key,
                feedback_campaign = %feedback.campaign_key,
                "Feedback of another campaign ignored"
            );
            return self;
        }
        if let FeedbackKind::CampaignTimeout { hard } = feedback.kind {
            warn!(campaign = %self.campaign.key, hard, phase = self.name(), "Campaign timeout elapsed");
            return self.abort(ctx, AbortConfiguration { hard }).await;
        }
        if !self.phase.is_launching_or_running() {
            return self.process_terminal(ctx, feedback).await;
        }

        if feedback.is_failed() || matches!(feedback.kind, FeedbackKind::FailedCampaign) {
            error!(
                campaign = %self.campaign.key,
                node = %feedback.node_id,
                phase = self.name(),
                scenario = ?feedback.scenario(),
                error = %feedback.error_or_empty(),
                "Campaign failed"
            );
            return Self::failure(self.campaign, feedback.error_or_empty());
        }

        let Self {
            mut campaign,
            phase,
            initialized,
        } = self;
        let released = if feedback.is_ignored() {
            bookkeeping::decline(ctx, &mut campaign, feedback).await
        } else {
            None
        };
        let state = Self::staying(campaign, phase, initialized);
        if matches!(state.phase, Phase::Running { .. }) {
            state.process_running(ctx, feedback).await
        } else {
            state.process_launch(ctx, feedback, released.as_ref()).await
        }
    }

    /// Stop the campaign.
    ///
    /// Factories that are not healthy anymore are left out of the abort;
    /// when none is left, the campaign is disabled straight away.
    pub async fn abort(self, ctx: &CampaignExecutionContext, configuration: AbortConfiguration) -> Self {
        let Self {
            mut campaign,
            phase,
            initialized,
        } = self;
        match phase {
            Phase::Completion { .. } | Phase::Failure { .. } | Phase::Disabled { .. } => {
                debug!(campaign = %campaign.key, phase = phase.name(), "Abort ignored, campaign already ending");
                Self::staying(campaign, phase, initialized)
            }
            Phase::Aborting {
                configuration: current,
                reason,
                expected,
            } => {
                if !bookkeeping::keep_healthy_factories(ctx, &mut campaign).await {
                    return Self::disabled_after_abort(campaign, &reason);
                }
                let merged = current.merge(configuration);
                if merged != current {
                    info!(campaign = %campaign.key, "Abort escalated to hard");
                    return Self::aborting(campaign, merged, reason);
                }
                let expected = expected
                    .into_iter()
                    .filter(|node| campaign.contains(node))
                    .collect();
                let phase = Phase::Aborting {
                    configuration: current,
                    reason,
                    expected,
                };
                Self::staying(campaign, phase, initialized).settle(ctx).await
            }
            _ => {
                info!(campaign = %campaign.key, phase = phase.name(), hard = configuration.hard, "Aborting campaign");
                if bookkeeping::keep_healthy_factories(ctx, &mut campaign).await {
                    Self::aborting(campaign, configuration, ABORTED_MESSAGE)
                } else {
                    Self::disabled_after_abort(campaign, ABORTED_MESSAGE)
                }
            }
        }
    }

    /// Leave a phase that has nothing left to wait for.
    ///
    /// Returns the state unchanged while feedbacks are still expected.
    pub async fn settle(self, ctx: &CampaignExecutionContext) -> Self {
        match &self.phase {
            Phase::FactoryAssignment { expected } if expected.is_empty() => {
                Self::minions_assignment(self.campaign)
            }
            Phase::MinionsAssignment { expected } if expected.is_empty() => {
                Self::after_minions_assignment(self.campaign)
            }
            Phase::MinionsScheduleRampUp { expected } if expected.is_empty() => {
                Self::warmup(self.campaign)
            }
            Phase::Warmup { expected } if expected.is_empty() => {
                Self::minions_startup(self.campaign)
            }
            Phase::MinionsStartup if self.campaign.scenarios.is_empty() => {
                Self::running(self.campaign)
            }
            Phase::Running {
                expected_scenarios, ..
            } if expected_scenarios.is_empty() => Self::completion(self.campaign),
            Phase::Aborting { expected, .. } if expected.is_empty() => {
                self.finish_abort(ctx).await
            }
            Phase::Completion { expected } if expected.is_empty() => {
                Self::disabled(self.campaign, true)
            }
            Phase::Failure { expected, .. } if expected.is_empty() => {
                Self::disabled(self.campaign, false)
            }
            _ => self,
        }
    }

    fn disabled_after_abort(mut campaign: RunningCampaign, reason: &str) -> Self {
        warn!(campaign = %campaign.key, "No healthy factory left, disabling the campaign");
        campaign.message.get_or_insert_with(|| reason.to_string());
        Self::disabled(campaign, false)
    }
}
