//! CampaignActor - the single consumer of one campaign's feedbacks.
//!
//! The actor owns the current [`CampaignState`]. Every message is handled to
//! completion before the next one is dequeued, so the expected feedbacks of
//! a phase are only ever touched by one writer.

use std::sync::Arc;

use futures::future::join_all;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use horde_core::{ChannelHub, Directive, Feedback};

use super::messages::{AbortSlot, CampaignMessage, CampaignOutcome, CampaignSnapshot};
use crate::campaign::RunningCampaign;
use crate::context::CampaignExecutionContext;
use crate::states::CampaignState;

/// The campaign actor definition.
#[derive(Clone, Copy, Default)]
pub struct CampaignActorDef;

/// Arguments passed to the actor on startup.
pub struct CampaignActorArguments {
    pub campaign: RunningCampaign,
    pub context: CampaignExecutionContext,
    pub directives: Arc<ChannelHub<Directive>>,
    pub abort_slot: Arc<AbortSlot>,
    pub outcome: watch::Sender<Option<CampaignOutcome>>,
}

pub struct CampaignActorState {
    /// Only `None` while a transition is being computed.
    current: Option<CampaignState>,
    context: CampaignExecutionContext,
    directives: Arc<ChannelHub<Directive>>,
    abort_slot: Arc<AbortSlot>,
    outcome: watch::Sender<Option<CampaignOutcome>>,
    started: bool,
    lost_directives: usize,
}

impl Actor for CampaignActorDef {
    type Msg = CampaignMessage;
    type State = CampaignActorState;
    type Arguments = CampaignActorArguments;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(campaign = %args.campaign.key, "CampaignActor starting");
        Ok(CampaignActorState {
            current: Some(CampaignState::new(args.campaign)),
            context: args.context,
            directives: args.directives,
            abort_slot: args.abort_slot,
            outcome: args.outcome,
            started: false,
            lost_directives: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            // ═══════════════════════════════════════════════════════════════
            // COMMANDS
            // ═══════════════════════════════════════════════════════════════
            CampaignMessage::Start => {
                if state.started {
                    debug!("Campaign already started");
                } else {
                    state.started = true;
                    Self::drive(state).await;
                    Self::apply_pending_abort(state).await;
                }
            }

            CampaignMessage::Feedback(feedback) => {
                if state.started {
                    Self::apply_pending_abort(state).await;
                    Self::handle_feedback(state, &feedback).await;
                } else {
                    warn!(campaign = %feedback.campaign_key, "Feedback before start ignored");
                }
            }

            CampaignMessage::Abort => {
                if state.started {
                    Self::apply_pending_abort(state).await;
                }
            }

            // ═══════════════════════════════════════════════════════════════
            // QUERIES
            // ═══════════════════════════════════════════════════════════════
            CampaignMessage::GetSnapshot { reply } => {
                if let Some(snapshot) = Self::snapshot(state) {
                    // Ignore send error - caller may have timed out
                    let _ = reply.send(snapshot);
                }
            }
        }

        Self::stop_if_completed(&myself, state);
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(current) = &state.current {
            info!(campaign = %current.campaign().key, phase = current.name(), "CampaignActor stopping");
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Implementation
// ═══════════════════════════════════════════════════════════════════════════

impl CampaignActorDef {
    /// Initialize the current state and every state it settles into, then
    /// publish what they emitted.
    async fn drive(state: &mut CampaignActorState) {
        let Some(mut current) = state.current.take() else {
            return;
        };
        let mut directives = Vec::new();
        while !current.is_initialized() {
            directives.extend(current.init(&state.context).await);
            current = current.settle(&state.context).await;
        }
        state.current = Some(current);
        Self::publish(state, directives).await;
    }

    /// Directives for different factories may be delivered in any order.
    async fn publish(state: &mut CampaignActorState, directives: Vec<Directive>) {
        let hub = &state.directives;
        let broadcast = state
            .current
            .as_ref()
            .map(|current| current.campaign().broadcast_channel.clone());
        let broadcast = broadcast.as_deref();
        let lost = join_all(directives.into_iter().map(|directive| async move {
            let channel = directive.channel.clone();
            let campaign = directive.campaign_key.clone();
            let name = directive.name();
            trace!(campaign = %campaign, directive = name, channel = %channel, "Publishing directive");
            let receivers = hub.publish(&channel, directive).await;
            let unicast = broadcast != Some(channel.as_str());
            if receivers == 0 && unicast {
                warn!(campaign = %campaign, directive = name, channel = %channel, "Directive lost, no factory listens on its channel");
            }
            receivers == 0 && unicast
        }))
        .await
        .into_iter()
        .filter(|lost| *lost)
        .count();
        state.lost_directives = state.lost_directives.saturating_add(lost);
    }

    async fn handle_feedback(state: &mut CampaignActorState, feedback: &Feedback) {
        let Some(current) = state.current.take() else {
            return;
        };
        trace!(
            campaign = %feedback.campaign_key,
            node = %feedback.node_id,
            status = %feedback.status,
            phase = current.name(),
            "Processing feedback"
        );
        state.current = Some(current.process(&state.context, feedback).await);
        Self::drive(state).await;
    }

    async fn apply_pending_abort(state: &mut CampaignActorState) {
        let Some(configuration) = state.abort_slot.take().await else {
            return;
        };
        let Some(current) = state.current.take() else {
            return;
        };
        state.current = Some(current.abort(&state.context, configuration).await);
        Self::drive(state).await;
    }

    fn snapshot(state: &CampaignActorState) -> Option<CampaignSnapshot> {
        state.current.as_ref().map(|current| CampaignSnapshot {
            key: current.campaign().key.clone(),
            phase: current.name(),
            initialized: current.is_initialized(),
            completed: current.is_completed(),
            successful: current.successful(),
            factories: current.campaign().factory_nodes(),
            message: current.campaign().message.clone(),
            lost_directives: state.lost_directives,
        })
    }

    fn stop_if_completed(myself: &ActorRef<CampaignMessage>, state: &CampaignActorState) {
        let Some(current) = &state.current else {
            return;
        };
        let Some(successful) = current.successful() else {
            return;
        };
        if state.outcome.borrow().is_some() {
            return;
        }
        let campaign = current.campaign();
        info!(campaign = %campaign.key, successful, "Campaign complete");
        state.outcome.send_replace(Some(CampaignOutcome {
            key: campaign.key.clone(),
            successful,
            message: campaign.message.clone(),
        }));
        myself.stop(Some("campaign complete".to_string()));
    }
}
