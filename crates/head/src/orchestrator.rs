//! Entry point of the head: starts campaigns, routes feedbacks to them and
//! aborts them on request.

use std::sync::Arc;
use std::time::Duration;

use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use horde_core::{
    CampaignKey, ChannelHub, Directive, Error, Feedback, FeedbackKind, FeedbackStatus,
};

use crate::actors::{
    AbortSlot, CampaignActorArguments, CampaignActorDef, CampaignMessage, CampaignOutcome,
    CampaignSnapshot,
};
use crate::campaign::RunningCampaign;
use crate::config::HeadConfig;
use crate::context::CampaignExecutionContext;
use crate::errors::HeadError;
use crate::states::AbortConfiguration;

/// Node id of the feedbacks the head raises itself.
pub const HEAD_NODE_ID: &str = "head";

#[derive(Clone)]
struct CampaignHandle {
    actor: ActorRef<CampaignMessage>,
    abort_slot: Arc<AbortSlot>,
    outcome: watch::Receiver<Option<CampaignOutcome>>,
}

impl CampaignHandle {
    fn is_completed(&self) -> bool {
        self.outcome.borrow().is_some()
    }
}

pub struct CampaignOrchestrator {
    config: HeadConfig,
    context: CampaignExecutionContext,
    directives: Arc<ChannelHub<Directive>>,
    feedbacks: Arc<ChannelHub<Feedback>>,
    /// Every campaign started, completed ones included.
    campaigns: RwLock<im::HashMap<CampaignKey, CampaignHandle>>,
}

impl CampaignOrchestrator {
    pub fn new(
        config: HeadConfig,
        context: CampaignExecutionContext,
        directives: Arc<ChannelHub<Directive>>,
        feedbacks: Arc<ChannelHub<Feedback>>,
    ) -> Self {
        Self {
            config,
            context,
            directives,
            feedbacks,
            campaigns: RwLock::new(im::HashMap::new()),
        }
    }

    pub const fn config(&self) -> &HeadConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // COMMANDS
    // ═══════════════════════════════════════════════════════════════════════

    /// Start driving a campaign.
    ///
    /// The campaign uses the channels of the head configuration.
    ///
    /// # Errors
    ///
    /// Returns `CampaignAlreadyRunning` when a campaign with the same key is
    /// not complete yet, `SpawnFailed` when its actor cannot be spawned.
    pub async fn start(&self, campaign: RunningCampaign) -> Result<(), HeadError> {
        let campaign = campaign.with_channels(
            self.config.broadcast_channel.clone(),
            self.config.feedback_channel.clone(),
        );
        let key = campaign.key.clone();
        let (soft_timeout, hard_timeout) = (campaign.soft_timeout, campaign.hard_timeout);

        let mut campaigns = self.campaigns.write().await;
        if campaigns.get(&key).is_some_and(|handle| !handle.is_completed()) {
            return Err(HeadError::campaign_already_running(key));
        }

        let abort_slot = Arc::new(AbortSlot::new());
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let args = CampaignActorArguments {
            campaign,
            context: self.context.clone(),
            directives: Arc::clone(&self.directives),
            abort_slot: Arc::clone(&abort_slot),
            outcome: outcome_tx,
        };
        let (actor, _handle) = Actor::spawn(Some(format!("horde-campaign-{key}")), CampaignActorDef, args)
            .await
            .map_err(|e| HeadError::spawn_failed(format!("campaign '{key}': {e}")))?;

        campaigns.insert(
            key.clone(),
            CampaignHandle {
                actor: actor.clone(),
                abort_slot,
                outcome: outcome_rx.clone(),
            },
        );
        drop(campaigns);

        actor
            .send_message(CampaignMessage::Start)
            .map_err(|_| HeadError::ActorUnavailable)?;
        info!(campaign = %key, "Campaign started");

        for (timeout, hard) in [(soft_timeout, false), (hard_timeout, true)] {
            if let Some(timeout) = timeout {
                Self::arm_timeout(&key, timeout, hard, actor.clone(), outcome_rx.clone());
            }
        }
        Ok(())
    }

    /// Route a feedback to the campaign it belongs to.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound` for a campaign that was never started and
    /// `ActorUnavailable` when the campaign is already complete.
    pub async fn dispatch(&self, feedback: Feedback) -> Result<(), HeadError> {
        let handle = self.handle(&feedback.campaign_key).await?;
        handle
            .actor
            .send_message(CampaignMessage::Feedback(feedback))
            .map_err(|_| HeadError::ActorUnavailable)
    }

    /// Abort a running campaign.
    ///
    /// The request is seen by the campaign before any feedback it has not
    /// processed yet.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound` for an unknown campaign and
    /// `ActorUnavailable` when it is already complete.
    pub async fn abort(&self, key: &str, configuration: AbortConfiguration) -> Result<(), HeadError> {
        let handle = self.handle(key).await?;
        handle.abort_slot.request(configuration).await;
        info!(campaign = %key, hard = configuration.hard, "Abort requested");
        handle
            .actor
            .send_message(CampaignMessage::Abort)
            .map_err(|_| HeadError::ActorUnavailable)
    }

    /// Stop every campaign actor, complete or not.
    pub async fn shutdown(&self) {
        let campaigns = self.campaigns.read().await.clone();
        for (key, handle) in &campaigns {
            if !handle.is_completed() {
                warn!(campaign = %key, "Stopping an incomplete campaign");
            }
            handle.actor.stop(Some("head shutdown".to_string()));
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════

    /// Current phase and factories of a running campaign.
    ///
    /// # Errors
    ///
    /// Returns `RpcTimeout` when the actor does not answer in time and
    /// `ActorUnavailable` once the campaign is complete.
    pub async fn snapshot(&self, key: &str) -> Result<CampaignSnapshot, HeadError> {
        let handle = self.handle(key).await?;
        let timeout = self.config.rpc_timeout();
        match handle
            .actor
            .call(|reply| CampaignMessage::GetSnapshot { reply }, Some(timeout))
            .await
        {
            Ok(CallResult::Success(snapshot)) => Ok(snapshot),
            Ok(CallResult::Timeout) => Err(HeadError::RpcTimeout(timeout)),
            Ok(CallResult::SenderError) | Err(_) => Err(HeadError::ActorUnavailable),
        }
    }

    /// Outcome of a complete campaign, `None` while it runs.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound` for an unknown campaign.
    pub async fn outcome(&self, key: &str) -> Result<Option<CampaignOutcome>, HeadError> {
        let handle = self.handle(key).await?;
        let outcome = handle.outcome.borrow().clone();
        Ok(outcome)
    }

    /// Wait until a campaign is complete.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound` for an unknown campaign and
    /// `ActorUnavailable` when its actor stopped without an outcome.
    pub async fn wait_for_completion(&self, key: &str) -> Result<CampaignOutcome, HeadError> {
        let mut outcome = self.handle(key).await?.outcome;
        let completed = outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| HeadError::ActorUnavailable)?;
        completed.clone().ok_or(HeadError::ActorUnavailable)
    }

    /// Keys of the campaigns that are not complete yet.
    pub async fn running_campaigns(&self) -> Vec<CampaignKey> {
        let mut keys: Vec<CampaignKey> = self
            .campaigns
            .read()
            .await
            .iter()
            .filter(|(_, handle)| !handle.is_completed())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FEEDBACK LISTENER
    // ═══════════════════════════════════════════════════════════════════════

    /// Route every feedback published on the feedback channel.
    ///
    /// The subscription exists when this returns, so no feedback published
    /// afterwards is missed.
    pub async fn spawn_feedback_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut subscription = self.feedbacks.subscribe(&self.config.feedback_channel).await;
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(feedback) => {
                        let key = feedback.campaign_key.clone();
                        if let Err(e) = orchestrator.dispatch(feedback).await {
                            warn!(campaign = %key, error = %e, "Feedback dropped");
                        }
                    }
                    Err(Error::ChannelLagged { skipped, .. }) => {
                        warn!(skipped, "Feedback listener lagged behind");
                    }
                    Err(e) => {
                        debug!(error = %e, "Feedback subscription closed");
                        break;
                    }
                }
            }
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Implementation
    // ═══════════════════════════════════════════════════════════════════════

    async fn handle(&self, key: &str) -> Result<CampaignHandle, HeadError> {
        self.campaigns
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| HeadError::campaign_not_found(key))
    }

    fn arm_timeout(
        key: &str,
        timeout: Duration,
        hard: bool,
        actor: ActorRef<CampaignMessage>,
        outcome: watch::Receiver<Option<CampaignOutcome>>,
    ) {
        let feedback = Feedback::new(
            key,
            HEAD_NODE_ID,
            FeedbackKind::CampaignTimeout { hard },
            FeedbackStatus::Completed,
        );
        debug!(campaign = %key, hard, timeout_ms = timeout.as_millis(), "Campaign timeout armed");
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if outcome.borrow().is_some() {
                return;
            }
            // The campaign may have completed meanwhile
            let _ = actor.send_message(CampaignMessage::Feedback(feedback));
        });
    }
}
