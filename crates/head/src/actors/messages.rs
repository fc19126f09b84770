//! Messages for the CampaignActor.
//!
//! Commands are fire-and-forget, queries answer through an `RpcReplyPort`.
//! An abort request is not carried by its message: it is merged into the
//! campaign's [`AbortSlot`] first, so that it is seen before any feedback
//! still queued in the mailbox.

use ractor::RpcReplyPort;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use horde_core::{CampaignKey, Feedback, NodeId};

use crate::states::AbortConfiguration;

/// Messages for the CampaignActor.
#[derive(Debug)]
pub enum CampaignMessage {
    // ═══════════════════════════════════════════════════════════════════════
    // COMMANDS
    // ═══════════════════════════════════════════════════════════════════════
    /// Enter the first phase and publish its directives.
    Start,

    /// A feedback of a factory, or a timeout raised by the head.
    Feedback(Feedback),

    /// Wake-up after an abort was requested through the slot.
    Abort,

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════
    GetSnapshot {
        reply: RpcReplyPort<CampaignSnapshot>,
    },
}

/// Point-in-time view of a running campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignSnapshot {
    pub key: CampaignKey,
    pub phase: &'static str,
    pub initialized: bool,
    pub completed: bool,
    pub successful: Option<bool>,
    /// Factories still taking part in the campaign.
    pub factories: Vec<NodeId>,
    pub message: Option<String>,
    /// Directives published on a unicast channel no factory listened to.
    pub lost_directives: usize,
}

/// How a campaign ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignOutcome {
    pub key: CampaignKey,
    pub successful: bool,
    pub message: Option<String>,
}

/// Pending abort of one campaign.
///
/// Requests are merged: a hard request is never downgraded by a later soft
/// one.
#[derive(Debug, Default)]
pub struct AbortSlot {
    pending: Mutex<Option<AbortConfiguration>>,
}

impl AbortSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn request(&self, configuration: AbortConfiguration) {
        let mut pending = self.pending.lock().await;
        *pending = Some(
            pending
                .map_or(configuration, |current| current.merge(configuration)),
        );
    }

    pub async fn take(&self) -> Option<AbortConfiguration> {
        self.pending.lock().await.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hard_request_survives_later_soft_one() {
        let slot = AbortSlot::new();
        slot.request(AbortConfiguration::hard()).await;
        slot.request(AbortConfiguration::soft()).await;

        assert_eq!(slot.take().await, Some(AbortConfiguration::hard()));
        assert_eq!(slot.take().await, None);
    }
}
