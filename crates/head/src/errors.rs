//! Head-side error types.
//!
//! None of these ever reach a campaign state: the state machine logs
//! collaborator failures and keeps transitioning. They surface from the
//! orchestrator API only.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HeadError {
    /// No running campaign has this key.
    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),

    /// A campaign with this key is already running.
    #[error("Campaign already running: {0}")]
    CampaignAlreadyRunning(String),

    /// A collaborator (factory directory, report keeper) failed.
    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    /// RPC call timed out.
    #[error("RPC timeout after {0:?}")]
    RpcTimeout(Duration),

    /// The actor is not available (stopped or not started).
    #[error("Actor not available")]
    ActorUnavailable,

    /// Failed to spawn an actor.
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl HeadError {
    pub fn campaign_not_found(key: impl Into<String>) -> Self {
        Self::CampaignNotFound(key.into())
    }

    pub fn campaign_already_running(key: impl Into<String>) -> Self {
        Self::CampaignAlreadyRunning(key.into())
    }

    pub fn collaborator(reason: impl Into<String>) -> Self {
        Self::Collaborator(reason.into())
    }

    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed(reason.into())
    }
}

impl From<horde_core::Error> for HeadError {
    fn from(error: horde_core::Error) -> Self {
        Self::Channel(error.to_string())
    }
}
