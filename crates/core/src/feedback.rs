//! Feedbacks sent by the factories to the head.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{CampaignKey, MinionId, NodeId, ScenarioName};

/// Status carried by every feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackStatus {
    InProgress,
    Completed,
    Failed,
    /// The factory declined the work.
    Ignored,
}

impl FeedbackStatus {
    /// Whether the node has finished answering.
    pub const fn is_done(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Ignored => write!(f, "IGNORED"),
        }
    }
}

/// What the feedback reports on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedbackKind {
    /// A factory declining only one of its scenarios names it.
    FactoryAssignment {
        #[serde(default)]
        scenario: Option<ScenarioName>,
    },
    MinionsDeclaration { scenario: ScenarioName },
    MinionsAssignment { scenario: ScenarioName },
    MinionsRampUpPreparation { scenario: ScenarioName },
    MinionsStart { scenario: ScenarioName },
    ScenarioWarmUp { scenario: ScenarioName },
    CompleteMinion {
        scenario: ScenarioName,
        minion_id: MinionId,
    },
    EndOfCampaignScenario { scenario: ScenarioName },
    EndOfCampaign,
    FailedCampaign,
    CampaignAbort,
    CampaignScenarioShutdown { scenario: ScenarioName },
    CampaignShutdown,
    /// Raised by the head itself when a campaign timeout elapses.
    CampaignTimeout { hard: bool },
}

/// A status message from a node about a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub campaign_key: CampaignKey,
    pub node_id: NodeId,
    pub status: FeedbackStatus,
    pub error: Option<String>,
    pub kind: FeedbackKind,
}

impl Feedback {
    pub fn new(
        campaign_key: impl Into<CampaignKey>,
        node_id: impl Into<NodeId>,
        kind: FeedbackKind,
        status: FeedbackStatus,
    ) -> Self {
        Self {
            campaign_key: campaign_key.into(),
            node_id: node_id.into(),
            status,
            error: None,
            kind,
        }
    }

    /// A completed feedback.
    pub fn completed(
        campaign_key: impl Into<CampaignKey>,
        node_id: impl Into<NodeId>,
        kind: FeedbackKind,
    ) -> Self {
        Self::new(campaign_key, node_id, kind, FeedbackStatus::Completed)
    }

    /// A failed feedback with an error text.
    pub fn failed(
        campaign_key: impl Into<CampaignKey>,
        node_id: impl Into<NodeId>,
        kind: FeedbackKind,
        error: impl Into<String>,
    ) -> Self {
        Self::new(campaign_key, node_id, kind, FeedbackStatus::Failed).with_error(error)
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn scenario(&self) -> Option<&str> {
        match &self.kind {
            FeedbackKind::MinionsDeclaration { scenario }
            | FeedbackKind::MinionsAssignment { scenario }
            | FeedbackKind::MinionsRampUpPreparation { scenario }
            | FeedbackKind::MinionsStart { scenario }
            | FeedbackKind::ScenarioWarmUp { scenario }
            | FeedbackKind::CompleteMinion { scenario, .. }
            | FeedbackKind::EndOfCampaignScenario { scenario }
            | FeedbackKind::CampaignScenarioShutdown { scenario } => Some(scenario.as_str()),
            FeedbackKind::FactoryAssignment { scenario } => scenario.as_deref(),
            FeedbackKind::EndOfCampaign
            | FeedbackKind::FailedCampaign
            | FeedbackKind::CampaignAbort
            | FeedbackKind::CampaignShutdown
            | FeedbackKind::CampaignTimeout { .. } => None,
        }
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self.status, FeedbackStatus::Failed)
    }

    pub const fn is_completed(&self) -> bool {
        matches!(self.status, FeedbackStatus::Completed)
    }

    pub const fn is_ignored(&self) -> bool {
        matches!(self.status, FeedbackStatus::Ignored)
    }

    /// The error text, or the empty string when none was supplied.
    pub fn error_or_empty(&self) -> String {
        self.error.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_or_empty_without_error() {
        let feedback = Feedback::new(
            "c-1",
            "node-1",
            FeedbackKind::FactoryAssignment { scenario: None },
            FeedbackStatus::Failed,
        );
        assert_eq!(feedback.error_or_empty(), "");
    }

    #[test]
    fn test_failed_feedback_carries_error() {
        let feedback = Feedback::failed("c-1", "node-1", FeedbackKind::FailedCampaign, "boom");
        assert!(feedback.is_failed());
        assert_eq!(feedback.error_or_empty(), "boom");
    }

    #[test]
    fn test_scenario_of_feedback() {
        let feedback = Feedback::completed(
            "c-1",
            "node-1",
            FeedbackKind::CompleteMinion {
                scenario: "scenario-1".to_string(),
                minion_id: "m-1".to_string(),
            },
        );
        assert_eq!(feedback.scenario(), Some("scenario-1"));
    }

    #[test]
    fn test_in_progress_is_not_done() {
        assert!(!FeedbackStatus::InProgress.is_done());
        assert!(FeedbackStatus::Ignored.is_done());
    }
}
