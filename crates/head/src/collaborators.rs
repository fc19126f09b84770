//! Services the campaign states rely on.
//!
//! - `FactoryDirectory`: health of the factories and their release to the pool
//! - `CampaignReportStateKeeper`: the report of a campaign while it runs
//!
//! Both come with an in-memory implementation, used by the standalone head
//! and by the tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use horde_core::{CampaignKey, ExecutionStatus, NodeId, ScenarioName};

use crate::campaign::RunningCampaign;
use crate::errors::HeadError;

// ═══════════════════════════════════════════════════════════════════════════
// FACTORY DIRECTORY
// ═══════════════════════════════════════════════════════════════════════════

/// Last known state of a factory, from its heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeartbeatState {
    Registered,
    Unregistered,
    Idle,
    Offline,
    Unhealthy,
}

impl HeartbeatState {
    /// Whether the factory can still answer directives.
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Idle)
    }
}

#[async_trait]
pub trait FactoryDirectory: Send + Sync {
    /// Current state of the given factories. Unknown factories are absent
    /// from the result.
    async fn health(&self, nodes: &[NodeId]) -> Result<HashMap<NodeId, HeartbeatState>, HeadError>;

    /// Give factories back to the pool.
    async fn release(&self, campaign: &RunningCampaign, nodes: &[NodeId]) -> Result<(), HeadError>;
}

#[derive(Debug, Default)]
pub struct InMemoryFactoryDirectory {
    states: RwLock<HashMap<NodeId, HeartbeatState>>,
    releases: RwLock<Vec<(CampaignKey, NodeId)>>,
}

impl InMemoryFactoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory where every given factory is idle.
    pub fn with_idle_nodes<I, N>(nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        Self {
            states: RwLock::new(
                nodes
                    .into_iter()
                    .map(|node| (node.into(), HeartbeatState::Idle))
                    .collect(),
            ),
            releases: RwLock::new(Vec::new()),
        }
    }

    pub async fn set_state(&self, node: impl Into<NodeId>, state: HeartbeatState) {
        self.states.write().await.insert(node.into(), state);
    }

    /// Factories released for a campaign, in release order.
    pub async fn released(&self, campaign: &str) -> Vec<NodeId> {
        self.releases
            .read()
            .await
            .iter()
            .filter(|(key, _)| key == campaign)
            .map(|(_, node)| node.clone())
            .collect()
    }
}

#[async_trait]
impl FactoryDirectory for InMemoryFactoryDirectory {
    async fn health(&self, nodes: &[NodeId]) -> Result<HashMap<NodeId, HeartbeatState>, HeadError> {
        let states = self.states.read().await;
        Ok(nodes
            .iter()
            .filter_map(|node| states.get(node).map(|state| (node.clone(), *state)))
            .collect())
    }

    async fn release(&self, campaign: &RunningCampaign, nodes: &[NodeId]) -> Result<(), HeadError> {
        let mut releases = self.releases.write().await;
        for node in nodes {
            releases.push((campaign.key.clone(), node.clone()));
        }
        debug!(campaign = %campaign.key, nodes = ?nodes, "Factories released");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// REPORT STATE KEEPER
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportSeverity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMessage {
    pub scenario: Option<ScenarioName>,
    pub severity: ReportSeverity,
    pub message: String,
}

/// Report of one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub campaign_key: CampaignKey,
    pub status: ExecutionStatus,
    pub scenarios: BTreeMap<ScenarioName, ExecutionStatus>,
    pub messages: Vec<ReportMessage>,
    pub aborted: bool,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CampaignReport {
    fn new(campaign_key: &str) -> Self {
        Self {
            campaign_key: campaign_key.to_string(),
            status: ExecutionStatus::InProgress,
            scenarios: BTreeMap::new(),
            messages: Vec::new(),
            aborted: false,
            message: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

#[async_trait]
pub trait CampaignReportStateKeeper: Send + Sync {
    async fn start(&self, campaign: &str, scenario: &str) -> Result<(), HeadError>;

    async fn complete(&self, campaign: &str, scenario: &str) -> Result<(), HeadError>;

    /// Mark the campaign as aborted; running scenarios are aborted with it.
    async fn abort(&self, campaign: &str) -> Result<(), HeadError>;

    async fn report_message(
        &self,
        campaign: &str,
        scenario: Option<&str>,
        severity: ReportSeverity,
        message: &str,
    ) -> Result<(), HeadError>;

    /// Close the report. Only the first terminal status is kept.
    async fn close(
        &self,
        campaign: &str,
        status: ExecutionStatus,
        message: Option<&str>,
    ) -> Result<(), HeadError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCampaignReportStateKeeper {
    reports: RwLock<HashMap<CampaignKey, CampaignReport>>,
}

impl InMemoryCampaignReportStateKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn report(&self, campaign: &str) -> Option<CampaignReport> {
        self.reports.read().await.get(campaign).cloned()
    }
}

#[async_trait]
impl CampaignReportStateKeeper for InMemoryCampaignReportStateKeeper {
    async fn start(&self, campaign: &str, scenario: &str) -> Result<(), HeadError> {
        self.reports
            .write()
            .await
            .entry(campaign.to_string())
            .or_insert_with(|| CampaignReport::new(campaign))
            .scenarios
            .insert(scenario.to_string(), ExecutionStatus::InProgress);
        trace!(campaign = %campaign, scenario = %scenario, "Scenario started");
        Ok(())
    }

    async fn complete(&self, campaign: &str, scenario: &str) -> Result<(), HeadError> {
        let mut reports = self.reports.write().await;
        let report = reports
            .entry(campaign.to_string())
            .or_insert_with(|| CampaignReport::new(campaign));
        let status = report
            .scenarios
            .entry(scenario.to_string())
            .or_insert(ExecutionStatus::InProgress);
        if !status.is_terminal() {
            *status = ExecutionStatus::Successful;
        }
        trace!(campaign = %campaign, scenario = %scenario, "Scenario completed");
        Ok(())
    }

    async fn abort(&self, campaign: &str) -> Result<(), HeadError> {
        let mut reports = self.reports.write().await;
        let report = reports
            .entry(campaign.to_string())
            .or_insert_with(|| CampaignReport::new(campaign));
        report.aborted = true;
        report
            .scenarios
            .values_mut()
            .filter(|status| !status.is_terminal())
            .for_each(|status| *status = ExecutionStatus::Aborted);
        Ok(())
    }

    async fn report_message(
        &self,
        campaign: &str,
        scenario: Option<&str>,
        severity: ReportSeverity,
        message: &str,
    ) -> Result<(), HeadError> {
        self.reports
            .write()
            .await
            .entry(campaign.to_string())
            .or_insert_with(|| CampaignReport::new(campaign))
            .messages
            .push(ReportMessage {
                scenario: scenario.map(ToString::to_string),
                severity,
                message: message.to_string(),
            });
        Ok(())
    }

    async fn close(
        &self,
        campaign: &str,
        status: ExecutionStatus,
        message: Option<&str>,
    ) -> Result<(), HeadError> {
        let mut reports = self.reports.write().await;
        let report = reports
            .entry(campaign.to_string())
            .or_insert_with(|| CampaignReport::new(campaign));
        if report.status.is_terminal() {
            debug!(campaign = %campaign, status = %report.status, ignored = %status, "Report already closed");
            return Ok(());
        }
        report.status = status;
        report.message = message.map(ToString::to_string);
        report.ended_at = Some(Utc::now());
        debug!(campaign = %campaign, status = %status, "Report closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_first_terminal_status_wins() {
        let keeper = InMemoryCampaignReportStateKeeper::new();
        keeper.close("c-1", ExecutionStatus::Aborted, Some("aborted")).await.unwrap();
        keeper.close("c-1", ExecutionStatus::Failed, Some("later")).await.unwrap();

        let report = keeper.report("c-1").await.unwrap();
        assert_eq!(report.status, ExecutionStatus::Aborted);
        assert_eq!(report.message.as_deref(), Some("aborted"));
        assert!(report.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_abort_marks_running_scenarios() {
        let keeper = InMemoryCampaignReportStateKeeper::new();
        keeper.start("c-1", "s1").await.unwrap();
        keeper.start("c-1", "s2").await.unwrap();
        keeper.complete("c-1", "s1").await.unwrap();

        keeper.abort("c-1").await.unwrap();

        let report = keeper.report("c-1").await.unwrap();
        assert!(report.aborted);
        assert_eq!(report.scenarios["s1"], ExecutionStatus::Successful);
        assert_eq!(report.scenarios["s2"], ExecutionStatus::Aborted);
    }

    #[tokio::test]
    async fn test_health_omits_unknown_nodes() {
        let directory = InMemoryFactoryDirectory::with_idle_nodes(["node-1"]);
        directory.set_state("node-2", HeartbeatState::Offline).await;

        let health = directory
            .health(&["node-1".to_string(), "node-2".to_string(), "node-3".to_string()])
            .await
            .unwrap();

        assert_eq!(health.len(), 2);
        assert!(health["node-1"].is_healthy());
        assert!(!health["node-2"].is_healthy());
    }
}
