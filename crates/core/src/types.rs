//! Domain types shared by the head and the factories.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique key of a campaign.
pub type CampaignKey = String;
/// Name of a scenario inside a campaign.
pub type ScenarioName = String;
/// Identifier of a minion.
pub type MinionId = String;
/// Identifier of a DAG inside a scenario.
pub type DagId = String;
/// Identifier of a factory node.
pub type NodeId = String;
/// Name of a pub/sub channel.
pub type ChannelName = String;
/// Tenant owning a campaign.
pub type Tenant = String;

/// Opaque snapshot of the execution profile of a scenario.
///
/// The ramp-up pacing algorithms are not interpreted by the head: the
/// snapshot is only forwarded to the factories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    /// Name of the pacing algorithm (`regular`, `progressive`, ...).
    pub kind: String,
    /// Parameters of the algorithm.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub parameters: serde_json::Value,
}

impl ExecutionProfile {
    pub fn new(kind: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            parameters,
        }
    }
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self::new("immediate", serde_json::Value::Null)
    }
}

/// Configuration of one scenario inside a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfiguration {
    /// Number of under-load minions to run.
    pub minions_count: u32,
    /// Pacing of the minions.
    #[serde(default)]
    pub execution_profile: ExecutionProfile,
}

impl ScenarioConfiguration {
    pub fn new(minions_count: u32, execution_profile: ExecutionProfile) -> Self {
        Self {
            minions_count,
            execution_profile,
        }
    }
}

/// The DAGs of a scenario a factory is asked to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryScenarioAssignment {
    pub scenario: ScenarioName,
    pub dags: Vec<DagId>,
    /// Upper bound of minions the factory may take for the scenario.
    #[serde(default = "default_maximal_minion_count")]
    pub maximal_minion_count: u32,
}

const fn default_maximal_minion_count() -> u32 {
    u32::MAX
}

impl FactoryScenarioAssignment {
    pub fn new(scenario: impl Into<ScenarioName>, dags: Vec<DagId>) -> Self {
        Self {
            scenario: scenario.into(),
            dags,
            maximal_minion_count: default_maximal_minion_count(),
        }
    }

    #[must_use]
    pub const fn with_maximal_minion_count(mut self, count: u32) -> Self {
        self.maximal_minion_count = count;
        self
    }
}

/// What a factory was assigned in a campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfiguration {
    /// Channel on which the factory receives its own directives.
    pub unicast_channel: ChannelName,
    /// Assignments, by scenario.
    pub assignment: BTreeMap<ScenarioName, FactoryScenarioAssignment>,
}

impl FactoryConfiguration {
    pub fn new(unicast_channel: impl Into<ChannelName>) -> Self {
        Self {
            unicast_channel: unicast_channel.into(),
            assignment: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_assignment(mut self, assignment: FactoryScenarioAssignment) -> Self {
        self.assignment
            .insert(assignment.scenario.clone(), assignment);
        self
    }
}

/// Final or intermediate status of a campaign or scenario report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Queued,
    InProgress,
    Successful,
    Warning,
    Failed,
    Aborted,
}

impl ExecutionStatus {
    /// Whether the status closes a report.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Successful | Self::Warning | Self::Failed | Self::Aborted
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Successful => write!(f, "SUCCESSFUL"),
            Self::Warning => write!(f, "WARNING"),
            Self::Failed => write!(f, "FAILED"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// One line of a ramp-up: start `count` minions `offset_ms` after the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinionsStartingLine {
    pub count: u32,
    pub offset_ms: u64,
}

impl MinionsStartingLine {
    pub const fn new(count: u32, offset_ms: u64) -> Self {
        Self { count, offset_ms }
    }
}

/// Thresholds crossed by one completion report.
///
/// Each flag is only true for the call that crossed it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCompletionState {
    pub minion_complete: bool,
    pub scenario_complete: bool,
    pub campaign_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_defaults_to_unbounded_minion_count() {
        let assignment = FactoryScenarioAssignment::new("scenario-1", vec!["dag-1".to_string()]);
        assert_eq!(assignment.maximal_minion_count, u32::MAX);
    }

    #[test]
    fn test_assignment_deserializes_without_maximal_count() {
        let raw = r#"{"scenario":"s","dags":["d"]}"#;
        let parsed: Result<FactoryScenarioAssignment, _> = serde_json::from_str(raw);
        assert!(matches!(parsed, Ok(a) if a.maximal_minion_count == u32::MAX));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ExecutionStatus::Aborted.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::InProgress.is_terminal());
        assert!(!ExecutionStatus::Queued.is_terminal());
    }
}
