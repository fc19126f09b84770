//! Configuration of a factory.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use horde_core::{ChannelName, NodeId, Tenant};

use crate::store::AssignmentMode;

/// Configuration of the minion assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// How the DAGs of a minion may be spread across factories.
    #[serde(default = "default_strategy")]
    pub strategy: AssignmentMode,

    /// Number of minions evaluated per atomic assignment round.
    #[serde(default = "default_evaluation_batch_size")]
    pub evaluation_batch_size: usize,

    /// Deadline of a whole assignment loop, in milliseconds.
    #[serde(default = "default_assignment_timeout")]
    pub timeout_ms: u64,
}

const fn default_strategy() -> AssignmentMode {
    AssignmentMode::SingleLocation
}

const fn default_evaluation_batch_size() -> usize {
    100
}

const fn default_assignment_timeout() -> u64 {
    10_000
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignmentConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            strategy: default_strategy(),
            evaluation_batch_size: default_evaluation_batch_size(),
            timeout_ms: default_assignment_timeout(),
        }
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Deadlines of the minion and scenario teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownConfig {
    /// Deadline of the teardown of one item, in milliseconds.
    #[serde(default = "default_item_timeout")]
    pub item_timeout_ms: u64,

    /// Deadline of a whole teardown batch, in milliseconds.
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_ms: u64,

    /// Items torn down concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

const fn default_item_timeout() -> u64 {
    1_000
}

const fn default_batch_timeout() -> u64 {
    10_000
}

const fn default_concurrency() -> usize {
    32
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            item_timeout_ms: default_item_timeout(),
            batch_timeout_ms: default_batch_timeout(),
            concurrency: default_concurrency(),
        }
    }
}

impl TeardownConfig {
    pub const fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }

    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

/// Configuration of a factory process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfig {
    #[serde(default = "default_node_id")]
    pub node_id: NodeId,

    #[serde(default = "default_tenant")]
    pub tenant: Tenant,

    /// Channel on which the factory receives its own directives.
    #[serde(default = "default_unicast_channel")]
    pub unicast_channel: ChannelName,

    #[serde(default)]
    pub assignment: AssignmentConfig,

    #[serde(default)]
    pub teardown: TeardownConfig,
}

fn default_node_id() -> NodeId {
    "factory-1".to_string()
}

fn default_tenant() -> Tenant {
    "default".to_string()
}

fn default_unicast_channel() -> ChannelName {
    "factory-1-unicast".to_string()
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            tenant: default_tenant(),
            unicast_channel: default_unicast_channel(),
            assignment: AssignmentConfig::default(),
            teardown: TeardownConfig::default(),
        }
    }
}

impl FactoryConfig {
    /// Configuration of a factory named `node_id`, with its unicast channel
    /// derived from the name.
    pub fn for_node(node_id: impl Into<NodeId>) -> Self {
        let node_id = node_id.into();
        Self {
            unicast_channel: format!("{node_id}-unicast"),
            node_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<Tenant>) -> Self {
        self.tenant = tenant.into();
        self
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: AssignmentMode) -> Self {
        self.assignment.strategy = strategy;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.node_id.trim().is_empty() {
            return Err("node_id must not be empty".to_string());
        }
        if self.unicast_channel.trim().is_empty() {
            return Err("unicast_channel must not be empty".to_string());
        }
        if self.assignment.evaluation_batch_size == 0 {
            return Err("assignment.evaluation_batch_size must be > 0".to_string());
        }
        if self.assignment.timeout_ms == 0 {
            return Err("assignment.timeout_ms must be > 0".to_string());
        }
        if self.teardown.concurrency == 0 {
            return Err("teardown.concurrency must be > 0".to_string());
        }
        if self.teardown.item_timeout_ms > self.teardown.batch_timeout_ms {
            return Err("teardown.item_timeout_ms must not exceed batch_timeout_ms".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FactoryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_for_node_derives_unicast_channel() {
        let config = FactoryConfig::for_node("factory-7");
        assert_eq!(config.unicast_channel, "factory-7-unicast");
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let mut config = FactoryConfig::default();
        config.assignment.evaluation_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: Result<FactoryConfig, _> = toml::from_str(
            r#"
            node_id = "factory-2"

            [assignment]
            strategy = "distributed-minion"
            "#,
        );
        assert!(matches!(
            parsed,
            Ok(config) if config.assignment.strategy == AssignmentMode::DistributedMinion
                && config.assignment.evaluation_batch_size == 100
                && config.tenant == "default"
        ));
    }
}
