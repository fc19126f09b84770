//! Configuration of the `horde` binary.
//!
//! Loaded from a TOML file with `[head]`, `[factory]`, `[campaign]` and
//! `[log]` tables. Every field has a default, so a missing file or table
//! yields a runnable configuration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use horde_core::{CampaignKey, DagId, Error, ExecutionProfile, ScenarioName, Tenant};
use horde_factory::{DagSpec, FactoryConfig, ScenarioRegistry, ScenarioSpec};
use horde_head::HeadConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HordeConfig {
    #[serde(default)]
    pub head: HeadConfig,

    /// Template of every simulated factory. The node id, unicast channel
    /// and tenant are derived per factory.
    #[serde(default)]
    pub factory: FactoryConfig,

    #[serde(default)]
    pub campaign: CampaignConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The campaign run by the standalone runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    #[serde(default = "default_campaign_key")]
    pub key: CampaignKey,

    #[serde(default = "default_tenant")]
    pub tenant: Tenant,

    /// Number of simulated factories.
    #[serde(default = "default_factories")]
    pub factories: usize,

    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,

    #[serde(default)]
    pub start_offset_ms: u64,

    #[serde(default = "default_true")]
    pub schedule_ramp_up: bool,

    #[serde(default)]
    pub soft_timeout_ms: Option<u64>,

    #[serde(default)]
    pub hard_timeout_ms: Option<u64>,

    /// Time a simulated minion spends running its DAGs.
    #[serde(default = "default_minion_duration")]
    pub minion_duration_ms: u64,

    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<ScenarioConfig>,
}

/// A scenario of the campaign. The first DAG is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: ScenarioName,
    pub minions: u32,
    pub dags: Vec<DagId>,
    #[serde(default)]
    pub execution_profile: ExecutionProfile,
}

fn default_campaign_key() -> CampaignKey {
    "campaign-1".to_string()
}

fn default_tenant() -> Tenant {
    "default".to_string()
}

const fn default_factories() -> usize {
    2
}

const fn default_speed_factor() -> f64 {
    1.0
}

const fn default_true() -> bool {
    true
}

const fn default_minion_duration() -> u64 {
    10
}

fn default_scenarios() -> Vec<ScenarioConfig> {
    vec![
        ScenarioConfig {
            name: "checkout".to_string(),
            minions: 20,
            dags: vec!["login".to_string(), "checkout".to_string()],
            execution_profile: ExecutionProfile::new(
                "regular",
                serde_json::json!({ "period_ms": 20, "minions_per_period": 5 }),
            ),
        },
        ScenarioConfig {
            name: "search".to_string(),
            minions: 10,
            dags: vec!["search".to_string()],
            execution_profile: ExecutionProfile::default(),
        },
    ]
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            key: default_campaign_key(),
            tenant: default_tenant(),
            factories: default_factories(),
            speed_factor: default_speed_factor(),
            start_offset_ms: 0,
            schedule_ramp_up: default_true(),
            soft_timeout_ms: None,
            hard_timeout_ms: None,
            minion_duration_ms: default_minion_duration(),
            scenarios: default_scenarios(),
        }
    }
}

impl CampaignConfig {
    pub fn soft_timeout(&self) -> Option<Duration> {
        self.soft_timeout_ms.map(Duration::from_millis)
    }

    pub fn hard_timeout(&self) -> Option<Duration> {
        self.hard_timeout_ms.map(Duration::from_millis)
    }

    pub const fn minion_duration(&self) -> Duration {
        Duration::from_millis(self.minion_duration_ms)
    }

    /// Names of the simulated factories: `factory-1`, `factory-2`, ...
    pub fn factory_nodes(&self) -> Vec<String> {
        (1..=self.factories).map(|i| format!("factory-{i}")).collect()
    }

    /// The scenarios every simulated factory knows.
    pub fn scenario_registry(&self) -> ScenarioRegistry {
        self.scenarios
            .iter()
            .fold(ScenarioRegistry::new(), |registry, scenario| {
                let dags = scenario
                    .dags
                    .iter()
                    .enumerate()
                    .map(|(i, dag)| {
                        let spec = DagSpec::new(dag.clone());
                        if i == 0 { spec.root() } else { spec }
                    })
                    .collect();
                registry.with_scenario(ScenarioSpec::new(scenario.name.clone(), dags))
            })
    }

    /// Validate the campaign.
    ///
    /// # Errors
    ///
    /// Returns error if the campaign cannot be run.
    pub fn validate(&self) -> Result<(), String> {
        if self.key.trim().is_empty() {
            return Err("campaign.key must not be empty".to_string());
        }
        if self.factories == 0 {
            return Err("campaign.factories must be > 0".to_string());
        }
        if !self.speed_factor.is_finite() || self.speed_factor <= 0.0 {
            return Err("campaign.speed_factor must be a positive number".to_string());
        }
        if let (Some(soft), Some(hard)) = (self.soft_timeout_ms, self.hard_timeout_ms) {
            if soft > hard {
                return Err("campaign.soft_timeout_ms must not exceed hard_timeout_ms".to_string());
            }
        }
        if self.scenarios.is_empty() {
            return Err("campaign.scenarios must not be empty".to_string());
        }
        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            if scenario.name.trim().is_empty() {
                return Err("scenario name must not be empty".to_string());
            }
            if !names.insert(scenario.name.as_str()) {
                return Err(format!("scenario '{}' is declared twice", scenario.name));
            }
            if scenario.minions == 0 {
                return Err(format!("scenario '{}' must have minions", scenario.name));
            }
            if scenario.dags.is_empty() {
                return Err(format!("scenario '{}' must have at least one DAG", scenario.name));
            }
        }
        Ok(())
    }
}

impl HordeConfig {
    /// Load the configuration from `path`, falling back to the defaults
    /// when no path is given or the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid TOML or holds
    /// an invalid configuration.
    pub fn load(path: Option<&Path>) -> horde_core::Result<Self> {
        let config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
                toml::from_str(&raw)?
            }
            Some(path) => {
                debug!(path = %path.display(), "Configuration file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.validate().map_err(Error::invalid_configuration)?;
        Ok(config)
    }

    /// Validate every table.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.head.validate().map_err(|e| format!("head: {e}"))?;
        self.factory.validate().map_err(|e| format!("factory: {e}"))?;
        self.campaign.validate()?;
        if self.log.level.trim().is_empty() {
            return Err("log.level must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(HordeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_path_falls_back_to_defaults() {
        let config = HordeConfig::load(Some(Path::new("/nonexistent/horde.toml"))).unwrap();
        assert_eq!(config, HordeConfig::default());
    }

    #[test]
    fn test_partial_tables_keep_field_defaults() {
        let raw = r#"
            [campaign]
            key = "nightly"
            factories = 3

            [[campaign.scenarios]]
            name = "browse"
            minions = 4
            dags = ["home", "product"]
        "#;
        let config: HordeConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.campaign.key, "nightly");
        assert_eq!(config.campaign.factories, 3);
        assert!(config.campaign.schedule_ramp_up);
        assert_eq!(config.campaign.scenarios.len(), 1);
        assert_eq!(config.campaign.scenarios[0].execution_profile, ExecutionProfile::default());
        assert_eq!(config.head, HeadConfig::default());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_duplicate_scenario_is_rejected() {
        let mut config = CampaignConfig::default();
        config.scenarios.push(config.scenarios[0].clone());
        assert_eq!(
            config.validate(),
            Err("scenario 'checkout' is declared twice".to_string())
        );
    }

    #[test]
    fn test_scenario_without_minions_is_rejected() {
        let mut config = CampaignConfig::default();
        config.scenarios[1].minions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_speed_factor_is_rejected() {
        let config = CampaignConfig {
            speed_factor: 0.0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_soft_timeout_after_hard_timeout_is_rejected() {
        let config = CampaignConfig {
            soft_timeout_ms: Some(2_000),
            hard_timeout_ms: Some(1_000),
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rendered_defaults_load_back() {
        let rendered = toml::to_string_pretty(&HordeConfig::default()).unwrap();
        let parsed: HordeConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, HordeConfig::default());
    }

    #[test]
    fn test_first_dag_is_the_root() {
        let registry = CampaignConfig::default().scenario_registry();
        let checkout = registry.get("checkout").unwrap();
        assert_eq!(checkout.root_dag().map(|dag| dag.id.as_str()), Some("login"));
        assert_eq!(checkout.under_load_dag_ids().len(), 2);
    }
}
