//! Key layout of the assignment data in the coordination store.
//!
//! Every key of a campaign starts with the campaign prefix, so that the whole
//! campaign can be purged with a single prefix deletion once it completes.

use serde::{Deserialize, Serialize};

use horde_core::{ChannelName, MinionId};

/// Field of the campaign counters holding the remaining scenarios.
pub const SCENARIOS_FIELD: &str = "scenarios";
/// Field of the scenario counters holding the remaining under-load minions.
pub const MINIONS_FIELD: &str = "minions";

/// Encode a list of identifiers as a single hash value.
pub fn encode_list<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let items: Vec<&String> = items.into_iter().collect();
    serde_json::to_string(&items).unwrap_or_default()
}

/// Decode a value written by [`encode_list`]; malformed values decode as empty.
pub fn decode_list<T: FromIterator<String>>(encoded: &str) -> T {
    serde_json::from_str::<Vec<String>>(encoded)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

/// Builds the keys of one campaign of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    pub fn new(tenant: &str, campaign_key: &str) -> Self {
        Self {
            prefix: format!("{tenant}:{campaign_key}:assignment:"),
        }
    }

    /// Prefix shared by every key of the campaign.
    pub fn campaign_prefix(&self) -> &str {
        &self.prefix
    }

    fn scenario_key(&self, scenario: &str, suffix: &str) -> String {
        format!("{}scenario:{scenario}:{suffix}", self.prefix)
    }

    /// `campaign:counters` hash, field [`SCENARIOS_FIELD`].
    pub fn campaign_counters(&self) -> String {
        format!("{}campaign:counters", self.prefix)
    }

    /// Scenarios already counted in the campaign counters.
    pub fn counted_scenarios(&self) -> String {
        format!("{}campaign:counted-scenarios", self.prefix)
    }

    /// Scenario to channel of the factory that claimed its singleton minions.
    pub fn singletons_registry(&self) -> String {
        format!("{}campaign:singletons-registry", self.prefix)
    }

    /// Set of the DAGs a factory can run for a scenario.
    pub fn factory_dags(&self, scenario: &str, channel: &str) -> String {
        self.scenario_key(scenario, &format!("factory:{channel}"))
    }

    pub fn unassigned_minions(&self, scenario: &str) -> String {
        self.scenario_key(scenario, "unassigned-minions")
    }

    pub fn under_load_minions(&self, scenario: &str) -> String {
        self.scenario_key(scenario, "under-load-minions")
    }

    /// Hash of singleton minion to its DAGs.
    pub fn singleton_minions(&self, scenario: &str) -> String {
        self.scenario_key(scenario, "singleton-minions")
    }

    /// `scenario:counters` hash, field [`MINIONS_FIELD`].
    pub fn scenario_counters(&self, scenario: &str) -> String {
        self.scenario_key(scenario, "counters")
    }

    /// Remaining DAGs to complete, by minion.
    pub fn minion_remaining_dags(&self, scenario: &str) -> String {
        self.scenario_key(scenario, "minion:remaining-dags")
    }

    /// Total DAGs registered, by minion.
    pub fn minion_total_dags(&self, scenario: &str) -> String {
        self.scenario_key(scenario, "minion:total-dags")
    }

    pub fn minion_unassigned_dags(&self, scenario: &str, minion: &MinionId) -> String {
        self.scenario_key(scenario, &format!("minion:unassigned-dags:{minion}"))
    }

    /// Hash of DAG to the channel of the factory that runs it.
    pub fn minion_assigned_dags(&self, scenario: &str, minion: &MinionId) -> String {
        self.scenario_key(scenario, &format!("minion:assigned-dags:{minion}"))
    }

    /// Hash of minion to the channel of the factory holding its root DAG.
    pub fn root_owners(&self, scenario: &str) -> String {
        self.scenario_key(scenario, "root-owners")
    }

    /// Minions already evaluated by a factory in its current assignment loop.
    pub fn evaluated_minions(&self, scenario: &str, channel: &ChannelName) -> String {
        self.scenario_key(scenario, &format!("evaluated:{channel}"))
    }

    /// Hash of start offset to the minions starting at it.
    pub fn schedule(&self, scenario: &str) -> String {
        self.scenario_key(scenario, "schedule")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_shares_the_campaign_prefix() {
        let layout = KeyLayout::new("acme", "campaign-1");
        let minion = "m-1".to_string();
        let keys = [
            layout.campaign_counters(),
            layout.singletons_registry(),
            layout.factory_dags("s", "unicast-1"),
            layout.unassigned_minions("s"),
            layout.minion_assigned_dags("s", &minion),
            layout.evaluated_minions("s", &"unicast-1".to_string()),
            layout.schedule("s"),
        ];
        assert!(keys.iter().all(|k| k.starts_with(layout.campaign_prefix())));
    }

    #[test]
    fn test_list_encoding_survives_separators() {
        let items = vec!["dag,1".to_string(), "dag:2".to_string()];
        let decoded: Vec<String> = decode_list(&encode_list(&items));
        assert_eq!(decoded, items);
        let garbage: Vec<String> = decode_list("not json");
        assert!(garbage.is_empty());
    }

    #[test]
    fn test_tenants_do_not_share_keys() {
        let first = KeyLayout::new("acme", "campaign-1");
        let second = KeyLayout::new("globex", "campaign-1");
        assert_ne!(first.unassigned_minions("s"), second.unassigned_minions("s"));
    }
}
