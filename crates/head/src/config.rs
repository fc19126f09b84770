//! Configuration of the head.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use horde_core::ChannelName;

/// Configuration of the head process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadConfig {
    /// Channel every factory listens to.
    #[serde(default = "default_broadcast_channel")]
    pub broadcast_channel: ChannelName,

    /// Channel the factories publish their feedbacks on.
    #[serde(default = "default_feedback_channel")]
    pub feedback_channel: ChannelName,

    /// Deadline of a query to a campaign actor, in milliseconds.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,

    /// Capacity of every pub/sub channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_broadcast_channel() -> ChannelName {
    "directives-broadcast".to_string()
}

fn default_feedback_channel() -> ChannelName {
    "feedbacks".to_string()
}

const fn default_rpc_timeout() -> u64 {
    1_000
}

const fn default_channel_capacity() -> usize {
    1_024
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            broadcast_channel: default_broadcast_channel(),
            feedback_channel: default_feedback_channel(),
            rpc_timeout_ms: default_rpc_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl HeadConfig {
    pub const fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.broadcast_channel.trim().is_empty() {
            return Err("broadcast_channel must not be empty".to_string());
        }
        if self.feedback_channel.trim().is_empty() {
            return Err("feedback_channel must not be empty".to_string());
        }
        if self.broadcast_channel == self.feedback_channel {
            return Err("broadcast_channel and feedback_channel must differ".to_string());
        }
        if self.rpc_timeout_ms == 0 {
            return Err("rpc_timeout_ms must be > 0".to_string());
        }
        if self.channel_capacity == 0 {
            return Err("channel_capacity must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(HeadConfig::default().validate().is_ok());
    }

    #[test]
    fn test_same_channel_for_directives_and_feedbacks_is_rejected() {
        let config = HeadConfig {
            feedback_channel: "directives-broadcast".to_string(),
            ..HeadConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rpc_timeout_is_rejected() {
        let config = HeadConfig {
            rpc_timeout_ms: 0,
            ..HeadConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err("rpc_timeout_ms must be > 0".to_string())
        );
    }
}
