//! Core error types for horde operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type shared by the head and the factories.
#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    // Messaging errors
    #[error("channel closed: {channel}")]
    ChannelClosed { channel: String },

    #[error("subscriber lagged behind on '{channel}', {skipped} messages skipped")]
    ChannelLagged { channel: String, skipped: u64 },

    #[error("malformed message: {reason}")]
    MalformedMessage { reason: String },
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a TOML parse error.
    pub fn toml_parse_failed(reason: impl Into<String>) -> Self {
        Self::TomlParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create a channel closed error.
    pub fn channel_closed(channel: impl Into<String>) -> Self {
        Self::ChannelClosed {
            channel: channel.into(),
        }
    }

    /// Create a malformed message error.
    pub fn malformed_message(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::toml_parse_failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message_display() {
        let err = Error::malformed_message("unknown campaign 'c-1'");
        assert_eq!(err.to_string(), "malformed message: unknown campaign 'c-1'");
    }

    #[test]
    fn test_toml_error_conversion() {
        let parsed: std::result::Result<toml::Value, toml::de::Error> = toml::from_str("= nope");
        let err = parsed.map_err(Error::from);
        assert!(matches!(err, Err(Error::TomlParseFailed { .. })));
    }
}
