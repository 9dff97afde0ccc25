//! Error types for pullsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("could not read the config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A mandatory key is absent from the settings file.
    #[error("the config file did not contain the {key} setting")]
    MissingKey { key: String },

    /// A key is present but its value cannot be used.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Errors raised by the line codec.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent more than `limit` bytes without a line terminator.
    #[error("line exceeds {limit} bytes")]
    TooLong { limit: usize },
}

pub(crate) fn invalid_value(
    key: &str,
    value: impl Into<String>,
    reason: impl Into<String>,
) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
        reason: reason.into(),
    }
}
