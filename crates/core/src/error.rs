//! Core error types for TaskHub.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for loading configuration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },

    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::TomlParseFailed {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_file_read_failed_display() {
        let err = Error::file_read_failed("/tmp/missing.toml", "not found");
        assert_eq!(
            err.to_string(),
            "failed to read file '/tmp/missing.toml': not found"
        );
    }

    #[test]
    fn test_invalid_config_display() {
        let err = Error::invalid_config("scheduler.max_catch_up", "must be at least 1");
        assert!(err.to_string().contains("scheduler.max_catch_up"));
        assert!(err.to_string().contains("must be at least 1"));
    }

    #[test]
    fn test_toml_error_converts() {
        let err: Error = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
        assert!(matches!(err, Error::TomlParseFailed { .. }));
    }
}
