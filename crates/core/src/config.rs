//! Service configuration.
//!
//! Layering: built-in defaults, then an optional TOML file, then environment
//! variables (`TASKHUB_BIND`, `TASKHUB_CORS_ORIGIN`, `TASKHUB_SNAPSHOT`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:3000")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Allowed CORS origin, or "*" for any
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_origin: default_cors_origin(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a bearer token.
    #[serde(
        rename = "session_ttl_secs",
        with = "duration_secs",
        default = "default_session_ttl"
    )]
    pub session_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl: default_session_ttl(),
        }
    }
}

/// Recurrence generator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the background generator runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How often due templates are scanned.
    #[serde(
        rename = "tick_interval_secs",
        with = "duration_secs",
        default = "default_tick_interval"
    )]
    pub tick_interval: Duration,
    /// Maximum instances generated per template in one tick.
    #[serde(default = "default_max_catch_up")]
    pub max_catch_up: usize,
    /// Tasks due within this window trigger a due-soon notification.
    #[serde(
        rename = "due_soon_window_secs",
        with = "duration_secs",
        default = "default_due_soon_window"
    )]
    pub due_soon_window: Duration,
    /// Upper bound for the backoff after consecutive failed ticks.
    #[serde(
        rename = "max_backoff_secs",
        with = "duration_secs",
        default = "default_max_backoff"
    )]
    pub max_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval: default_tick_interval(),
            max_catch_up: default_max_catch_up(),
            due_soon_window: default_due_soon_window(),
            max_backoff: default_max_backoff(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON snapshot loaded on start and written on shutdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from an optional TOML file, then apply the process
    /// environment on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or holds
    /// values that fail validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let config = base.with_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from an environment lookup.
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("TASKHUB_BIND") {
            self.server.bind_address = bind;
        }
        if let Some(origin) = lookup("TASKHUB_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }
        if let Some(snapshot) = lookup("TASKHUB_SNAPSHOT") {
            self.storage.snapshot_path = Some(PathBuf::from(snapshot));
        }
        self
    }

    /// Check values that serde alone cannot constrain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.trim().is_empty() {
            return Err(Error::invalid_config("server.bind_address", "must not be empty"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(Error::invalid_config("server.max_body_bytes", "must be positive"));
        }
        if self.auth.session_ttl.is_zero() {
            return Err(Error::invalid_config("auth.session_ttl_secs", "must be positive"));
        }
        if self.scheduler.tick_interval.is_zero() {
            return Err(Error::invalid_config(
                "scheduler.tick_interval_secs",
                "must be positive",
            ));
        }
        if self.scheduler.max_catch_up == 0 {
            return Err(Error::invalid_config(
                "scheduler.max_catch_up",
                "must be at least 1",
            ));
        }
        if self.scheduler.max_backoff < self.scheduler.tick_interval {
            return Err(Error::invalid_config(
                "scheduler.max_backoff_secs",
                "must not be shorter than the tick interval",
            ));
        }
        Ok(())
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_cors_origin() -> String {
    "*".to_string()
}

const fn default_max_body_bytes() -> usize {
    1_048_576
}

const fn default_session_ttl() -> Duration {
    Duration::from_secs(60 * 60 * 24) // 1 day
}

const fn default_true() -> bool {
    true
}

const fn default_tick_interval() -> Duration {
    Duration::from_secs(60)
}

const fn default_max_catch_up() -> usize {
    31
}

const fn default_due_soon_window() -> Duration {
    Duration::from_secs(60 * 60 * 24)
}

const fn default_max_backoff() -> Duration {
    Duration::from_secs(15 * 60)
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert_eq!(config.auth.session_ttl, Duration::from_secs(86_400));
        assert!(config.scheduler.enabled);
        assert!(config.storage.snapshot_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let config = Config::from_toml(
            r#"
            [server]
            bind_address = "0.0.0.0:8080"

            [scheduler]
            tick_interval_secs = 5
            "#,
        )?;
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.server.cors_origin, "*");
        assert_eq!(config.scheduler.tick_interval, Duration::from_secs(5));
        assert_eq!(config.scheduler.max_catch_up, 31);
        Ok(())
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = Config::from_toml("[server\nbind_address = 1");
        assert!(matches!(result, Err(Error::TomlParseFailed { .. })));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("TASKHUB_BIND", "10.0.0.1:9000"),
            ("TASKHUB_SNAPSHOT", "/var/lib/taskhub/state.json"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().with_env(|k| env.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.server.bind_address, "10.0.0.1:9000");
        assert_eq!(
            config.storage.snapshot_path,
            Some(PathBuf::from("/var/lib/taskhub/state.json"))
        );
        assert_eq!(config.server.cors_origin, "*");
    }

    #[test]
    fn test_validate_rejects_zero_catch_up() {
        let mut config = Config::default();
        config.scheduler.max_catch_up = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scheduler.max_catch_up"));
    }

    #[test]
    fn test_validate_rejects_backoff_shorter_than_tick() {
        let mut config = Config::default();
        config.scheduler.max_backoff = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_reads_toml() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "[auth]\nsession_ttl_secs = 120")?;
        let config = Config::from_file(file.path())?;
        assert_eq!(config.auth.session_ttl, Duration::from_secs(120));
        Ok(())
    }

    #[test]
    fn test_from_file_missing_is_read_error() {
        let result = Config::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(Error::FileReadFailed { .. })));
    }
}
