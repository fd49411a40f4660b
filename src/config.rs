//! Supervisor configuration.
//!
//! Loads supervisor-wide tuning from `~/.appdock/config.toml`. These
//! settings are separate from per-application definitions, which the
//! embedding program supplies as [`crate::spec::AppSpec`] values.
//!
//! # Example Configuration
//!
//! ```toml
//! [logs]
//! max_size_mb = 10
//! max_files = 5
//!
//! [health]
//! poll_interval_secs = 2
//! check_timeout_secs = 5
//!
//! [stop]
//! grace_secs = 5
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::applog::RotationConfig;
use crate::constants::{
    DATA_DIR_NAME, DEFAULT_LOG_MAX_FILES, DEFAULT_LOG_MAX_SIZE, HEALTH_CHECK_TIMEOUT_SECS,
    HEALTH_POLL_INTERVAL_SECS, LOG_DIR_NAME, QUICK_CHECK_TIMEOUT_SECS, STOP_GRACE_SECS,
};

/// Supervisor-wide settings loaded from `~/.appdock/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Application log file settings.
    pub logs: LogSettings,
    /// Health check timing settings.
    pub health: HealthSettings,
    /// Process teardown settings.
    pub stop: StopSettings,
}

/// Application log file settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Log directory override; defaults to `~/.appdock/logs`.
    pub dir: Option<PathBuf>,
    /// Size threshold in megabytes before a log file is rotated.
    pub max_size_mb: u64,
    /// Rotated files kept per application.
    pub max_files: usize,
}

/// Health check timing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Delay between attempts while waiting for an app to become healthy.
    pub poll_interval_secs: u64,
    /// Per-request timeout during the startup health wait.
    pub check_timeout_secs: u64,
    /// Per-request timeout for opportunistic checks during refresh.
    pub quick_check_timeout_secs: u64,
}

/// Process teardown settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StopSettings {
    /// Grace period before surviving processes are force killed.
    pub grace_secs: u64,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            max_size_mb: DEFAULT_LOG_MAX_SIZE / (1024 * 1024),
            max_files: DEFAULT_LOG_MAX_FILES,
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: HEALTH_POLL_INTERVAL_SECS,
            check_timeout_secs: HEALTH_CHECK_TIMEOUT_SECS,
            quick_check_timeout_secs: QUICK_CHECK_TIMEOUT_SECS,
        }
    }
}

impl Default for StopSettings {
    fn default() -> Self {
        Self {
            grace_secs: STOP_GRACE_SECS,
        }
    }
}

impl SupervisorConfig {
    /// Load configuration from `~/.appdock/config.toml`.
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid, returns an error.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::debug!(
                path = %config_path.display(),
                "Supervisor config not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path).with_context(|| {
            format!(
                "Failed to read supervisor config from {}",
                config_path.display()
            )
        })?;

        let config = Self::from_toml(&content).with_context(|| {
            format!(
                "Failed to parse supervisor config from {}",
                config_path.display()
            )
        })?;

        tracing::info!(
            path = %config_path.display(),
            poll_interval_secs = config.health.poll_interval_secs,
            check_timeout_secs = config.health.check_timeout_secs,
            stop_grace_secs = config.stop.grace_secs,
            "Loaded supervisor configuration"
        );

        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// Missing sections and fields fall back to their defaults, so a
    /// partial fragment is accepted.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse supervisor config")
    }

    /// Path to the supervisor configuration file.
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(DATA_DIR_NAME).join("config.toml"))
    }

    /// Directory application logs are written to.
    pub fn log_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.logs.dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(DATA_DIR_NAME).join(LOG_DIR_NAME))
    }

    /// Rotation settings derived from the log section.
    #[must_use]
    pub fn rotation(&self) -> RotationConfig {
        RotationConfig {
            max_size: self.logs.max_size_mb * 1024 * 1024,
            max_files: self.logs.max_files,
        }
    }

    /// Delay between health attempts while waiting for startup.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.health.poll_interval_secs)
    }

    /// Per-request timeout during the startup health wait.
    #[must_use]
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.health.check_timeout_secs)
    }

    /// Per-request timeout for opportunistic checks during refresh.
    #[must_use]
    pub fn quick_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health.quick_check_timeout_secs)
    }

    /// Grace period before force killing a process tree.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop.grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SupervisorConfig::default();
        assert_eq!(config.logs.max_size_mb, 10);
        assert_eq!(config.logs.max_files, 5);
        assert!(config.logs.dir.is_none());
        assert_eq!(config.health.poll_interval_secs, 2);
        assert_eq!(config.health.check_timeout_secs, 5);
        assert_eq!(config.health.quick_check_timeout_secs, 3);
        assert_eq!(config.stop.grace_secs, 5);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[logs]
dir = "/var/log/appdock"
max_size_mb = 50
max_files = 3

[health]
poll_interval_secs = 1
check_timeout_secs = 10
quick_check_timeout_secs = 2

[stop]
grace_secs = 15
"#;
        let config = SupervisorConfig::from_toml(toml).unwrap();
        assert_eq!(config.logs.dir, Some(PathBuf::from("/var/log/appdock")));
        assert_eq!(config.logs.max_size_mb, 50);
        assert_eq!(config.logs.max_files, 3);
        assert_eq!(config.health.poll_interval_secs, 1);
        assert_eq!(config.health.check_timeout_secs, 10);
        assert_eq!(config.health.quick_check_timeout_secs, 2);
        assert_eq!(config.stop.grace_secs, 15);
    }

    #[test]
    fn test_parse_partial_config() {
        // Only the stop section
        let toml = r"
[stop]
grace_secs = 30
";
        let config = SupervisorConfig::from_toml(toml).unwrap();
        assert_eq!(config.stop.grace_secs, 30);
        // Other sections keep their defaults
        assert_eq!(config.logs.max_size_mb, 10);
        assert_eq!(config.health.poll_interval_secs, 2);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = SupervisorConfig::from_toml("").unwrap();
        assert_eq!(config.logs.max_files, 5);
        assert_eq!(config.health.check_timeout_secs, 5);
        assert_eq!(config.stop.grace_secs, 5);
    }

    #[test]
    fn test_from_toml_rejects_malformed_input() {
        let err = SupervisorConfig::from_toml("logs = ").unwrap_err();
        assert!(err.to_string().contains("Failed to parse supervisor config"));
    }

    #[test]
    fn test_config_path() {
        let path = SupervisorConfig::config_path().unwrap();
        assert!(path.ends_with("config.toml"));
        assert!(path.to_string_lossy().contains(".appdock"));
    }

    #[test]
    fn test_log_dir_override() {
        let mut config = SupervisorConfig::default();
        config.logs.dir = Some(PathBuf::from("/tmp/custom-logs"));
        assert_eq!(config.log_dir().unwrap(), PathBuf::from("/tmp/custom-logs"));
    }

    #[test]
    fn test_log_dir_default_location() {
        let config = SupervisorConfig::default();
        let dir = config.log_dir().unwrap();
        assert!(dir.ends_with("logs"));
        assert!(dir.to_string_lossy().contains(".appdock"));
    }

    #[test]
    fn test_rotation_from_logs_section() {
        let toml = r"
[logs]
max_size_mb = 2
max_files = 7
";
        let config = SupervisorConfig::from_toml(toml).unwrap();
        let rotation = config.rotation();
        assert_eq!(rotation.max_size, 2 * 1024 * 1024);
        assert_eq!(rotation.max_files, 7);
    }

    #[test]
    fn test_duration_accessors() {
        let config = SupervisorConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.check_timeout(), Duration::from_secs(5));
        assert_eq!(config.quick_check_timeout(), Duration::from_secs(3));
        assert_eq!(config.stop_grace(), Duration::from_secs(5));
    }
}
