//! Configuration management for netstate

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{NetstateError, NetstateResult};
use crate::retry::RetryBudget;

/// Main netstate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetstateConfig {
    /// External tool locations
    pub tools: ToolPaths,
    /// Verification retry behavior
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPaths {
    /// nmcli binary
    #[serde(default = "default_nmcli_bin")]
    pub nmcli_bin: PathBuf,
    /// ip binary
    #[serde(default = "default_ip_bin")]
    pub ip_bin: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Verification timeout (seconds)
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,
    /// Delay between state polls (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_nmcli_bin() -> PathBuf {
    PathBuf::from("nmcli")
}

fn default_ip_bin() -> PathBuf {
    PathBuf::from("ip")
}

fn default_verify_timeout_secs() -> u64 {
    45
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for NetstateConfig {
    fn default() -> Self {
        Self {
            tools: ToolPaths {
                nmcli_bin: default_nmcli_bin(),
                ip_bin: default_ip_bin(),
            },
            retry: RetrySettings {
                verify_timeout_secs: default_verify_timeout_secs(),
                poll_interval_ms: default_poll_interval_ms(),
            },
        }
    }
}

impl NetstateConfig {
    /// Default configuration file location
    pub const DEFAULT_PATH: &'static str = "/etc/netstate/config.toml";

    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> NetstateResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| NetstateError::ConfigError(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| NetstateError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load from a file if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> NetstateResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> NetstateResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NetstateError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| NetstateError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// The configured retry budget for verification
    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(Duration::from_secs(self.retry.verify_timeout_secs))
            .with_interval(Duration::from_millis(self.retry.poll_interval_ms))
    }
}
