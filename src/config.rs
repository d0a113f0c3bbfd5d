//! Configuration module
//!
//! Configuration is loaded from a TOML file, optionally preceded by a `.env`
//! file, and a few `RELIABLE_TX_*` environment variables override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::submission::{PollSchedule, SubmitConfig};

pub const ENV_RPC_URL: &str = "RELIABLE_TX_RPC_URL";
pub const ENV_KEYPAIR: &str = "RELIABLE_TX_KEYPAIR";
pub const ENV_MAX_RETRIES: &str = "RELIABLE_TX_MAX_RETRIES";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Retry and confirmation settings applied to every request
    #[serde(default)]
    pub submit: SubmitConfig,

    /// Status polling schedule
    #[serde(default)]
    pub confirm: PollSchedule,

    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// List of RPC endpoints
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Connections kept per endpoint
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Rate limit per endpoint (requests per second, 0 disables)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: u32,

    /// Contact endpoints in the background at startup
    #[serde(default = "default_true")]
    pub warmup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to keypair file
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
}

// Default value functions
fn default_endpoints() -> Vec<String> { vec!["https://api.devnet.solana.com".to_string()] }
fn default_rpc_timeout() -> u64 { 30 }
fn default_pool_size() -> usize { 2 }
fn default_rate_limit() -> u32 { 40 }
fn default_keypair_path() -> String { "~/.config/solana/id.json".to_string() }
fn default_true() -> bool { true }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            timeout_secs: default_rpc_timeout(),
            pool_size: default_pool_size(),
            rate_limit_rps: default_rate_limit(),
            warmup: default_true(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            json_logs: false,
        }
    }
}

impl WalletConfig {
    /// Keypair path with a leading `~/` expanded
    pub fn resolved_keypair_path(&self) -> PathBuf {
        match (self.keypair_path.strip_prefix("~/"), std::env::var_os("HOME")) {
            (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
            _ => PathBuf::from(&self.keypair_path),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `.env`, the TOML file if given, then environment overrides; validate the result
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RELIABLE_TX_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(urls) = lookup(ENV_RPC_URL) {
            self.rpc.endpoints = urls
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(path) = lookup(ENV_KEYPAIR) {
            self.wallet.keypair_path = path;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.submit.max_retries = value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                key: ENV_MAX_RETRIES,
                value,
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.endpoints.is_empty() {
            return Err(ConfigError::Invalid("rpc.endpoints must not be empty".to_string()));
        }
        if self.rpc.pool_size == 0 {
            return Err(ConfigError::Invalid("rpc.pool_size must be at least 1".to_string()));
        }
        self.submit
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("submit: {e}")))?;
        self.confirm
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("confirm: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConfirmationStrength;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.rpc.pool_size, 2);
        assert_eq!(config.submit.max_retries, 3);
        assert_eq!(config.submit.base_delay_ms, 500);
        assert_eq!(config.submit.max_delay_ms, 8_000);
        assert_eq!(config.submit.per_attempt_timeout_ms, 60_000);
        assert_eq!(config.submit.commitment, ConfirmationStrength::Confirmed);
        assert_eq!(config.confirm.base_ms, 1_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.rpc.endpoints, default_endpoints());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_RPC_URL, "http://a:8899, http://b:8899"),
            (ENV_KEYPAIR, "/tmp/key.json"),
            (ENV_MAX_RETRIES, "7"),
        ]);
        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.rpc.endpoints, vec!["http://a:8899", "http://b:8899"]);
        assert_eq!(config.wallet.keypair_path, "/tmp/key.json");
        assert_eq!(config.submit.max_retries, 7);
    }

    #[test]
    fn test_bad_override() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == ENV_MAX_RETRIES).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn test_validate_rules() {
        let mut config = Config::default();
        config.submit.max_retries = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.submit.base_delay_ms = 10_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rpc.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.confirm.growth = 0.9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rpc.endpoints.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tilde_expansion() {
        let wallet = WalletConfig {
            keypair_path: "/abs/id.json".to_string(),
        };
        assert_eq!(wallet.resolved_keypair_path(), PathBuf::from("/abs/id.json"));
    }
}
