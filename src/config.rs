//! Configuration module for Feed Relay.

use serde::Deserialize;
use std::path::Path;

use crate::{RelayError, Result};

/// Relay engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Politeness floor for poll intervals in seconds.
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
    /// Interval used when a registration does not specify one.
    #[serde(default = "default_interval")]
    pub default_interval_secs: u64,
    /// Fingerprints remembered per destination.
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,
    /// Newest feed items considered on each tick.
    #[serde(default = "default_max_items_per_tick")]
    pub max_items_per_tick: usize,
    /// Seed an empty ledger from the destination's recent messages.
    #[serde(default = "default_bootstrap_from_history")]
    pub bootstrap_from_history: bool,
    /// Number of recent messages read when seeding.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_min_interval() -> u64 {
    10
}

fn default_interval() -> u64 {
    60
}

fn default_ledger_capacity() -> usize {
    50
}

fn default_max_items_per_tick() -> usize {
    1
}

fn default_bootstrap_from_history() -> bool {
    true
}

fn default_history_limit() -> usize {
    50
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval(),
            default_interval_secs: default_interval(),
            ledger_capacity: default_ledger_capacity(),
            max_items_per_tick: default_max_items_per_tick(),
            bootstrap_from_history: default_bootstrap_from_history(),
            history_limit: default_history_limit(),
        }
    }
}

/// Feed fetching configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds (further capped by the poll interval).
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent sent with feed requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Reject loopback, private and intranet hosts as feed sources.
    #[serde(default)]
    pub block_private_hosts: bool,
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_user_agent() -> String {
    concat!("feedrelay/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_feed_size_bytes: default_max_feed_size(),
            connect_timeout_secs: default_connect_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            block_private_hosts: false,
        }
    }
}

/// Discord transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Bot token (may also come from the command line or environment).
    #[serde(default)]
    pub token: String,
    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Farewell text sent to every destination on shutdown (empty disables).
    #[serde(default = "default_farewell")]
    pub farewell: String,
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_farewell() -> String {
    "Feed relay is shutting down. Feeds will resume when it restarts.".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: default_api_base(),
            farewell: default_farewell(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedrelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Relay engine configuration.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Feed fetching configuration.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Discord configuration.
    #[serde(default)]
    pub discord: DiscordConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDRELAY_DISCORD_TOKEN`: Override the Discord bot token
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("FEEDRELAY_DISCORD_TOKEN") {
            if !token.is_empty() {
                self.discord.token = token;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.relay.min_interval_secs == 0 {
            return Err(RelayError::Config(
                "relay.min_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.relay.ledger_capacity == 0 {
            return Err(RelayError::Config(
                "relay.ledger_capacity must be at least 1".to_string(),
            ));
        }
        if self.relay.max_items_per_tick == 0 {
            return Err(RelayError::Config(
                "relay.max_items_per_tick must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
