//! PrivWealth Configuration
//!
//! Shared configuration crate for all PrivWealth components.
//!
//! Handles loading configuration from:
//! 1. PW_CONFIG env var (explicit path)
//! 2. ./privwealth.toml (current directory)
//! 3. ~/.privwealth/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "privwealth.toml";
const HOME_CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".privwealth";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_DESTINATION: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
const DEFAULT_CHAIN_ID: u64 = 84532;
const DEFAULT_BLOCK_TIME_MS: u64 = 500;
const DEFAULT_COMPARISON_DELAY_BLOCKS: u64 = 3;
const DEFAULT_FEE_PER_WRITE: u64 = 0;
const DEFAULT_RECEIPT_TIMEOUT_MS: u64 = 30_000;

const DEFAULT_PARTICIPANTS_INTERVAL_MS: u64 = 2000;
const DEFAULT_WINNERS_INTERVAL_MS: u64 = 2000;
const DEFAULT_OWN_HANDLE_INTERVAL_MS: u64 = 200;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivWealthConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub features: FeatureFlags,
}

/// Ledger and chain context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Contract address handles are bound to (20-byte hex)
    #[serde(default = "default_destination")]
    pub destination: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_block_time")]
    pub block_time_ms: u64,
    /// Blocks between a comparison trigger and its result
    #[serde(default = "default_comparison_delay")]
    pub comparison_delay_blocks: u64,
    #[serde(default = "default_fee_per_write")]
    pub fee_per_write: u64,
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            destination: DEFAULT_DESTINATION.into(),
            chain_id: DEFAULT_CHAIN_ID,
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
            comparison_delay_blocks: DEFAULT_COMPARISON_DELAY_BLOCKS,
            fee_per_write: DEFAULT_FEE_PER_WRITE,
            receipt_timeout_ms: DEFAULT_RECEIPT_TIMEOUT_MS,
        }
    }
}

impl LedgerConfig {
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }
}

fn default_destination() -> String {
    DEFAULT_DESTINATION.into()
}
fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}
fn default_block_time() -> u64 {
    DEFAULT_BLOCK_TIME_MS
}
fn default_comparison_delay() -> u64 {
    DEFAULT_COMPARISON_DELAY_BLOCKS
}
fn default_fee_per_write() -> u64 {
    DEFAULT_FEE_PER_WRITE
}
fn default_receipt_timeout() -> u64 {
    DEFAULT_RECEIPT_TIMEOUT_MS
}

/// Read-side polling cadence.
///
/// The own-handle poll historically ran ten times faster than the others.
/// Nothing depends on that, so every interval is independently tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_participants_interval")]
    pub participants_interval_ms: u64,
    #[serde(default = "default_winners_interval")]
    pub winners_interval_ms: u64,
    #[serde(default = "default_own_handle_interval")]
    pub own_handle_interval_ms: u64,
    /// Give up on the "calculating" state after this long (unbounded if unset)
    #[serde(default)]
    pub comparison_max_wait_ms: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            participants_interval_ms: DEFAULT_PARTICIPANTS_INTERVAL_MS,
            winners_interval_ms: DEFAULT_WINNERS_INTERVAL_MS,
            own_handle_interval_ms: DEFAULT_OWN_HANDLE_INTERVAL_MS,
            comparison_max_wait_ms: None,
        }
    }
}

impl PollingConfig {
    pub fn participants_interval(&self) -> Duration {
        Duration::from_millis(self.participants_interval_ms)
    }

    pub fn winners_interval(&self) -> Duration {
        Duration::from_millis(self.winners_interval_ms)
    }

    pub fn own_handle_interval(&self) -> Duration {
        Duration::from_millis(self.own_handle_interval_ms)
    }

    pub fn comparison_max_wait(&self) -> Option<Duration> {
        self.comparison_max_wait_ms.map(Duration::from_millis)
    }
}

fn default_participants_interval() -> u64 {
    DEFAULT_PARTICIPANTS_INTERVAL_MS
}
fn default_winners_interval() -> u64 {
    DEFAULT_WINNERS_INTERVAL_MS
}
fn default_own_handle_interval() -> u64 {
    DEFAULT_OWN_HANDLE_INTERVAL_MS
}

/// Feature flags
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Print full handles instead of previews
    #[serde(default)]
    pub dev_mode: bool,
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        if let Ok(parsed) = v.parse() {
            *field = parsed;
        }
    }
}

/// Set Option<T> from env var if present and parseable
fn env_parse_option<T: std::str::FromStr>(key: &str, field: &mut Option<T>) {
    if let Ok(v) = env::var(key) {
        if let Ok(parsed) = v.parse() {
            *field = Some(parsed);
        }
    }
}

/// Check if env var is set to a truthy value ("1" or "true")
fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Implementation
// ============================================================================

impl PrivWealthConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("PW_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("PW_CONFIG points at {} which does not exist", path.display());
        }

        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Ledger
        env_string("PW_DESTINATION", &mut self.ledger.destination);
        env_parse("PW_CHAIN_ID", &mut self.ledger.chain_id);
        env_parse("PW_BLOCK_TIME_MS", &mut self.ledger.block_time_ms);
        env_parse(
            "PW_COMPARISON_DELAY_BLOCKS",
            &mut self.ledger.comparison_delay_blocks,
        );
        env_parse("PW_FEE_PER_WRITE", &mut self.ledger.fee_per_write);
        env_parse("PW_RECEIPT_TIMEOUT_MS", &mut self.ledger.receipt_timeout_ms);

        // Polling
        env_parse(
            "PW_PARTICIPANTS_POLL_MS",
            &mut self.polling.participants_interval_ms,
        );
        env_parse("PW_WINNERS_POLL_MS", &mut self.polling.winners_interval_ms);
        env_parse(
            "PW_OWN_HANDLE_POLL_MS",
            &mut self.polling.own_handle_interval_ms,
        );
        env_parse_option(
            "PW_COMPARISON_MAX_WAIT_MS",
            &mut self.polling.comparison_max_wait_ms,
        );

        // Features
        if let Some(v) = env_bool("PW_DEV_MODE") {
            self.features.dev_mode = v;
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(HOME_CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.features.dev_mode = true;
        sample.polling.comparison_max_wait_ms = Some(60_000);
        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
