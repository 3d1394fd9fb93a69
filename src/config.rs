//! Engine configuration.
//!
//! Loaded from an optional TOML file whose values override the built-in
//! defaults field by field, the way `witnet_config`'s `Config` does it: every
//! field has a `#[serde(default = "...")]` function so a partial or absent
//! file is always valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_block_confirmations")]
    pub block_confirmations: u32,

    #[serde(default = "Config::default_address_cache_limit")]
    pub block_sync_address_cache_limit: usize,

    #[serde(default)]
    pub verbose_cron: bool,

    #[serde(default)]
    pub verbose_cron_tx: bool,

    #[serde(default = "Config::default_unwind_batch_size")]
    pub unwind_batch_size: usize,

    #[serde(default = "Config::default_rpc")]
    pub rpc: RpcConfig,

    #[serde(default = "Config::default_store")]
    pub store: StoreConfig,

    #[serde(default = "Config::default_lock_path")]
    pub lock_path: std::path::PathBuf,

    /// Arms a debug-only fuzz self-test that randomly rolls the chain back
    /// a block after catching up, exercising unwind/re-sync. Only takes
    /// effect in a `cfg!(debug_assertions)` build; a release binary ignores
    /// this flag entirely regardless of its value.
    #[serde(default)]
    pub debug_random_rollback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "RpcConfig::default_url")]
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "RpcConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RpcConfig {
    fn default_url() -> String {
        "http://127.0.0.1:8332".to_string()
    }

    fn default_timeout_secs() -> u64 {
        8
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            user: None,
            password: None,
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "StoreConfig::default_connection_string")]
    pub connection_string: String,
    #[serde(default = "StoreConfig::default_database")]
    pub database: String,
}

impl StoreConfig {
    fn default_connection_string() -> String {
        "mongodb://127.0.0.1:27017".to_string()
    }

    fn default_database() -> String {
        "carver".to_string()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: Self::default_connection_string(),
            database: Self::default_database(),
        }
    }
}

impl Config {
    fn default_block_confirmations() -> u32 {
        21
    }

    fn default_address_cache_limit() -> usize {
        50_000
    }

    fn default_unwind_batch_size() -> usize {
        1000
    }

    fn default_rpc() -> RpcConfig {
        RpcConfig::default()
    }

    fn default_store() -> StoreConfig {
        StoreConfig::default()
    }

    fn default_lock_path() -> std::path::PathBuf {
        std::path::PathBuf::from(".carver/block.lock")
    }

    /// Load configuration from a TOML file, falling back to built-in
    /// defaults for any key the file does not set. Mirrors
    /// `witnet_config::loaders::toml::from_file`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(Error::from)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_confirmations: Self::default_block_confirmations(),
            block_sync_address_cache_limit: Self::default_address_cache_limit(),
            verbose_cron: false,
            verbose_cron_tx: false,
            unwind_batch_size: Self::default_unwind_batch_size(),
            rpc: Self::default_rpc(),
            store: Self::default_store(),
            lock_path: Self::default_lock_path(),
            debug_random_rollback: false,
        }
    }
}
