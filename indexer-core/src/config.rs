//! Configuration for the indexer

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Statically known contracts
    pub sources: SourcesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/indexer"),
            service_name: "lending-indexer".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Level 0 file num compaction trigger
    pub level0_file_num_compaction_trigger: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            target_file_size_mb: 64,
            max_background_jobs: 2,
            level0_file_num_compaction_trigger: 4,
            enable_statistics: false,
        }
    }
}

/// Contracts whose events are indexed from the start
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Comptroller address
    pub comptroller: Option<Address>,

    /// Staking-rewards factory address
    pub staking_rewards_factory: Option<Address>,
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("INDEXER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(name) = std::env::var("INDEXER_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Ok(address) = std::env::var("INDEXER_COMPTROLLER") {
            config.sources.comptroller = Some(parse_address("INDEXER_COMPTROLLER", &address)?);
        }

        if let Ok(address) = std::env::var("INDEXER_STAKING_REWARDS_FACTORY") {
            config.sources.staking_rewards_factory =
                Some(parse_address("INDEXER_STAKING_REWARDS_FACTORY", &address)?);
        }

        Ok(config)
    }

    /// Comptroller address, required to index anything
    pub fn comptroller(&self) -> crate::Result<Address> {
        self.sources
            .comptroller
            .ok_or_else(|| crate::Error::Config("comptroller address not configured".to_string()))
    }
}

fn parse_address(var: &str, raw: &str) -> crate::Result<Address> {
    raw.parse()
        .map_err(|e| crate::Error::Config(format!("{}: {}", var, e)))
}
