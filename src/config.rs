//! Allocator configuration
//!
//! Values come from defaults, an optional TOML file and `MEMPOOL__*`
//! environment variables, in that order of precedence (last wins):
//!
//! ```toml
//! [pool]
//! item_size = 16
//! items_per_block = 64
//!
//! [strings]
//! bytes_per_block = 1000
//!
//! [storage]
//! max_item_size = 64
//! items_per_block = 256
//! ```
//!
//! `MEMPOOL__STORAGE__MAX_ITEM_SIZE=128` overrides `storage.max_item_size`.

use crate::error::{Error, Result};
use crate::pool::{FixedSizePool, StringStack, TieredStorage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Settings for a single fixed-size pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub item_size: usize,
    pub items_per_block: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            item_size: 16,
            items_per_block: 64,
        }
    }
}

impl PoolConfig {
    pub fn build(&self) -> Result<FixedSizePool> {
        FixedSizePool::new(self.item_size, self.items_per_block)
    }
}

/// Settings for a string stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub bytes_per_block: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            bytes_per_block: crate::pool::strstack::DEFAULT_BLOCK_BYTES,
        }
    }
}

impl StackConfig {
    pub fn build(&self) -> Result<StringStack> {
        StringStack::new(self.bytes_per_block)
    }
}

/// Settings for tiered storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Largest size served by a pool
    pub max_item_size: usize,
    pub items_per_block: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_item_size: 64,
            items_per_block: 256,
        }
    }
}

impl StorageConfig {
    pub fn build(&self) -> Result<TieredStorage> {
        TieredStorage::new(self.max_item_size, self.items_per_block)
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemConfig {
    pub pool: PoolConfig,
    pub strings: StackConfig,
    pub storage: StorageConfig,
}

impl MemConfig {
    /// Load configuration from `path` (if given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = ?path, "Loading allocator configuration");
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("MEMPOOL")
                .separator("__")
                .try_parsing(true),
        );

        let config: MemConfig = builder
            .build()
            .and_then(|raw| raw.try_deserialize())
            .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject sizes the allocators cannot be built with
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("pool.item_size", self.pool.item_size),
            ("pool.items_per_block", self.pool.items_per_block),
            ("storage.items_per_block", self.storage.items_per_block),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{} must be greater than 0", name)));
        }
        if self.strings.bytes_per_block <= crate::pool::strstack::LEN_TAG {
            return Err(Error::Config(format!(
                "strings.bytes_per_block must be greater than {}",
                crate::pool::strstack::LEN_TAG
            )));
        }
        if self.storage.max_item_size > crate::pool::tiered::MAX_POOLED_SIZE {
            return Err(Error::Config(format!(
                "storage.max_item_size must be at most {}",
                crate::pool::tiered::MAX_POOLED_SIZE
            )));
        }
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))
    }
}
