//! Cache configuration
//!
//! Section structs with serde defaults; `CacheConfig::validate` runs once
//! at construction and rejects unusable settings before any background
//! task is spawned.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::types::CacheError;

/// Authoritative-store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStoreConfig {
    /// Backing table (or namespace) name
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Provisioned read throughput hint for backends that need one
    #[serde(default = "default_read_capacity")]
    pub read_capacity_per_second: u32,
    /// Provisioned write throughput hint for backends that need one
    #[serde(default = "default_write_capacity")]
    pub write_capacity_per_second: u32,
}

/// Change-feed consumer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeFeedConfig {
    /// Delay between stream polls in milliseconds
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,
}

/// Near-cache coherence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearCacheConfig {
    /// Number of coherence slots; must be a non-zero power of two
    ///
    /// Distinct keys may share a slot; collisions cause spurious admission
    /// denials, never stale admits.
    #[serde(default = "default_slot_count")]
    pub slot_count: usize,
}

/// Top-level cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub global_store: GlobalStoreConfig,
    #[serde(default)]
    pub change_feed: ChangeFeedConfig,
    #[serde(default)]
    pub near_cache: NearCacheConfig,
}

fn default_table_name() -> String {
    "strato-entries".to_string()
}
fn default_read_capacity() -> u32 {
    1000
}
fn default_write_capacity() -> u32 {
    100
}
fn default_poll_interval_millis() -> u64 {
    1000
}
fn default_slot_count() -> usize {
    1024
}

impl Default for GlobalStoreConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            read_capacity_per_second: default_read_capacity(),
            write_capacity_per_second: default_write_capacity(),
        }
    }
}

impl Default for ChangeFeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_millis: default_poll_interval_millis(),
        }
    }
}

impl Default for NearCacheConfig {
    fn default() -> Self {
        Self {
            slot_count: default_slot_count(),
        }
    }
}

impl ChangeFeedConfig {
    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }
}

impl CacheConfig {
    /// Validate settings; any failure here is fatal at construction
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.global_store.table_name.is_empty() {
            return Err(CacheError::configuration("table_name must not be empty"));
        }
        if self.change_feed.poll_interval_millis == 0 {
            return Err(CacheError::configuration(
                "poll_interval_millis must be greater than zero",
            ));
        }
        let slots = self.near_cache.slot_count;
        if slots == 0 || !slots.is_power_of_two() {
            return Err(CacheError::configuration(format!(
                "slot_count must be a non-zero power of two, got {}",
                slots
            )));
        }
        Ok(())
    }
}
