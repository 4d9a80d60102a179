//! Core cache traits and enums
//!
//! Defines the operation contract shared by the local, global and tiered
//! caches, the marker trait for cacheable values, and the change-listener
//! callback interface used for cross-node invalidation fan-out.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::types::CacheError;

/// Marker trait for values the cache can hold
///
/// Values cross the wire as bincode-encoded envelopes, so they must be
/// serde-compatible; `PartialEq` backs the conditional `replace` check.
pub trait CacheValue:
    Clone + PartialEq + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> CacheValue for T where
    T: Clone + PartialEq + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Which tier arrangement a cache instance represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    /// Per-process in-memory map only
    Local,
    /// Authoritative remote store only
    Global,
    /// Near-cache layered over the authoritative store
    Tiered,
}

/// Consistency model a cache instance provides to its callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyModel {
    /// Reads observe the latest committed write
    Strong,
    /// Reads may lag committed writes within bounded feed lag
    Eventual,
}

/// Uniform keyed-entry cache operations
///
/// `put` treats a `None` value as removal; `replace` performs the
/// authoritative store's conditional write and reports its outcome.
#[async_trait]
pub trait Cache<V: CacheValue>: Send + Sync {
    /// Tier arrangement of this instance
    fn cache_type(&self) -> CacheType;

    /// Consistency model of this instance
    fn consistency_model(&self) -> ConsistencyModel;

    /// Read the value mapped to `key`
    async fn get(&self, key: &str) -> Result<Option<V>, CacheError>;

    /// Re-fetch `key` from the source of truth, discarding any local copy
    async fn refresh(&self, key: &str) -> Result<Option<V>, CacheError>;

    /// Write `value` under `key`; `None` removes the entry
    async fn put(&self, key: &str, value: Option<V>) -> Result<(), CacheError>;

    /// Conditionally swap `old` for `new`; returns whether the swap took place
    async fn replace(&self, key: &str, old: Option<V>, new: Option<V>)
        -> Result<bool, CacheError>;

    /// Remove the entry mapped to `key`
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every entry
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Callback interface for observed authoritative-store changes
///
/// Fired by the change-feed consumer for every remote mutation that did not
/// originate from this node (delete events are fired unconditionally, since
/// a delete record carries no envelope to attribute).
pub trait CacheChangeListener<V>: Send + Sync {
    /// A key was inserted remotely
    fn on_insert(&self, key: &str, new_value: V);

    /// A key was overwritten remotely; the old image may be unavailable
    fn on_update(&self, key: &str, old_value: Option<V>, new_value: V);

    /// A key was deleted
    fn on_delete(&self, key: &str);
}
