//! Process-local cache tier
//!
//! A thin concurrent map. On its own it is a complete strongly-consistent
//! in-process cache; inside the tiered arrangement it is the backing store
//! the near-cache admits entries into.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache::traits::{Cache, CacheType, CacheValue, ConsistencyModel};
use crate::cache::types::CacheError;

/// Thread-safe key→value map holding near-cache entries
#[derive(Debug, Default)]
pub struct LocalCache<V> {
    entries: DashMap<String, V>,
}

impl<V: CacheValue> LocalCache<V> {
    /// Create an empty local cache
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Read the value mapped to `key`
    pub fn get_sync(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Write `value` under `key`
    pub fn put_sync(&self, key: &str, value: V) {
        self.entries.insert(key.to_string(), value);
    }

    /// Remove the entry mapped to `key`
    pub fn remove_sync(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Remove every entry
    pub fn clear_sync(&self) {
        self.entries.clear();
    }

    /// Number of resident entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl<V: CacheValue> Cache<V> for LocalCache<V> {
    fn cache_type(&self) -> CacheType {
        CacheType::Local
    }

    fn consistency_model(&self) -> ConsistencyModel {
        ConsistencyModel::Strong
    }

    async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        Ok(self.get_sync(key))
    }

    async fn refresh(&self, key: &str) -> Result<Option<V>, CacheError> {
        // The map itself is the source of truth; refresh degenerates to get.
        Ok(self.get_sync(key))
    }

    async fn put(&self, key: &str, value: Option<V>) -> Result<(), CacheError> {
        match value {
            Some(value) => self.put_sync(key, value),
            None => self.remove_sync(key),
        }
        Ok(())
    }

    async fn replace(
        &self,
        key: &str,
        old: Option<V>,
        new: Option<V>,
    ) -> Result<bool, CacheError> {
        match (old, new) {
            (None, Some(new)) => match self.entries.entry(key.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(new);
                    Ok(true)
                }
                Entry::Occupied(_) => Ok(false),
            },
            (Some(old), new) => match self.entries.entry(key.to_string()) {
                Entry::Occupied(mut slot) if *slot.get() == old => {
                    match new {
                        Some(new) => {
                            slot.insert(new);
                        }
                        None => {
                            slot.remove();
                        }
                    }
                    Ok(true)
                }
                _ => Ok(false),
            },
            (None, None) => Ok(false),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.remove_sync(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.clear_sync();
        Ok(())
    }
}
