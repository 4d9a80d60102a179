//! Tiered cache façade
//!
//! Orchestrates read-through and write-through across the near cache and
//! the global store. Every caller-facing mutation and every miss-path
//! population runs inside its key's slot window, so racing invalidations
//! from the change feed (or from other local callers) defeat stale
//! admissions instead of corrupting the near tier.
//!
//! The global store is the linearization point for each key; the near tier
//! lags it by at most the change-feed poll interval and is never ahead of
//! a committed value the caller has been told about.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::config::CacheConfig;
use crate::cache::tier::global::backend::GlobalBackend;
use crate::cache::tier::global::GlobalCache;
use crate::cache::tier::near::{NearCache, NearCacheStatisticsSnapshot};
use crate::cache::traits::{Cache, CacheChangeListener, CacheType, CacheValue, ConsistencyModel};
use crate::cache::types::CacheError;

/// Change-feed listener that evicts near-cache entries
///
/// Dispatch is uniform across event kinds: enter the key's slot window,
/// evict, retire. Retiring bumps the slot generation, which aborts any
/// admission racing with this invalidation.
struct NearCacheInvalidator<V> {
    near: Arc<NearCache<V>>,
}

impl<V: CacheValue> NearCacheInvalidator<V> {
    fn invalidate(&self, key: &str) {
        self.near.invalidate(key);
        log::debug!("near-cache entry invalidated (key {})", key);
    }
}

impl<V: CacheValue> CacheChangeListener<V> for NearCacheInvalidator<V> {
    fn on_insert(&self, key: &str, _new_value: V) {
        self.invalidate(key);
    }

    fn on_update(&self, key: &str, _old_value: Option<V>, _new_value: V) {
        self.invalidate(key);
    }

    fn on_delete(&self, key: &str) {
        self.invalidate(key);
    }
}

/// Near-cache over authoritative store, coherent within feed lag
pub struct TieredCache<V: CacheValue, B: GlobalBackend> {
    near: Arc<NearCache<V>>,
    global: Arc<GlobalCache<V, B>>,
}

impl<V: CacheValue, B: GlobalBackend> Clone for TieredCache<V, B> {
    fn clone(&self) -> Self {
        Self {
            near: Arc::clone(&self.near),
            global: Arc::clone(&self.global),
        }
    }
}

impl<V: CacheValue, B: GlobalBackend> TieredCache<V, B> {
    /// Start configuring a tiered cache
    pub fn builder() -> TieredCacheBuilder<V, B> {
        TieredCacheBuilder::new()
    }

    /// The global-store client underneath this cache
    pub fn global(&self) -> &GlobalCache<V, B> {
        &self.global
    }

    /// Near-cache behavior counters
    pub fn near_statistics(&self) -> NearCacheStatisticsSnapshot {
        self.near.statistics().snapshot()
    }

    /// Number of entries resident in the near tier
    pub fn near_entry_count(&self) -> usize {
        self.near.entry_count()
    }

    /// Stop the background change-feed consumer
    pub fn shutdown(&self) {
        self.global.shutdown();
    }
}

#[async_trait]
impl<V: CacheValue, B: GlobalBackend> Cache<V> for TieredCache<V, B> {
    fn cache_type(&self) -> CacheType {
        CacheType::Tiered
    }

    fn consistency_model(&self) -> ConsistencyModel {
        ConsistencyModel::Eventual
    }

    async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        if let Some(value) = self.near.get(key) {
            return Ok(Some(value));
        }
        let guard = self.near.try_own(key);
        let value = self.global.get(key).await?;
        if let Some(value) = &value {
            self.near.put_if_available(&guard, key, value.clone());
        }
        drop(guard);
        log::debug!("tiered get {} -> {}", key, value.is_some());
        Ok(value)
    }

    async fn refresh(&self, key: &str) -> Result<Option<V>, CacheError> {
        let guard = self.near.try_own(key);
        self.near.remove(key);
        let value = self.global.get(key).await?;
        if let Some(value) = &value {
            self.near.put_if_available(&guard, key, value.clone());
        }
        drop(guard);
        log::debug!("tiered refresh {} -> {}", key, value.is_some());
        Ok(value)
    }

    async fn put(&self, key: &str, value: Option<V>) -> Result<(), CacheError> {
        let Some(value) = value else {
            return self.remove(key).await;
        };
        let guard = self.near.try_own(key);
        self.global.put(key, Some(value.clone())).await?;
        // Conditional even after a successful global write: an
        // invalidation observed between the two steps wins, and we simply
        // drop the local copy.
        self.near.put_if_available(&guard, key, value);
        drop(guard);
        log::debug!("tiered put {}", key);
        Ok(())
    }

    async fn replace(
        &self,
        key: &str,
        old: Option<V>,
        new: Option<V>,
    ) -> Result<bool, CacheError> {
        if old.is_none() && new.is_none() {
            return Ok(false);
        }
        let guard = self.near.try_own(key);
        let replaced = self.global.replace(key, old, new.clone()).await?;
        if replaced {
            match new {
                Some(new) => {
                    self.near.put_if_available(&guard, key, new);
                }
                None => self.near.remove(key),
            }
            log::debug!("tiered replace {} applied", key);
        }
        drop(guard);
        Ok(replaced)
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let guard = self.near.try_own(key);
        self.global.remove(key).await?;
        self.near.remove(key);
        drop(guard);
        log::debug!("tiered remove {}", key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let guard = self.near.own_all();
        self.global.clear().await?;
        self.near.clear();
        drop(guard);
        log::debug!("tiered cache cleared");
        Ok(())
    }
}

/// Fluent construction for [`TieredCache`]
pub struct TieredCacheBuilder<V, B> {
    backend: Option<Arc<B>>,
    config: CacheConfig,
    _value: PhantomData<V>,
}

impl<V: CacheValue, B: GlobalBackend> Default for TieredCacheBuilder<V, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: CacheValue, B: GlobalBackend> TieredCacheBuilder<V, B> {
    /// Start with default configuration and no backend
    pub fn new() -> Self {
        Self {
            backend: None,
            config: CacheConfig::default(),
            _value: PhantomData,
        }
    }

    /// Authoritative-store backend (required)
    pub fn backend(mut self, backend: Arc<B>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Full cache configuration
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate, wire the invalidation listener, start the change feed
    ///
    /// Must run inside a tokio runtime; configuration problems are fatal
    /// here, before any background work starts.
    pub async fn build(self) -> Result<TieredCache<V, B>, CacheError> {
        self.config.validate()?;
        let backend = self
            .backend
            .ok_or_else(|| CacheError::configuration("a global backend is required"))?;

        let near = Arc::new(NearCache::new(self.config.near_cache.slot_count));
        let global = Arc::new(GlobalCache::new(backend, self.config.global_store.clone()));
        global.register_change_listener(Arc::new(NearCacheInvalidator {
            near: Arc::clone(&near),
        }));
        global.start_change_feed(&self.config.change_feed);

        Ok(TieredCache { near, global })
    }
}
