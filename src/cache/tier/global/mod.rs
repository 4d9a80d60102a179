//! Global cache tier: the authoritative store client
//!
//! Layers envelope encoding, node-identity stamping, the change-listener
//! registry and conditional-replace semantics over a `GlobalBackend`.
//! Reads are strongly consistent; on its own this tier is a complete
//! strongly-consistent cache, and inside the tiered arrangement it is the
//! linearization point every near-cache lags behind.

pub mod backend;
pub mod codec;
pub mod listeners;
pub mod memory;

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cache::config::{ChangeFeedConfig, GlobalStoreConfig};
use crate::cache::feed::{ChangeFeedConsumer, ChangeFeedHandle};
use crate::cache::traits::{Cache, CacheChangeListener, CacheType, CacheValue, ConsistencyModel};
use crate::cache::types::{CacheError, NodeId};

use self::backend::GlobalBackend;
use self::codec::{decode_envelope, encode_envelope, ValueEnvelope};
use self::listeners::ListenerRegistry;

/// Client for the shared authoritative store
pub struct GlobalCache<V: CacheValue, B: GlobalBackend> {
    backend: Arc<B>,
    node_id: NodeId,
    config: GlobalStoreConfig,
    listeners: Arc<ListenerRegistry<V>>,
    feed: Mutex<Option<ChangeFeedHandle>>,
}

impl<V: CacheValue, B: GlobalBackend> GlobalCache<V, B> {
    /// Create a client over `backend`
    pub fn new(backend: Arc<B>, config: GlobalStoreConfig) -> Self {
        let node_id = NodeId::generate();
        log::info!(
            "global cache ready (table {}, node {})",
            config.table_name,
            node_id
        );
        Self {
            backend,
            node_id,
            config,
            listeners: Arc::new(ListenerRegistry::new()),
            feed: Mutex::new(None),
        }
    }

    /// This process's write-origin identity
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Authoritative-store settings this client was built with
    pub fn config(&self) -> &GlobalStoreConfig {
        &self.config
    }

    /// Register a change listener for remote mutations
    pub fn register_change_listener(&self, listener: Arc<dyn CacheChangeListener<V>>) {
        self.listeners.register(listener);
    }

    /// Remove a previously registered change listener
    pub fn deregister_change_listener(&self, listener: &Arc<dyn CacheChangeListener<V>>) {
        self.listeners.deregister(listener);
    }

    /// Start the background change-feed consumer
    ///
    /// Must be called from within a tokio runtime. Subsequent calls are
    /// no-ops while a consumer is running.
    pub fn start_change_feed(&self, config: &ChangeFeedConfig) {
        let mut feed = self.feed.lock().expect("change-feed handle lock poisoned");
        if feed.is_some() {
            log::warn!("change-feed consumer already running");
            return;
        }
        let consumer = ChangeFeedConsumer::new(
            Arc::clone(&self.backend),
            self.node_id.clone(),
            Arc::clone(&self.listeners),
            config.poll_interval(),
        );
        *feed = Some(consumer.spawn());
    }

    /// Stop the background change-feed consumer
    ///
    /// Idempotent; safe to call without a running consumer.
    pub fn shutdown(&self) {
        let handle = self.feed.lock().expect("change-feed handle lock poisoned").take();
        if let Some(handle) = handle {
            handle.stop();
            log::info!("global cache shut down (node {})", self.node_id);
        }
    }

    fn encode(&self, value: V) -> Result<Vec<u8>, CacheError> {
        encode_envelope(&ValueEnvelope::new(&self.node_id, value))
    }

    fn decode(raw: &[u8]) -> Result<V, CacheError> {
        decode_envelope::<V>(raw).map(|envelope| envelope.value)
    }
}

#[async_trait]
impl<V: CacheValue, B: GlobalBackend> Cache<V> for GlobalCache<V, B> {
    fn cache_type(&self) -> CacheType {
        CacheType::Global
    }

    fn consistency_model(&self) -> ConsistencyModel {
        ConsistencyModel::Strong
    }

    async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let raw = self.backend.read(key).await?;
        let value = raw.as_deref().map(Self::decode).transpose()?;
        log::debug!("global get {} -> {}", key, value.is_some());
        Ok(value)
    }

    async fn refresh(&self, key: &str) -> Result<Option<V>, CacheError> {
        // The store itself is authoritative; refresh degenerates to get.
        self.get(key).await
    }

    async fn put(&self, key: &str, value: Option<V>) -> Result<(), CacheError> {
        match value {
            Some(value) => {
                let raw = self.encode(value)?;
                self.backend.write(key, raw).await?;
                log::debug!("global put {}", key);
            }
            None => {
                self.backend.delete(key).await?;
                log::debug!("global remove {} (nil put)", key);
            }
        }
        Ok(())
    }

    async fn replace(
        &self,
        key: &str,
        old: Option<V>,
        new: Option<V>,
    ) -> Result<bool, CacheError> {
        // The stored envelope carries the writer's node id, so the
        // old-value check compares decoded payloads and the swap is
        // conditioned on the exact raw bytes read; the store still
        // arbitrates races against concurrent writers.
        let replaced = match (old, new) {
            (None, Some(new)) => {
                if self.backend.read(key).await?.is_some() {
                    false
                } else {
                    let raw = self.encode(new)?;
                    self.backend.compare_and_swap(key, None, Some(raw)).await?
                }
            }
            (Some(old), new) => {
                let Some(current_raw) = self.backend.read(key).await? else {
                    return Ok(false);
                };
                if Self::decode(&current_raw)? != old {
                    false
                } else {
                    let next = new.map(|value| self.encode(value)).transpose()?;
                    self.backend
                        .compare_and_swap(key, Some(&current_raw), next)
                        .await?
                }
            }
            (None, None) => false,
        };
        if replaced {
            log::debug!("global replace {} applied", key);
        }
        Ok(replaced)
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.backend.delete(key).await?;
        log::debug!("global remove {}", key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.backend.clear().await?;
        log::debug!("global cleared");
        Ok(())
    }
}

impl<V: CacheValue, B: GlobalBackend> Drop for GlobalCache<V, B> {
    fn drop(&mut self) {
        if let Ok(mut feed) = self.feed.lock() {
            if let Some(handle) = feed.take() {
                handle.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryBackend;
    use super::*;

    fn cache() -> GlobalCache<String, MemoryBackend> {
        GlobalCache::new(Arc::new(MemoryBackend::new()), GlobalStoreConfig::default())
    }

    #[tokio::test]
    async fn put_get_remove_round_trip() {
        let cache = cache();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.put("k", Some("v".to_string())).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        cache.remove("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn nil_put_removes() {
        let cache = cache();
        cache.put("k", Some("v".to_string())).await.unwrap();
        cache.put("k", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn replace_compares_payload_not_envelope() {
        let backend = Arc::new(MemoryBackend::new());
        let writer: GlobalCache<String, MemoryBackend> =
            GlobalCache::new(Arc::clone(&backend), GlobalStoreConfig::default());
        let other: GlobalCache<String, MemoryBackend> =
            GlobalCache::new(backend, GlobalStoreConfig::default());

        writer.put("k", Some("x".to_string())).await.unwrap();
        // A different node replaces based on the payload it can observe,
        // even though the stored envelope carries the writer's identity.
        assert!(other
            .replace("k", Some("x".to_string()), Some("z".to_string()))
            .await
            .unwrap());
        assert_eq!(writer.get("k").await.unwrap(), Some("z".to_string()));

        assert!(!other
            .replace("k", Some("nope".to_string()), Some("w".to_string()))
            .await
            .unwrap());
        assert_eq!(writer.get("k").await.unwrap(), Some("z".to_string()));
    }

    #[tokio::test]
    async fn replace_insert_and_delete_arms() {
        let cache = cache();
        assert!(cache
            .replace("k", None, Some("a".to_string()))
            .await
            .unwrap());
        assert!(!cache
            .replace("k", None, Some("b".to_string()))
            .await
            .unwrap());
        assert!(cache.replace("k", Some("a".to_string()), None).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.replace("k", None, None).await.unwrap());
        assert!(!cache.replace("k", Some("a".to_string()), None).await.unwrap());
    }

    #[tokio::test]
    async fn cache_type_and_consistency() {
        let cache = cache();
        assert_eq!(cache.cache_type(), CacheType::Global);
        assert_eq!(cache.consistency_model(), ConsistencyModel::Strong);
    }
}
