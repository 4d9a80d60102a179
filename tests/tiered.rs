//! End-to-end scenarios for the tiered cache
//!
//! Two cache instances sharing one in-process backend behave like two
//! nodes sharing one remote table; the change feed carries invalidations
//! between them. Poll intervals are shortened so cross-node visibility
//! settles within a few tens of milliseconds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use strato::prelude::*;

const POLL_MILLIS: u64 = 25;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config() -> CacheConfig {
    let mut config = CacheConfig::default();
    config.change_feed.poll_interval_millis = POLL_MILLIS;
    config.near_cache.slot_count = 64;
    config
}

async fn node(backend: &Arc<MemoryBackend>) -> TieredCache<String, MemoryBackend> {
    TieredCache::builder()
        .backend(Arc::clone(backend))
        .config(test_config())
        .build()
        .await
        .expect("cache construction")
}

async fn settle() {
    // Comfortably beyond the 2x-poll-interval visibility bound.
    tokio::time::sleep(Duration::from_millis(POLL_MILLIS * 4)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn miss_then_hit_serves_from_near_cache() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let cache = node(&backend).await;

    assert_eq!(cache.get("a").await.unwrap(), None);
    cache.put("a", Some("1".to_string())).await.unwrap();

    let before = cache.near_statistics();
    assert_eq!(cache.get("a").await.unwrap(), Some("1".to_string()));
    let after_first = cache.near_statistics();
    assert_eq!(cache.get("a").await.unwrap(), Some("1".to_string()));
    let after_second = cache.near_statistics();

    // Both reads after the put are near-tier hits; no further misses.
    assert_eq!(after_first.hits, before.hits + 1);
    assert_eq!(after_second.hits, before.hits + 2);
    assert_eq!(after_second.misses, before.misses);

    cache.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cross_node_invalidation_within_poll_bound() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let node_a = node(&backend).await;
    let node_b = node(&backend).await;

    node_a.put("k", Some("1".to_string())).await.unwrap();
    // Let B's consumer retire the insert record before populating, so the
    // near-tier entry below cannot be evicted by a straggling event.
    settle().await;
    assert_eq!(node_b.get("k").await.unwrap(), Some("1".to_string()));
    assert_eq!(node_b.near_entry_count(), 1);

    node_a.put("k", Some("2".to_string())).await.unwrap();
    settle().await;

    assert_eq!(node_b.get("k").await.unwrap(), Some("2".to_string()));

    node_a.shutdown();
    node_b.shutdown();
}

/// Backend wrapper that parks reads of one key until released, modelling a
/// thread suspended between global fetch and near-cache admit.
struct ParkedReadBackend {
    inner: Arc<MemoryBackend>,
    parked_key: String,
    armed: AtomicBool,
    gate: tokio::sync::Notify,
}

impl ParkedReadBackend {
    fn new(inner: Arc<MemoryBackend>, parked_key: &str) -> Self {
        Self {
            inner,
            parked_key: parked_key.to_string(),
            armed: AtomicBool::new(false),
            gate: tokio::sync::Notify::new(),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.armed.store(false, Ordering::SeqCst);
        // notify_one stores a permit, so release cannot be lost even if
        // the reader has not reached its await yet.
        self.gate.notify_one();
    }
}

#[async_trait]
impl GlobalBackend for ParkedReadBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let value = self.inner.read(key).await?;
        if key == self.parked_key && self.armed.load(Ordering::SeqCst) {
            // Fetch already happened; park before the caller can admit.
            self.gate.notified().await;
        }
        Ok(value)
    }

    async fn write(&self, key: &str, raw: Vec<u8>) -> Result<(), CacheError> {
        self.inner.write(key, raw).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        next: Option<Vec<u8>>,
    ) -> Result<bool, CacheError> {
        self.inner.compare_and_swap(key, expected, next).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.inner.clear().await
    }

    async fn shards(&self) -> Result<Vec<ShardId>, CacheError> {
        self.inner.shards().await
    }

    async fn shard_iterator(
        &self,
        shard: &ShardId,
        policy: ShardIteratorPolicy,
    ) -> Result<StreamCursor, CacheError> {
        self.inner.shard_iterator(shard, policy).await
    }

    async fn read_records(&self, cursor: &StreamCursor) -> Result<RecordBatch, CacheError> {
        self.inner.read_records(cursor).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalidation_racing_fetch_aborts_admission() {
    init_logging();
    let shared = Arc::new(MemoryBackend::new());
    let parked = Arc::new(ParkedReadBackend::new(Arc::clone(&shared), "k"));

    let node_a = node(&shared).await;
    let node_b: TieredCache<String, ParkedReadBackend> = TieredCache::builder()
        .backend(Arc::clone(&parked))
        .config(test_config())
        .build()
        .await
        .unwrap();

    node_a.put("k", Some("1".to_string())).await.unwrap();
    settle().await;

    // B's miss path fetches "1" and parks before admitting.
    parked.arm();
    let reader = {
        let node_b = node_b.clone();
        tokio::spawn(async move { node_b.get("k").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // While B is parked, the entry changes remotely and the change feed
    // invalidates B's near cache.
    node_a.put("k", Some("2".to_string())).await.unwrap();
    settle().await;

    parked.release();
    let fetched = reader.await.unwrap().unwrap();
    // The parked reader saw the value that was authoritative at its fetch.
    assert_eq!(fetched, Some("1".to_string()));
    // But the stale value was not admitted into the near tier.
    assert_eq!(node_b.near_entry_count(), 0);
    assert!(node_b.near_statistics().rejected_admissions >= 1);
    // The next read goes back to the source of truth.
    assert_eq!(node_b.get("k").await.unwrap(), Some("2".to_string()));

    node_a.shutdown();
    node_b.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replace_checks_old_value_against_store() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let cache = node(&backend).await;

    cache.put("k", Some("x".to_string())).await.unwrap();
    assert!(!cache
        .replace("k", Some("y".to_string()), Some("z".to_string()))
        .await
        .unwrap());
    assert_eq!(cache.get("k").await.unwrap(), Some("x".to_string()));

    assert!(cache
        .replace("k", Some("x".to_string()), Some("z".to_string()))
        .await
        .unwrap());
    assert_eq!(cache.get("k").await.unwrap(), Some("z".to_string()));

    // Conditional delete arm.
    assert!(cache.replace("k", Some("z".to_string()), None).await.unwrap());
    assert_eq!(cache.get("k").await.unwrap(), None);

    // Insert-if-absent arm.
    assert!(cache
        .replace("k", None, Some("w".to_string()))
        .await
        .unwrap());
    assert!(!cache
        .replace("k", None, Some("v".to_string()))
        .await
        .unwrap());
    assert!(!cache.replace("k", None, None).await.unwrap());

    cache.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clear_under_load_then_post_clear_put_visible() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let cache = node(&backend).await;

    // Writers hammering disjoint keys while clears run concurrently.
    let stop = Arc::new(AtomicBool::new(false));
    let writers: Vec<_> = (0..3)
        .map(|w| {
            let cache = cache.clone();
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                let mut i = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    let key = format!("w{}-{}", w, i % 8);
                    cache.put(&key, Some(i.to_string())).await.unwrap();
                    i += 1;
                }
            })
        })
        .collect();

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.clear().await.unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for writer in writers {
        writer.await.unwrap();
    }

    // Quiesced final clear: both tiers end empty.
    cache.clear().await.unwrap();
    assert_eq!(cache.near_entry_count(), 0);
    assert_eq!(backend.entry_count(), 0);
    assert_eq!(cache.get("w0-0").await.unwrap(), None);

    // A put issued strictly after clear returned is visible.
    cache.put("fresh", Some("v".to_string())).await.unwrap();
    assert_eq!(cache.get("fresh").await.unwrap(), Some("v".to_string()));

    cache.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nil_put_equals_remove() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let cache = node(&backend).await;

    cache.put("k", Some("1".to_string())).await.unwrap();
    cache.put("k", None).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), None);
    assert_eq!(backend.entry_count(), 0);

    cache.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remove_is_idempotent() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let cache = node(&backend).await;

    cache.put("k", Some("1".to_string())).await.unwrap();
    cache.remove("k").await.unwrap();
    cache.remove("k").await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), None);
    settle().await;
    assert_eq!(cache.get("k").await.unwrap(), None);

    cache.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn own_writes_are_not_self_invalidated() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let cache = node(&backend).await;

    cache.put("k", Some("1".to_string())).await.unwrap();
    assert_eq!(cache.near_entry_count(), 1);
    settle().await;

    // The echoed insert was suppressed: the near entry survived and the
    // read below is a near-tier hit.
    assert_eq!(cache.near_statistics().invalidations, 0);
    let before = cache.near_statistics();
    assert_eq!(cache.get("k").await.unwrap(), Some("1".to_string()));
    assert_eq!(cache.near_statistics().hits, before.hits + 1);

    cache.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_returns_current_authoritative_value() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let node_a = node(&backend).await;
    let node_b = node(&backend).await;

    node_a.put("k", Some("1".to_string())).await.unwrap();
    assert_eq!(node_b.get("k").await.unwrap(), Some("1".to_string()));

    // B's near tier still holds "1", but refresh re-fetches.
    node_a.put("k", Some("2".to_string())).await.unwrap();
    assert_eq!(node_b.refresh("k").await.unwrap(), Some("2".to_string()));
    assert_eq!(node_b.get("k").await.unwrap(), Some("2".to_string()));

    node_a.shutdown();
    node_b.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_stops_invalidation_feed() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let node_a = node(&backend).await;
    let node_b = node(&backend).await;

    node_a.put("k", Some("1".to_string())).await.unwrap();
    // Let B's consumer retire A's insert record before populating B's
    // near tier, so no straggling invalidation races the assertion below.
    settle().await;
    assert_eq!(node_b.get("k").await.unwrap(), Some("1".to_string()));

    node_b.shutdown();
    node_a.put("k", Some("2".to_string())).await.unwrap();
    settle().await;

    // With its consumer stopped, B keeps serving the near-tier copy.
    assert_eq!(node_b.get("k").await.unwrap(), Some("1".to_string()));

    node_a.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tiered_cache_identity() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let cache = node(&backend).await;

    assert_eq!(cache.cache_type(), CacheType::Tiered);
    assert_eq!(cache.consistency_model(), ConsistencyModel::Eventual);

    cache.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_backend_is_a_configuration_error() {
    init_logging();
    let result = TieredCache::<String, MemoryBackend>::builder()
        .config(test_config())
        .build()
        .await;
    assert!(matches!(result, Err(CacheError::Configuration(_))));
}
