//! Change-feed consumer
//!
//! A background task that polls the authoritative store's change stream
//! and fans observed mutations out to the registered listeners. Inserts
//! and modifies originating from this node are suppressed by comparing the
//! new image's source stamp; deletes carry no envelope and are always
//! dispatched (a node evicting a key it already removed is harmless).
//!
//! The loop is best-effort: poll errors are logged and retried on the next
//! tick, undecodable records are skipped individually, and the
//! single-flight flag keeps ticks from overlapping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::tier::global::backend::{
    ChangeEventKind, ChangeRecord, GlobalBackend, ShardId, ShardIteratorPolicy, StreamCursor,
};
use crate::cache::tier::global::codec::decode_envelope;
use crate::cache::tier::global::listeners::ListenerRegistry;
use crate::cache::traits::CacheValue;
use crate::cache::types::{CacheError, NodeId};

/// Handle to a running consumer task
#[derive(Debug)]
pub struct ChangeFeedHandle {
    shutdown: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ChangeFeedHandle {
    /// Stop the consumer; idempotent
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Background poller of the authoritative store's change stream
pub struct ChangeFeedConsumer<V: CacheValue, B: GlobalBackend> {
    backend: Arc<B>,
    node_id: NodeId,
    listeners: Arc<ListenerRegistry<V>>,
    cursors: DashMap<ShardId, StreamCursor>,
    in_flight: AtomicBool,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl<V: CacheValue, B: GlobalBackend> ChangeFeedConsumer<V, B> {
    /// Create a consumer; nothing runs until [`spawn`](Self::spawn)
    pub fn new(
        backend: Arc<B>,
        node_id: NodeId,
        listeners: Arc<ListenerRegistry<V>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            node_id,
            listeners,
            cursors: DashMap::new(),
            in_flight: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            poll_interval,
        }
    }

    /// Launch the polling task on the current tokio runtime
    pub fn spawn(self) -> ChangeFeedHandle {
        let shutdown = Arc::clone(&self.shutdown);
        let task = tokio::spawn(self.run());
        ChangeFeedHandle { shutdown, task }
    }

    async fn run(self) {
        let mut ticks = tokio::time::interval(self.poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut initial = true;
        loop {
            ticks.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.tick(initial).await;
            initial = false;
        }
        log::debug!("change-feed consumer stopped (node {})", self.node_id);
    }

    /// One poll pass; skipped entirely if a previous pass is still running
    async fn tick(&self, initial: bool) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("change-feed tick still in flight, skipping");
            return;
        }
        if let Err(err) = self.drain(initial).await {
            log::error!("change-feed poll failed: {}", err);
        }
        self.in_flight.store(false, Ordering::SeqCst);
    }

    async fn drain(&self, initial: bool) -> Result<(), CacheError> {
        let shards = self.backend.shards().await?;
        for shard in shards {
            let mut cursor = match self.cursors.get(&shard).map(|entry| entry.value().clone()) {
                Some(cursor) => cursor,
                None => {
                    // First sight of this shard: skip history only on the
                    // first-ever tick, otherwise start from the earliest
                    // retained change.
                    let policy = if initial {
                        ShardIteratorPolicy::Latest
                    } else {
                        ShardIteratorPolicy::TrimHorizon
                    };
                    let fresh = self.backend.shard_iterator(&shard, policy).await?;
                    self.cursors
                        .entry(shard.clone())
                        .or_insert(fresh)
                        .value()
                        .clone()
                }
            };
            loop {
                let batch = self.backend.read_records(&cursor).await?;
                for record in &batch.records {
                    if let Err(err) = self.dispatch(record) {
                        log::warn!(
                            "skipping undecodable change record for key {}: {}",
                            record.key,
                            err
                        );
                    }
                }
                let drained = batch.records.is_empty();
                let closed = match batch.next {
                    Some(next) => {
                        cursor = next;
                        false
                    }
                    None => true,
                };
                self.cursors.insert(shard.clone(), cursor.clone());
                if drained || closed {
                    break;
                }
            }
        }
        Ok(())
    }

    fn dispatch(&self, record: &ChangeRecord) -> Result<(), CacheError> {
        match record.kind {
            ChangeEventKind::Insert => {
                let Some(raw) = record.new_image.as_deref() else {
                    return Ok(());
                };
                let envelope = decode_envelope::<V>(raw)?;
                if !envelope.originated_from(&self.node_id) {
                    for listener in self.listeners.snapshot().iter() {
                        listener.on_insert(&record.key, envelope.value.clone());
                    }
                }
            }
            ChangeEventKind::Modify => {
                let Some(new_raw) = record.new_image.as_deref() else {
                    return Ok(());
                };
                let new_envelope = decode_envelope::<V>(new_raw)?;
                if !new_envelope.originated_from(&self.node_id) {
                    let old_value = record
                        .old_image
                        .as_deref()
                        .and_then(|raw| decode_envelope::<V>(raw).ok())
                        .map(|envelope| envelope.value);
                    for listener in self.listeners.snapshot().iter() {
                        listener.on_update(
                            &record.key,
                            old_value.clone(),
                            new_envelope.value.clone(),
                        );
                    }
                }
            }
            ChangeEventKind::Remove => {
                // No envelope to attribute; self-echo here only re-evicts
                // an already absent key.
                for listener in self.listeners.snapshot().iter() {
                    listener.on_delete(&record.key);
                }
            }
        }
        Ok(())
    }
}
