//! In-process authoritative store
//!
//! A complete `GlobalBackend` backed by a concurrent map and a
//! single-shard append-only change log. Suitable for embedded single-host
//! deployments and as the hermetic store under the test suite; several
//! cache instances sharing one `MemoryBackend` behave like nodes sharing
//! one remote table.
//!
//! Mutations serialize through the log mutex so change records observe
//! map mutation order. Cursors are plain offsets into the log, rendered
//! as strings per the backend contract.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::backend::{
    ChangeEventKind, ChangeRecord, GlobalBackend, RecordBatch, ShardId, ShardIteratorPolicy,
    StreamCursor,
};
use crate::cache::types::CacheError;

const SHARD_NAME: &str = "shard-00000000";
const DEFAULT_BATCH_LIMIT: usize = 128;

/// In-memory `GlobalBackend` with a single-shard change stream
#[derive(Debug)]
pub struct MemoryBackend {
    entries: DashMap<String, Vec<u8>>,
    log: Mutex<Vec<ChangeRecord>>,
    batch_limit: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::with_batch_limit(DEFAULT_BATCH_LIMIT)
    }

    /// Create an empty backend with a custom stream page size
    pub fn with_batch_limit(batch_limit: usize) -> Self {
        assert!(batch_limit > 0, "batch limit must be non-zero");
        Self {
            entries: DashMap::new(),
            log: Mutex::new(Vec::new()),
            batch_limit,
        }
    }

    /// Number of stored entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn cursor_offset(cursor: &StreamCursor) -> Result<usize, CacheError> {
        cursor
            .0
            .parse::<usize>()
            .map_err(|_| CacheError::backend(format!("invalid stream cursor: {}", cursor.0)))
    }
}

#[async_trait]
impl GlobalBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn write(&self, key: &str, raw: Vec<u8>) -> Result<(), CacheError> {
        let mut log = self.log.lock().await;
        let old = self.entries.insert(key.to_string(), raw.clone());
        let kind = match old {
            Some(_) => ChangeEventKind::Modify,
            None => ChangeEventKind::Insert,
        };
        log.push(ChangeRecord {
            kind,
            key: key.to_string(),
            old_image: old,
            new_image: Some(raw),
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut log = self.log.lock().await;
        if let Some((_, old)) = self.entries.remove(key) {
            log.push(ChangeRecord {
                kind: ChangeEventKind::Remove,
                key: key.to_string(),
                old_image: Some(old),
                new_image: None,
            });
        }
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        next: Option<Vec<u8>>,
    ) -> Result<bool, CacheError> {
        let mut log = self.log.lock().await;
        let current = self.entries.get(key).map(|entry| entry.value().clone());
        if current.as_deref() != expected {
            return Ok(false);
        }
        match next {
            Some(raw) => {
                let kind = match current {
                    Some(_) => ChangeEventKind::Modify,
                    None => ChangeEventKind::Insert,
                };
                self.entries.insert(key.to_string(), raw.clone());
                log.push(ChangeRecord {
                    kind,
                    key: key.to_string(),
                    old_image: current,
                    new_image: Some(raw),
                });
            }
            None => {
                if current.is_some() {
                    self.entries.remove(key);
                    log.push(ChangeRecord {
                        kind: ChangeEventKind::Remove,
                        key: key.to_string(),
                        old_image: current,
                        new_image: None,
                    });
                }
            }
        }
        Ok(true)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut log = self.log.lock().await;
        let drained: Vec<(String, Vec<u8>)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.entries.clear();
        for (key, old) in drained {
            log.push(ChangeRecord {
                kind: ChangeEventKind::Remove,
                key,
                old_image: Some(old),
                new_image: None,
            });
        }
        Ok(())
    }

    async fn shards(&self) -> Result<Vec<ShardId>, CacheError> {
        Ok(vec![ShardId(SHARD_NAME.to_string())])
    }

    async fn shard_iterator(
        &self,
        _shard: &ShardId,
        policy: ShardIteratorPolicy,
    ) -> Result<StreamCursor, CacheError> {
        let offset = match policy {
            ShardIteratorPolicy::Latest => self.log.lock().await.len(),
            ShardIteratorPolicy::TrimHorizon => 0,
        };
        Ok(StreamCursor(offset.to_string()))
    }

    async fn read_records(&self, cursor: &StreamCursor) -> Result<RecordBatch, CacheError> {
        let offset = Self::cursor_offset(cursor)?;
        let log = self.log.lock().await;
        let from = offset.min(log.len());
        let to = (from + self.batch_limit).min(log.len());
        Ok(RecordBatch {
            records: log[from..to].to_vec(),
            next: Some(StreamCursor(to.to_string())),
        })
    }
}
