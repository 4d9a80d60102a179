//! Authoritative-store contract
//!
//! The backend is the shared, consistent-read key→bytes store plus its
//! sharded change stream. Concrete implementations typically wrap an
//! external KV service; the crate ships an in-process one for embedded use
//! and tests. Credentials and transport concerns live entirely inside
//! implementations.

use async_trait::async_trait;

use crate::cache::types::CacheError;

/// Kind of mutation a change record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEventKind {
    /// A key that did not exist was written
    Insert,
    /// An existing key was overwritten
    Modify,
    /// A key was deleted
    Remove,
}

/// One mutation observed on the change stream
///
/// Images are raw envelope bytes as stored; either may be absent depending
/// on the event kind and what the stream retains.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub kind: ChangeEventKind,
    pub key: String,
    pub old_image: Option<Vec<u8>>,
    pub new_image: Option<Vec<u8>>,
}

/// Identifier of one shard of the change stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardId(pub String);

/// Opaque resume position within the stream
///
/// Backends encode whatever they need (shard, offset, provider iterator
/// handle) into the string; consumers only store and hand it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCursor(pub String);

/// Where a fresh shard iterator starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardIteratorPolicy {
    /// Skip all history; read only changes after iterator creation
    Latest,
    /// Start at the earliest change the stream still retains
    TrimHorizon,
}

/// One page of change records plus the cursor to continue from
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub records: Vec<ChangeRecord>,
    /// Cursor for the next page; `None` means the shard is closed
    pub next: Option<StreamCursor>,
}

/// Contract for the authoritative remote store
///
/// Reads are strongly consistent. Every committed mutation eventually
/// surfaces on the change stream as a record carrying old and new images.
#[async_trait]
pub trait GlobalBackend: Send + Sync + 'static {
    /// Strongly consistent read of the raw stored bytes
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Unconditional write of raw bytes
    async fn write(&self, key: &str, raw: Vec<u8>) -> Result<(), CacheError>;

    /// Unconditional delete
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Conditional write: apply `next` only if the stored bytes equal
    /// `expected` (`None` = key absent; `next: None` = delete).
    /// Returns whether the swap was applied.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        next: Option<Vec<u8>>,
    ) -> Result<bool, CacheError>;

    /// Delete every entry
    async fn clear(&self) -> Result<(), CacheError>;

    /// Enumerate the current shard set of the change stream
    async fn shards(&self) -> Result<Vec<ShardId>, CacheError>;

    /// Obtain a cursor into one shard according to `policy`
    async fn shard_iterator(
        &self,
        shard: &ShardId,
        policy: ShardIteratorPolicy,
    ) -> Result<StreamCursor, CacheError>;

    /// Read the next page of records at `cursor`
    async fn read_records(&self, cursor: &StreamCursor) -> Result<RecordBatch, CacheError>;
}
