//! Strato prelude - convenient imports for users

// The operation trait and the cache implementations
pub use crate::cache::tier::global::GlobalCache;
pub use crate::cache::tier::local::LocalCache;
pub use crate::cache::tiered::{TieredCache, TieredCacheBuilder};
pub use crate::cache::traits::{
    Cache, CacheChangeListener, CacheType, CacheValue, ConsistencyModel,
};

// Error and identity types callers interact with
pub use crate::cache::types::{CacheError, NodeId};

// Configuration
pub use crate::cache::config::{
    CacheConfig, ChangeFeedConfig, GlobalStoreConfig, NearCacheConfig,
};

// Backend contract and the in-process implementation
pub use crate::cache::tier::global::backend::{
    ChangeEventKind, ChangeRecord, GlobalBackend, RecordBatch, ShardId, ShardIteratorPolicy,
    StreamCursor,
};
pub use crate::cache::tier::global::memory::MemoryBackend;

// Near-cache observability
pub use crate::cache::tier::near::NearCacheStatisticsSnapshot;
