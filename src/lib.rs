//! Strato - tiered distributed cache
//!
//! A per-process near-cache layered over a shared authoritative store,
//! kept coherent across nodes by a change feed.
//!
//! # Features
//!
//! - **Slot-table coherence**: lock-free per-slot generation counters keep
//!   stale values out of the near tier when invalidations race against
//!   miss-path population
//! - **Change-feed invalidation**: a background consumer polls the store's
//!   mutation stream and evicts remotely-changed entries, suppressing
//!   echoes of this node's own writes
//! - **Pluggable authoritative store**: any consistent-read key→bytes KV
//!   with a sharded change stream, via the [`GlobalBackend`] trait; an
//!   in-process backend ships in the crate
//! - **Uniform operation surface**: local, global and tiered caches all
//!   implement the same [`Cache`] trait
//!
//! Reads hit the near tier first; misses consult the global store and
//! conditionally admit. Writes go through the global store and propagate
//! to other nodes within the feed poll interval. The arrangement is
//! eventually consistent across nodes and strongly consistent against the
//! store itself.

pub mod cache;
pub mod prelude;

// Re-export the public API at the crate root for convenience
pub use cache::config::CacheConfig;
pub use cache::tier::global::backend::GlobalBackend;
pub use cache::tiered::{TieredCache, TieredCacheBuilder};
pub use cache::traits::{Cache, CacheValue};
pub use cache::types::CacheError;
pub use prelude::*;
