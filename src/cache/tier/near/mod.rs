//! Near-cache tier: slot-guarded admission over the local store
//!
//! Plain reads and evictions go straight to the local map. Population is
//! the guarded path: a miss must enter its key's slot window, fetch from
//! the authoritative store, and admit only while the window is provably
//! undisturbed. An invalidation that interleaves with the miss retires
//! through the same slot and defeats the admit check, so the possibly
//! stale fetched value is dropped instead of cached.

pub mod slot;

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::cache::tier::local::LocalCache;
use crate::cache::traits::CacheValue;

pub use self::slot::{QuiesceGuard, SlotGuard, SlotTable};

/// Cache-padded counters for near-cache behavior
#[derive(Debug, Default)]
pub struct NearCacheStatistics {
    hits: CachePadded<AtomicU64>,
    misses: CachePadded<AtomicU64>,
    admissions: CachePadded<AtomicU64>,
    rejected_admissions: CachePadded<AtomicU64>,
    invalidations: CachePadded<AtomicU64>,
}

/// Point-in-time copy of the near-cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearCacheStatisticsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub admissions: u64,
    pub rejected_admissions: u64,
    pub invalidations: u64,
}

impl NearCacheStatistics {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_admission(&self) {
        self.admissions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected_admission(&self) {
        self.rejected_admissions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> NearCacheStatisticsSnapshot {
        NearCacheStatisticsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            admissions: self.admissions.load(Ordering::Relaxed),
            rejected_admissions: self.rejected_admissions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Per-process near cache with slot-table admission control
#[derive(Debug)]
pub struct NearCache<V> {
    local: LocalCache<V>,
    slots: SlotTable,
    statistics: NearCacheStatistics,
}

impl<V: CacheValue> NearCache<V> {
    /// Create a near cache with `slot_count` coherence slots
    pub fn new(slot_count: usize) -> Self {
        Self {
            local: LocalCache::new(),
            slots: SlotTable::new(slot_count),
            statistics: NearCacheStatistics::default(),
        }
    }

    /// Probe the local tier; no slot interaction
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.local.get_sync(key);
        match value {
            Some(_) => self.statistics.record_hit(),
            None => self.statistics.record_miss(),
        }
        value
    }

    /// Enter the slot window for `key`
    pub fn try_own(&self, key: &str) -> SlotGuard<'_> {
        self.slots.try_own(self.slots.slot_of(key))
    }

    /// Quiesce every slot at once (used by `clear`)
    pub fn own_all(&self) -> QuiesceGuard<'_> {
        self.slots.own_all()
    }

    /// Admit `value` under `key` iff the guarded window is still clean
    ///
    /// Returns whether the value was admitted. A denial is not an error:
    /// the authoritative store stays the source of truth for the next read.
    pub fn put_if_available(&self, guard: &SlotGuard<'_>, key: &str, value: V) -> bool {
        if guard.can_admit() {
            self.local.put_sync(key, value);
            self.statistics.record_admission();
            true
        } else {
            self.statistics.record_rejected_admission();
            false
        }
    }

    /// Unconditionally evict `key` from the local tier
    pub fn remove(&self, key: &str) {
        self.local.remove_sync(key);
    }

    /// Evict every entry from the local tier
    pub fn clear(&self) {
        self.local.clear_sync();
    }

    /// Invalidate `key` inside its own slot window
    ///
    /// This is the uniform change-listener dispatch: entering and retiring
    /// through the slot bumps its generation, which aborts any admission
    /// racing against this invalidation.
    pub fn invalidate(&self, key: &str) {
        let _guard = self.try_own(key);
        self.local.remove_sync(key);
        self.statistics.record_invalidation();
    }

    /// Number of resident entries
    pub fn entry_count(&self) -> usize {
        self.local.entry_count()
    }

    /// Behavior counters
    pub fn statistics(&self) -> &NearCacheStatistics {
        &self.statistics
    }

    /// The coherence slot table (observability / invariant checks)
    pub fn slot_table(&self) -> &SlotTable {
        &self.slots
    }
}
