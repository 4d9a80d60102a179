//! Per-slot coherence counters for near-cache admission control
//!
//! Each key hashes to one of a fixed power-of-two number of slots. A slot
//! carries three atomic counters:
//!
//! - `owner_token`: 0 when unclaimed; a claimed slot holds the claimant's
//!   generation mark (captured `completed_ops` + 1, so the mark is never 0).
//!   At most one claimant holds a slot at a time.
//! - `active_ops`: operations currently inside the slot's window.
//! - `completed_ops`: process-lifetime generation counter of retired
//!   operations; never decreases.
//!
//! Admission of a fetched value is allowed only while `active_ops == 1` and
//! `completed_ops` still equals the generation captured at acquisition.
//! Any interleaved invalidation retires through the slot and bumps
//! `completed_ops` (and transiently `active_ops`), so a racing admit
//! observes the disturbance and aborts.
//!
//! Every operation is wait-free: one CAS attempt plus unconditional
//! fetch-add/fetch-sub, no retry loops. All accesses are `SeqCst`.
//! Release is tied to guard drop so it runs on every exit path.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use crossbeam_utils::CachePadded;

const ORDER: Ordering = Ordering::SeqCst;

/// One coherence slot's counters
#[derive(Debug)]
struct Slot {
    owner_token: AtomicU64,
    active_ops: AtomicU64,
    completed_ops: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Self {
            owner_token: AtomicU64::new(0),
            active_ops: AtomicU64::new(0),
            completed_ops: AtomicU64::new(0),
        }
    }
}

/// Fixed table of coherence slots, created eagerly and never resized
pub struct SlotTable {
    slots: Box<[CachePadded<Slot>]>,
    mask: usize,
    hasher: RandomState,
}

impl std::fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotTable")
            .field("slot_count", &self.slots.len())
            .finish()
    }
}

impl SlotTable {
    /// Build a table with `slot_count` slots (non-zero power of two)
    pub fn new(slot_count: usize) -> Self {
        assert!(
            slot_count > 0 && slot_count.is_power_of_two(),
            "slot count must be a non-zero power of two"
        );
        let slots = (0..slot_count)
            .map(|_| CachePadded::new(Slot::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            mask: slot_count - 1,
            hasher: RandomState::new(),
        }
    }

    /// Number of slots in the table
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Deterministic slot index for a key
    ///
    /// Distinct keys may collide; a collision causes extra admission
    /// denials, never a stale admit.
    pub fn slot_of(&self, key: &str) -> usize {
        (self.hasher.hash_one(key) as usize) & self.mask
    }

    /// Enter a slot's window, claiming exclusive admit rights if available
    ///
    /// The claim CAS installs `completed + 1` as the owner mark so a claimed
    /// slot is always non-zero, even for a fresh slot whose generation is
    /// still 0. `active_ops` is incremented whether or not the claim won;
    /// the returned guard releases on drop either way.
    pub fn try_own(&self, slot: usize) -> SlotGuard<'_> {
        let state = &self.slots[slot];
        let completed = state.completed_ops.load(ORDER);
        let token = state
            .owner_token
            .compare_exchange(0, completed + 1, ORDER, ORDER)
            .ok()
            .map(|_| completed);
        state.active_ops.fetch_add(1, ORDER);
        SlotGuard {
            table: self,
            slot,
            token,
        }
    }

    /// Enter every slot's window at once, quiescing the whole table
    ///
    /// No ownership is claimed; the point is to hold `active_ops` above 1
    /// everywhere so no admission can complete until the guard drops.
    pub fn own_all(&self) -> QuiesceGuard<'_> {
        for state in self.slots.iter() {
            state.active_ops.fetch_add(1, ORDER);
        }
        QuiesceGuard { table: self }
    }

    /// Whether the guarded window is still clean enough to admit
    ///
    /// True iff the guard claimed ownership, nothing else is inside the
    /// slot's window, and no operation has retired since acquisition.
    pub fn can_admit(&self, guard: &SlotGuard<'_>) -> bool {
        let Some(token) = guard.token else {
            return false;
        };
        let state = &self.slots[guard.slot];
        state.active_ops.load(ORDER) == 1 && state.completed_ops.load(ORDER) == token
    }

    /// Current `active_ops` for a slot (observability / invariant checks)
    pub fn active_ops(&self, slot: usize) -> u64 {
        self.slots[slot].active_ops.load(ORDER)
    }

    /// Current `completed_ops` for a slot (observability / invariant checks)
    pub fn completed_ops(&self, slot: usize) -> u64 {
        self.slots[slot].completed_ops.load(ORDER)
    }

    fn release(&self, slot: usize, token: Option<u64>) {
        let state = &self.slots[slot];
        state.completed_ops.fetch_add(1, ORDER);
        state.active_ops.fetch_sub(1, ORDER);
        if token.is_some() {
            state.owner_token.store(0, ORDER);
        }
    }

    fn release_all(&self) {
        for state in self.slots.iter() {
            state.completed_ops.fetch_add(1, ORDER);
            state.active_ops.fetch_sub(1, ORDER);
        }
    }
}

/// Window over a single slot; releasing happens on drop
///
/// Dropping increments the slot's generation and leaves its window, and
/// clears the owner mark if this guard held it. Tying release to drop makes
/// it run on early returns, `?` propagation and panics alike.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    table: &'a SlotTable,
    slot: usize,
    token: Option<u64>,
}

impl SlotGuard<'_> {
    /// Index of the guarded slot
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Whether this guard won the ownership claim
    pub fn is_owner(&self) -> bool {
        self.token.is_some()
    }

    /// Whether the window is still clean enough to admit
    pub fn can_admit(&self) -> bool {
        self.table.can_admit(self)
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.table.release(self.slot, self.token);
    }
}

/// Window over every slot at once; releasing happens on drop
#[derive(Debug)]
pub struct QuiesceGuard<'a> {
    table: &'a SlotTable,
}

impl Drop for QuiesceGuard<'_> {
    fn drop(&mut self) {
        self.table.release_all();
    }
}
