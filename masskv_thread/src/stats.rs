use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::MemTag;

#[derive(Debug, Default)]
struct TagCounters {
    allocations: AtomicU64,
    allocated_bytes: AtomicU64,
    freed_bytes: AtomicU64,
    retired_bytes: AtomicU64,
    reclaimed_bytes: AtomicU64,
}

/// Memory accounting shared by every thread of a store.
#[derive(Debug, Default)]
pub struct MemStats {
    tags: [TagCounters; MemTag::COUNT],
}

/// Point-in-time copy of the counters for one tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemSnapshot {
    /// Number of allocations.
    pub allocations: u64,
    /// Bytes allocated.
    pub allocated_bytes: u64,
    /// Bytes freed through the immediate channel.
    pub freed_bytes: u64,
    /// Bytes handed to the deferred channel.
    pub retired_bytes: u64,
    /// Deferred bytes actually returned to the allocator.
    pub reclaimed_bytes: u64,
}

impl MemSnapshot {
    /// Bytes neither freed nor retired.
    pub fn live_bytes(&self) -> u64 {
        // Counters are loaded independently; concurrent frees can overtake.
        self.allocated_bytes.saturating_sub(self.freed_bytes + self.retired_bytes)
    }
}

impl MemStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_alloc(&self, tag: MemTag, size: usize) {
        let c = &self.tags[tag.slot()];
        c.allocations.fetch_add(1, Ordering::Relaxed);
        c.allocated_bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_free(&self, tag: MemTag, size: usize) {
        self.tags[tag.slot()].freed_bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_retire(&self, tag: MemTag, size: usize) {
        self.tags[tag.slot()].retired_bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_reclaim(&self, tag: MemTag, size: usize) {
        self.tags[tag.slot()].reclaimed_bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Live bytes for a tag.
    pub fn live_bytes(&self, tag: MemTag) -> u64 {
        self.snapshot(tag).live_bytes()
    }

    /// Copy the counters for a tag.
    pub fn snapshot(&self, tag: MemTag) -> MemSnapshot {
        let c = &self.tags[tag.slot()];
        MemSnapshot {
            allocations: c.allocations.load(Ordering::Relaxed),
            allocated_bytes: c.allocated_bytes.load(Ordering::Relaxed),
            freed_bytes: c.freed_bytes.load(Ordering::Relaxed),
            retired_bytes: c.retired_bytes.load(Ordering::Relaxed),
            reclaimed_bytes: c.reclaimed_bytes.load(Ordering::Relaxed),
        }
    }
}
