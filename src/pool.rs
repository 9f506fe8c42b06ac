//! Fixed-size chunk allocator with a global byte ceiling.
//!
//! Regions are tracked by exact capacity class in a lock-free freelist
//! (one [`crossbeam_queue::SegQueue`] per class, indexed by a [`DashMap`]),
//! so `acquire`/`release` never block on each other. The ceiling itself is
//! enforced with a compare-exchange loop on a single atomic counter.

use crate::chunk::Region;
use crate::config::StorageMode;
use crossbeam_queue::SegQueue;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free pool of fixed-capacity byte regions, bounded by
/// `max_bytes` of outstanding (allocated + cached) capacity.
pub struct BufferPool {
    freelist: DashMap<usize, SegQueue<Region>>,
    allocated_bytes: AtomicU64,
    max_bytes: u64,
    mode: StorageMode,
}

impl BufferPool {
    /// Create a pool with the given ceiling and storage mode.
    pub fn new(max_bytes: u64, mode: StorageMode) -> Self {
        Self {
            freelist: DashMap::new(),
            allocated_bytes: AtomicU64::new(0),
            max_bytes,
            mode,
        }
    }

    /// Acquire a region of exactly `size` bytes, or `None` if doing so
    /// would exceed the ceiling.
    ///
    /// A freelist hit (an exact capacity-class match) is returned without
    /// touching `allocated_bytes`, since that capacity is already counted
    /// as outstanding from when it was first allocated.
    pub fn acquire(&self, size: usize) -> Option<Region> {
        if let Some(queue) = self.freelist.get(&size) {
            if let Some(mut region) = queue.pop() {
                region.iter_mut().for_each(|b| *b = 0);
                return Some(region);
            }
        }

        let size_u64 = size as u64;
        loop {
            let current = self.allocated_bytes.load(Ordering::Acquire);
            let new_total = match current.checked_add(size_u64) {
                Some(v) if v <= self.max_bytes => v,
                _ => {
                    tracing::debug!(
                        requested = size,
                        allocated = current,
                        max = self.max_bytes,
                        "pool exhausted"
                    );
                    return None;
                }
            };
            if self
                .allocated_bytes
                .compare_exchange_weak(current, new_total, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        Some(vec![0u8; size])
    }

    /// Return a region to the freelist for reuse. `allocated_bytes` is
    /// left unchanged: it tracks outstanding *plus* cached capacity, which
    /// keeps usage stable under steady state instead of oscillating
    /// against the ceiling.
    pub fn release(&self, region: Region) {
        let capacity = region.len();
        self.freelist
            .entry(capacity)
            .or_insert_with(SegQueue::new)
            .push(region);
    }

    /// Drop every cached region and reset the allocation counter to zero.
    pub fn release_all(&self) {
        self.freelist.clear();
        self.allocated_bytes.store(0, Ordering::SeqCst);
    }

    /// Current outstanding-plus-cached capacity, in bytes.
    pub fn allocated_size(&self) -> u64 {
        self.allocated_bytes.load(Ordering::Acquire)
    }

    /// The ceiling this pool was constructed with.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// The storage mode this pool was constructed with.
    pub fn mode(&self) -> StorageMode {
        self.mode
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("allocated_bytes", &self.allocated_size())
            .field("max_bytes", &self.max_bytes)
            .field("mode", &self.mode)
            .finish()
    }
}
