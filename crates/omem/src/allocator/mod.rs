//! Allocator Module - Slot Placement Strategies
//!
//! Decides where a new object's slot goes. The collection-then-expand
//! policy around it lives in [`Memory`](crate::memory::Memory), which owns
//! both the allocator and the collector.
//!
//! ## Placement
//!
//! - **First fit**: normal objects take the first dead chunk large enough,
//!   scanning normal segments in creation order
//! - **Large objects**: anything above `large_object_threshold` gets a
//!   dedicated segment (see [`large`])
//!
//! ## Sizes
//!
//! Slot size = header + payload, rounded up to the object grain, never below
//! the minimum object size.

pub mod large;

pub use large::LargeObjectAllocator;

use serde::Serialize;

use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::heap::Heap;
use crate::object::{ObjectHeader, ObjectRef};

/// Slot placement for one memory instance
#[derive(Debug)]
pub struct Allocator {
    /// Large object allocator
    large: LargeObjectAllocator,

    /// Slots above this size go to the large allocator
    large_threshold: usize,

    stats: AllocatorStats,
}

impl Allocator {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            large: LargeObjectAllocator::new(),
            large_threshold: config.large_object_threshold,
            stats: AllocatorStats::default(),
        }
    }

    /// Whether a slot of `size` bytes needs its own segment
    #[inline]
    pub fn is_large(&self, size: usize) -> bool {
        size > self.large_threshold
    }

    /// Reserve a normal slot in an existing segment
    ///
    /// # Returns
    /// `None` if no normal segment has a dead chunk that fits
    pub fn try_reserve(&mut self, heap: &mut Heap, header: ObjectHeader) -> Option<ObjectRef> {
        let size = header.size();
        for id in heap.normal_segment_ids() {
            let fits = heap
                .segment(id)
                .map_or(false, |segment| segment.largest_free() >= size);
            if !fits {
                continue;
            }
            if let Some(r) = heap.place(id, header) {
                self.record(heap, r);
                return Some(r);
            }
        }
        None
    }

    /// Reserve a normal slot in a freshly acquired segment
    pub fn reserve_in_new_segment(
        &mut self,
        heap: &mut Heap,
        header: ObjectHeader,
    ) -> Result<ObjectRef> {
        let id = heap.acquire_normal_segment()?;
        let r = heap
            .place(id, header)
            .ok_or(MemoryError::OutOfMemory {
                requested: header.size(),
                limit: heap.max_size(),
            })?;
        self.record(heap, r);
        Ok(r)
    }

    /// Reserve a large slot in its own segment
    pub fn reserve_large(&mut self, heap: &mut Heap, header: ObjectHeader) -> Result<ObjectRef> {
        let r = self.large.reserve(heap, header)?;
        self.record(heap, r);
        Ok(r)
    }

    fn record(&mut self, heap: &Heap, r: ObjectRef) {
        let size = heap.header(r).map_or(0, |h| h.size());
        self.stats.allocations += 1;
        self.stats.bytes_allocated += size as u64;
        if self.is_large(size) {
            self.stats.large_allocations += 1;
        }
    }

    /// Reserve-time statistics
    pub fn stats(&self) -> AllocatorStats {
        self.stats
    }

    pub fn large(&self) -> &LargeObjectAllocator {
        &self.large
    }
}

/// Statistics for allocator
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    /// Slots reserved
    pub allocations: u64,
    /// Bytes reserved (slot sizes)
    pub bytes_allocated: u64,
    /// Slots reserved in large segments
    pub large_allocations: u64,
}
