//! Large Object Allocator
//!
//! Allocator for objects above the large-object threshold.
//! Each large object gets a dedicated segment sized exactly to its slot, so
//! it never fragments normal segments, and the segment is released as soon
//! as the object dies.

use crate::error::{MemoryError, Result};
use crate::heap::{Heap, SegmentKind};
use crate::object::{ObjectHeader, ObjectRef};

/// LargeObjectAllocator - one segment per object
#[derive(Debug, Default)]
pub struct LargeObjectAllocator {
    /// Total bytes ever reserved
    total_allocated: usize,

    /// Count of reserved objects
    object_count: usize,
}

impl LargeObjectAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot in a new large segment
    ///
    /// # Arguments
    /// * `heap` - heap to acquire the segment from
    /// * `header` - header of the object; its size is the segment size
    pub fn reserve(&mut self, heap: &mut Heap, header: ObjectHeader) -> Result<ObjectRef> {
        let size = header.size();
        let id = heap.acquire_segment(SegmentKind::Large, size)?;

        let Some(r) = heap.place(id, header) else {
            heap.release_segment(id);
            return Err(MemoryError::OutOfMemory {
                requested: size,
                limit: heap.max_size(),
            });
        };

        self.total_allocated += size;
        self.object_count += 1;
        Ok(r)
    }

    pub fn total_allocated(&self) -> usize {
        self.total_allocated
    }

    pub fn object_count(&self) -> usize {
        self.object_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::object::TypeTag;

    #[test]
    fn test_large_object_gets_own_segment() {
        let config = MemoryConfig {
            segment_size: 4096,
            large_object_threshold: 1024,
            max_heap_size: 64 * 1024,
            ..Default::default()
        };
        let mut heap = Heap::new(&config).unwrap();
        let mut large = LargeObjectAllocator::new();

        let r = large
            .reserve(&mut heap, ObjectHeader::new(TypeTag::BUFFER, 8192, 1))
            .unwrap();

        let segment = heap.segment(r.segment()).unwrap();
        assert_eq!(segment.kind(), SegmentKind::Large);
        assert_eq!(segment.size(), 8192);
        assert_eq!(segment.free_bytes(), 0);
        assert_eq!(large.object_count(), 1);
    }

    #[test]
    fn test_large_object_over_limit() {
        let config = MemoryConfig {
            segment_size: 4096,
            large_object_threshold: 1024,
            max_heap_size: 8192,
            ..Default::default()
        };
        let mut heap = Heap::new(&config).unwrap();
        let mut large = LargeObjectAllocator::new();

        let err = large
            .reserve(&mut heap, ObjectHeader::new(TypeTag::BUFFER, 8192, 1))
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(heap.segment_count(), 1);
    }
}
