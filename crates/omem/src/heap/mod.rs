//! Heap Management Module - Segment-Based Object Storage
//!
//! The heap owns every segment of one memory instance and is the only
//! component that creates or destroys them.
//!
//! Segment classes:
//! - Normal (`segment_size`): shared by objects up to the large threshold
//! - Large (object size): exactly one object, released when it dies
//!
//! Segment Lifecycle:
//! 1. Acquired - on startup or when allocation finds no room
//! 2. Carved - slots placed first-fit into dead chunks
//! 3. Swept - dead slots become dead chunks, neighbours coalesce
//! 4. Released - once empty, except the startup segment
//!
//! Heap Structure:
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                        Heap                          │
//! │  ┌───────────┐ ┌───────────┐ ┌───────────┐ ┌──────┐  │
//! │  │ Segment 0 │ │ Segment 1 │ │ Segment 2 │ │ ...  │  │
//! │  │ (startup) │ │ (Normal)  │ │ (Large)   │ │      │  │
//! │  └───────────┘ └───────────┘ └───────────┘ └──────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod segment;

pub use segment::{DeadChunk, Segment, SegmentKind, Slot};

use omem_util::IndexSlab;

use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::logging::{self, MemoryEvent};
use crate::object::{HeapObject, ObjectHeader, ObjectRef, SegmentId};

/// Heap - container for all segments of one instance
#[derive(Debug)]
pub struct Heap {
    segments: IndexSlab<SegmentId, Segment>,

    /// Startup segment, never released
    startup: Option<SegmentId>,

    /// Size of a normal segment
    segment_size: usize,

    /// Hard limit on committed bytes
    max_size: usize,

    /// Sum of all segment sizes
    committed: usize,

    /// Forward segment events to the global logger
    verbose: bool,

    segments_acquired: u64,
    segments_released: u64,
}

impl Heap {
    /// Create heap with the configured initial segments
    ///
    /// # Arguments
    /// * `config` - validated memory configuration
    pub fn new(config: &MemoryConfig) -> Result<Self> {
        let mut heap = Self {
            segments: IndexSlab::new(),
            startup: None,
            segment_size: config.segment_size,
            max_size: config.max_heap_size,
            committed: 0,
            verbose: config.verbose,
            segments_acquired: 0,
            segments_released: 0,
        };

        for _ in 0..config.initial_segments {
            let id = heap.acquire_segment(SegmentKind::Normal, config.segment_size)?;
            heap.startup.get_or_insert(id);
        }

        Ok(heap)
    }

    // === Segment Lifecycle ===

    /// Add a segment of `size` bytes
    ///
    /// # Returns
    /// `OutOfMemory` if the segment would push committed bytes past the
    /// heap limit
    pub fn acquire_segment(&mut self, kind: SegmentKind, size: usize) -> Result<SegmentId> {
        if self.committed.saturating_add(size) > self.max_size {
            return Err(MemoryError::OutOfMemory {
                requested: size,
                limit: self.max_size,
            });
        }

        let id = self.segments.insert(Segment::new(kind, size));
        self.committed += size;
        self.segments_acquired += 1;

        log::debug!("acquired {:?} segment {} ({} bytes)", kind, id.0, size);
        self.emit(MemoryEvent::SegmentAcquired {
            segment: id.0,
            size,
            large: kind == SegmentKind::Large,
        });
        Ok(id)
    }

    /// Acquire a normal segment of the configured size
    pub fn acquire_normal_segment(&mut self) -> Result<SegmentId> {
        self.acquire_segment(SegmentKind::Normal, self.segment_size)
    }

    /// Drop an empty segment
    ///
    /// Refuses the startup segment and segments that still hold slots.
    pub fn release_segment(&mut self, id: SegmentId) -> bool {
        if Some(id) == self.startup {
            return false;
        }
        match self.segments.get(id) {
            Some(segment) if segment.is_empty() => {},
            _ => return false,
        }

        let Some(segment) = self.segments.remove(id) else {
            return false;
        };
        self.committed -= segment.size();
        self.segments_released += 1;

        log::debug!(
            "released {:?} segment {} ({} bytes)",
            segment.kind(),
            id.0,
            segment.size()
        );
        self.emit(MemoryEvent::SegmentReleased {
            segment: id.0,
            size: segment.size(),
            large: segment.kind() == SegmentKind::Large,
        });
        true
    }

    /// Release every empty segment except the startup one
    ///
    /// # Returns
    /// Number of segments released
    pub fn release_empty_segments(&mut self) -> usize {
        let empty: Vec<SegmentId> = self
            .segments
            .iter()
            .filter(|(id, segment)| segment.is_empty() && Some(*id) != self.startup)
            .map(|(id, _)| id)
            .collect();

        empty
            .into_iter()
            .filter(|&id| self.release_segment(id))
            .count()
    }

    fn emit(&self, event: MemoryEvent) {
        if self.verbose {
            logging::log_event(event);
        }
    }

    // === Slot Access ===

    /// Reserve a slot for `header` in segment `id`
    pub fn place(&mut self, id: SegmentId, header: ObjectHeader) -> Option<ObjectRef> {
        let slot = self.segments.get_mut(id)?.place(header)?;
        Some(ObjectRef::new(id, slot))
    }

    /// Put an object into a reserved slot
    pub fn install(&mut self, r: ObjectRef, object: Box<dyn HeapObject>) -> Result<()> {
        let slot = self.slot_mut(r)?;
        debug_assert_eq!(slot.header.type_tag(), object.type_tag());
        slot.object = Some(object);
        Ok(())
    }

    /// Free a slot, returning whatever object it held
    pub fn free(&mut self, r: ObjectRef) -> Option<Slot> {
        self.segments.get_mut(r.segment())?.free(r.slot())
    }

    pub fn slot(&self, r: ObjectRef) -> Result<&Slot> {
        self.segments
            .get(r.segment())
            .and_then(|segment| segment.slot(r.slot()))
            .ok_or(MemoryError::InvalidReference(r))
    }

    pub fn slot_mut(&mut self, r: ObjectRef) -> Result<&mut Slot> {
        self.segments
            .get_mut(r.segment())
            .and_then(|segment| segment.slot_mut(r.slot()))
            .ok_or(MemoryError::InvalidReference(r))
    }

    /// Object stored at `r`
    ///
    /// A reserved slot whose object was never installed is reported as an
    /// invalid reference.
    pub fn object(&self, r: ObjectRef) -> Result<&dyn HeapObject> {
        self.slot(r)?
            .object
            .as_deref()
            .ok_or(MemoryError::InvalidReference(r))
    }

    pub fn object_mut(&mut self, r: ObjectRef) -> Result<&mut dyn HeapObject> {
        match self.slot_mut(r)?.object.as_deref_mut() {
            Some(object) => Ok(object),
            None => Err(MemoryError::InvalidReference(r)),
        }
    }

    pub fn header(&self, r: ObjectRef) -> Result<&ObjectHeader> {
        Ok(&self.slot(r)?.header)
    }

    pub fn contains(&self, r: ObjectRef) -> bool {
        self.slot(r).is_ok()
    }

    // === Segment Queries ===

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.segments.get_mut(id)
    }

    pub fn segments(&self) -> impl Iterator<Item = (SegmentId, &Segment)> {
        self.segments.iter()
    }

    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.segments.occupied()
    }

    /// Ids of normal segments in creation order
    pub fn normal_segment_ids(&self) -> Vec<SegmentId> {
        self.segments
            .iter()
            .filter(|(_, segment)| segment.kind() == SegmentKind::Normal)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn startup_segment(&self) -> Option<SegmentId> {
        self.startup
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Bytes in all segments
    pub fn committed_bytes(&self) -> usize {
        self.committed
    }

    /// Bytes held by slots across all segments
    pub fn used_bytes(&self) -> usize {
        self.segments.iter().map(|(_, s)| s.used_bytes()).sum()
    }

    /// Total number of slots
    pub fn object_count(&self) -> usize {
        self.segments.iter().map(|(_, s)| s.object_count()).sum()
    }

    /// Free fraction of normal segments (0.0 - 1.0)
    pub fn normal_free_ratio(&self) -> f64 {
        let (free, total) = self
            .segments
            .iter()
            .filter(|(_, s)| s.kind() == SegmentKind::Normal)
            .fold((0usize, 0usize), |(free, total), (_, s)| {
                (free + s.free_bytes(), total + s.size())
            });

        if total == 0 {
            return 0.0;
        }
        free as f64 / total as f64
    }

    pub fn segments_acquired(&self) -> u64 {
        self.segments_acquired
    }

    pub fn segments_released(&self) -> u64 {
        self.segments_released
    }
}
