//! Segment - a contiguous byte range carved into object slots
//!
//! A segment starts as one dead chunk covering its whole range. Allocation
//! carves slots first-fit out of dead chunks; freeing a slot turns its range
//! back into a dead chunk, and [`Segment::coalesce`] merges neighbours.
//!
//! ```text
//! fresh:     [..................dead..................]
//! carved:    [obj A][obj B][obj C][........dead.......]
//! B freed:   [obj A][dead ][obj C][........dead.......]
//! C freed:   [obj A][dead ][dead ][........dead.......]
//! coalesce:  [obj A][...............dead..............]
//! ```

use omem_util::IndexSlab;
use serde::Serialize;

use crate::object::header::MIN_OBJECT_SIZE;
use crate::object::{HeapObject, ObjectHeader, SlotId};

/// Segment class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SegmentKind {
    /// Shared by many objects up to the large-object threshold
    Normal,
    /// Holds exactly one large object
    Large,
}

/// An object slot
#[derive(Debug)]
pub struct Slot {
    pub offset: usize,
    pub header: ObjectHeader,
    /// `None` while a restore pass has reserved the slot but not yet
    /// decoded its object
    pub object: Option<Box<dyn HeapObject>>,
}

impl Slot {
    #[inline]
    pub fn size(&self) -> usize {
        self.header.size()
    }
}

/// Free range inside a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadChunk {
    pub offset: usize,
    pub size: usize,
}

/// A heap segment
#[derive(Debug)]
pub struct Segment {
    kind: SegmentKind,
    size: usize,
    slots: IndexSlab<SlotId, Slot>,
    dead: Vec<DeadChunk>,
    used_bytes: usize,
}

impl Segment {
    /// Create an empty segment of `size` bytes
    pub fn new(kind: SegmentKind, size: usize) -> Self {
        Self {
            kind,
            size,
            slots: IndexSlab::new(),
            dead: vec![DeadChunk { offset: 0, size }],
            used_bytes: 0,
        }
    }

    #[inline]
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes held by slots
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Bytes held by dead chunks
    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.size - self.used_bytes
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.slots.len()
    }

    /// No slot is in use
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn dead_chunks(&self) -> &[DeadChunk] {
        &self.dead
    }

    /// Largest single dead chunk
    pub fn largest_free(&self) -> usize {
        self.dead.iter().map(|c| c.size).max().unwrap_or(0)
    }

    /// Reserve a slot of `header.size()` bytes
    ///
    /// Takes the first dead chunk that fits. A remainder smaller than the
    /// minimum object size is absorbed into the new slot and the header's
    /// size grows to match. The slot starts without an object.
    ///
    /// # Returns
    /// The slot index, or `None` if no chunk is large enough
    pub fn place(&mut self, mut header: ObjectHeader) -> Option<SlotId> {
        let size = header.size();
        let position = self.dead.iter().position(|c| c.size >= size)?;

        let chunk = self.dead[position];
        let span = if chunk.size - size >= MIN_OBJECT_SIZE {
            self.dead[position] = DeadChunk {
                offset: chunk.offset + size,
                size: chunk.size - size,
            };
            size
        } else {
            self.dead.remove(position);
            chunk.size
        };

        header.absorb(span);
        self.used_bytes += span;
        Some(self.slots.insert(Slot {
            offset: chunk.offset,
            header,
            object: None,
        }))
    }

    /// Free a slot, turning its range into a dead chunk
    ///
    /// Dead chunks are not merged here; call [`coalesce`](Self::coalesce)
    /// after a batch of frees.
    pub fn free(&mut self, slot: SlotId) -> Option<Slot> {
        let freed = self.slots.remove(slot)?;
        self.used_bytes -= freed.size();
        self.dead.push(DeadChunk {
            offset: freed.offset,
            size: freed.size(),
        });
        Some(freed)
    }

    /// Sort dead chunks by offset and merge adjacent ones
    pub fn coalesce(&mut self) {
        if self.dead.len() < 2 {
            return;
        }
        self.dead.sort_unstable_by_key(|c| c.offset);

        let mut merged: Vec<DeadChunk> = Vec::with_capacity(self.dead.len());
        for chunk in self.dead.drain(..) {
            match merged.last_mut() {
                Some(last) if last.offset + last.size == chunk.offset => last.size += chunk.size,
                _ => merged.push(chunk),
            }
        }
        self.dead = merged;
    }

    #[inline]
    pub fn slot(&self, slot: SlotId) -> Option<&Slot> {
        self.slots.get(slot)
    }

    #[inline]
    pub fn slot_mut(&mut self, slot: SlotId) -> Option<&mut Slot> {
        self.slots.get_mut(slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = (SlotId, &Slot)> {
        self.slots.iter()
    }

    /// Slot indices, collected so slots may be freed while walking them
    pub fn slot_ids(&self) -> Vec<SlotId> {
        self.slots.occupied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::TypeTag;

    fn header(size: usize) -> ObjectHeader {
        ObjectHeader::new(TypeTag::BUFFER, size, 1)
    }

    #[test]
    fn test_fresh_segment_is_one_dead_chunk() {
        let segment = Segment::new(SegmentKind::Normal, 1024);

        assert!(segment.is_empty());
        assert_eq!(segment.dead_chunks(), &[DeadChunk { offset: 0, size: 1024 }]);
        assert_eq!(segment.free_bytes(), 1024);
    }

    #[test]
    fn test_place_carves_first_fit() {
        let mut segment = Segment::new(SegmentKind::Normal, 1024);

        let a = segment.place(header(64)).unwrap();
        let b = segment.place(header(128)).unwrap();

        assert_eq!(segment.slot(a).unwrap().offset, 0);
        assert_eq!(segment.slot(b).unwrap().offset, 64);
        assert_eq!(segment.used_bytes(), 192);
        assert_eq!(segment.dead_chunks(), &[DeadChunk { offset: 192, size: 832 }]);
    }

    #[test]
    fn test_small_remainder_is_absorbed() {
        let mut segment = Segment::new(SegmentKind::Normal, 96);

        let a = segment.place(header(72)).unwrap();

        // 24 bytes left is below the minimum object size.
        assert_eq!(segment.slot(a).unwrap().size(), 96);
        assert!(segment.dead_chunks().is_empty());
        assert!(segment.place(header(32)).is_none());
    }

    #[test]
    fn test_free_and_coalesce() {
        let mut segment = Segment::new(SegmentKind::Normal, 256);
        let a = segment.place(header(64)).unwrap();
        let b = segment.place(header(64)).unwrap();
        let c = segment.place(header(64)).unwrap();

        segment.free(b);
        segment.free(c);
        assert_eq!(segment.dead_chunks().len(), 3);

        segment.coalesce();
        assert_eq!(segment.dead_chunks(), &[DeadChunk { offset: 64, size: 192 }]);

        segment.free(a);
        segment.coalesce();
        assert!(segment.is_empty());
        assert_eq!(segment.dead_chunks(), &[DeadChunk { offset: 0, size: 256 }]);
    }

    #[test]
    fn test_freed_hole_is_reused() {
        let mut segment = Segment::new(SegmentKind::Normal, 256);
        let _a = segment.place(header(64)).unwrap();
        let b = segment.place(header(64)).unwrap();
        let _c = segment.place(header(128)).unwrap();

        segment.free(b);
        let d = segment.place(header(48)).unwrap();

        assert_eq!(segment.slot(d).unwrap().offset, 64);
        // 16-byte remainder absorbed
        assert_eq!(segment.slot(d).unwrap().size(), 64);
    }
}
