//! Heap census - per-type, per-segment and per-segment-class counters
//!
//! A census is a read-only scan over every segment. Liveness comes from
//! the mark word: a slot is live iff it carries the current epoch. Dead
//! chunks and unmarked slots both count as dead objects, so for each
//! segment, and therefore for each segment class
//!
//! ```text
//! live_objects + dead_objects == count
//! live_bytes   + dead_bytes   == total_bytes
//! ```
//!
//! The census borrows the heap immutably, so it cannot overlap a sweep.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::heap::{Heap, SegmentKind};
use crate::object::{TypeRegistry, TypeTag};

/// Live objects of one type
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObjectStats {
    pub count: usize,
    pub bytes: usize,
}

/// Counters for one segment or one segment class
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentStats {
    pub segments: usize,
    /// Slots plus dead chunks
    pub count: usize,
    pub live_objects: usize,
    pub dead_objects: usize,
    pub total_bytes: usize,
    pub live_bytes: usize,
    pub dead_bytes: usize,
}

impl SegmentStats {
    /// Check the count and byte identities
    pub fn is_consistent(&self) -> bool {
        self.live_objects + self.dead_objects == self.count
            && self.live_bytes + self.dead_bytes == self.total_bytes
    }

    fn add(&mut self, other: &SegmentStats) {
        self.segments += other.segments;
        self.count += other.count;
        self.live_objects += other.live_objects;
        self.dead_objects += other.dead_objects;
        self.total_bytes += other.total_bytes;
        self.live_bytes += other.live_bytes;
        self.dead_bytes += other.dead_bytes;
    }
}

/// Result of one census
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub epoch: u64,
    pub committed_bytes: usize,
    /// Live objects per type
    pub objects: BTreeMap<TypeTag, ObjectStats>,
    /// Display names of the types in `objects`
    pub type_names: BTreeMap<TypeTag, String>,
    pub normal: SegmentStats,
    pub large: SegmentStats,
    /// One entry per segment, in heap order
    pub segments: Vec<SegmentStats>,
}

impl MemoryStats {
    /// Scan the heap
    pub fn collect(heap: &Heap, registry: &TypeRegistry, epoch: u64) -> Self {
        let mut stats = MemoryStats {
            epoch,
            committed_bytes: heap.committed_bytes(),
            objects: BTreeMap::new(),
            type_names: BTreeMap::new(),
            normal: SegmentStats::default(),
            large: SegmentStats::default(),
            segments: Vec::with_capacity(heap.segment_count()),
        };

        for (_, segment) in heap.segments() {
            let mut counts = SegmentStats {
                segments: 1,
                total_bytes: segment.size(),
                ..Default::default()
            };

            for chunk in segment.dead_chunks() {
                counts.count += 1;
                counts.dead_objects += 1;
                counts.dead_bytes += chunk.size;
            }

            for (_, slot) in segment.slots() {
                counts.count += 1;
                if slot.header.is_live(epoch) {
                    counts.live_objects += 1;
                    counts.live_bytes += slot.size();

                    let tag = slot.header.type_tag();
                    let entry = stats.objects.entry(tag).or_default();
                    entry.count += 1;
                    entry.bytes += slot.size();
                } else {
                    counts.dead_objects += 1;
                    counts.dead_bytes += slot.size();
                }
            }

            match segment.kind() {
                SegmentKind::Normal => stats.normal.add(&counts),
                SegmentKind::Large => stats.large.add(&counts),
            }
            stats.segments.push(counts);
        }

        stats.type_names = stats
            .objects
            .keys()
            .map(|&tag| (tag, registry.name_of(tag)))
            .collect();
        stats
    }

    /// Live objects of `tag`
    pub fn object_stats(&self, tag: TypeTag) -> ObjectStats {
        self.objects.get(&tag).copied().unwrap_or_default()
    }

    pub fn live_objects(&self) -> usize {
        self.normal.live_objects + self.large.live_objects
    }

    pub fn live_bytes(&self) -> usize {
        self.normal.live_bytes + self.large.live_bytes
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Memory statistics (epoch {}, {} bytes committed)",
            self.epoch, self.committed_bytes
        )?;

        writeln!(f, "  {:<16} {:>10} {:>12}", "Type", "Count", "Bytes")?;
        for (tag, object) in &self.objects {
            let name = self
                .type_names
                .get(tag)
                .cloned()
                .unwrap_or_else(|| tag.to_string());
            writeln!(f, "  {:<16} {:>10} {:>12}", name, object.count, object.bytes)?;
        }

        writeln!(
            f,
            "  {:<8} {:>6} {:>8} {:>8} {:>8} {:>12} {:>12} {:>12}",
            "Class", "Segs", "Count", "Live", "Dead", "Total", "LiveBytes", "DeadBytes"
        )?;
        for (name, class) in [("normal", &self.normal), ("large", &self.large)] {
            writeln!(
                f,
                "  {:<8} {:>6} {:>8} {:>8} {:>8} {:>12} {:>12} {:>12}",
                name,
                class.segments,
                class.count,
                class.live_objects,
                class.dead_objects,
                class.total_bytes,
                class.live_bytes,
                class.dead_bytes
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::object::{ObjectHeader, SegmentId, StringObject};

    #[test]
    fn test_fresh_heap_is_all_dead_space() {
        let heap = Heap::new(&MemoryConfig::default()).unwrap();
        let stats = MemoryStats::collect(&heap, &TypeRegistry::with_builtins(), 1);

        assert_eq!(stats.normal.segments, 1);
        assert_eq!(stats.normal.count, 1);
        assert_eq!(stats.normal.dead_objects, 1);
        assert_eq!(stats.normal.live_bytes, 0);
        assert!(stats.normal.is_consistent());
        assert_eq!(stats.segments, vec![stats.normal]);
        assert!(stats.objects.is_empty());
    }

    #[test]
    fn test_unmarked_slot_counts_as_dead() {
        let mut heap = Heap::new(&MemoryConfig::default()).unwrap();
        let live = heap
            .place(SegmentId(0), ObjectHeader::new(TypeTag::STRING, 32, 2))
            .unwrap();
        heap.install(live, Box::new(StringObject::new("a"))).unwrap();
        heap.place(SegmentId(0), ObjectHeader::new(TypeTag::STRING, 32, 1))
            .unwrap();

        let stats = MemoryStats::collect(&heap, &TypeRegistry::with_builtins(), 2);

        assert_eq!(stats.normal.live_objects, 1);
        // one unmarked slot and the tail chunk
        assert_eq!(stats.normal.dead_objects, 2);
        assert!(stats.normal.is_consistent());
        assert_eq!(
            stats.object_stats(TypeTag::STRING),
            ObjectStats { count: 1, bytes: 32 }
        );
        assert!(stats.to_string().contains("String"));
    }
}
