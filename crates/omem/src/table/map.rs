//! Identity-keyed map table
//!
//! A [`MapTable`] owns exactly one [`MapBucket`] through a heap reference.
//! The bucket is a fixed-capacity linear-probing table; when a `put` finds
//! it full, a bucket of double capacity is allocated, the old entries are
//! merged in, and the table switches to it. The old bucket becomes garbage.
//!
//! Keys are compared by identity and hashed with
//! [`ObjectRef::identity_hash`]. Keys are strong: a key stays alive as long
//! as the table does.

use crate::envelope::image::{RecordReader, RecordWriter, REF_SIZE};
use crate::error::{MemoryError, Result};
use crate::marker::{GeneralMarker, MarkReason, Marker};
use crate::memory::Memory;
use crate::object::{impl_as_any, HeapObject, ObjectRef, TypeTag};

/// Serialized size of one entry: key reference plus value
const ENTRY_SIZE: usize = REF_SIZE + 8;

/// Outcome of probing for a key
enum Probe {
    Found(usize),
    Vacant(usize),
    Full,
}

// ============================================================================
// BUCKET
// ============================================================================

/// Fixed-capacity open-addressed entry array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapBucket {
    entries: Vec<Option<(ObjectRef, i64)>>,
    len: usize,
}

impl MapBucket {
    /// Empty bucket; `capacity` is rounded up to a power of two
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity.max(1).next_power_of_two()],
            len: 0,
        }
    }

    /// Total entry slots
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.capacity() - 1
    }

    #[inline]
    fn home(&self, key: ObjectRef) -> usize {
        (key.identity_hash() as usize) & self.mask()
    }

    fn probe(&self, key: ObjectRef) -> Probe {
        let mask = self.mask();
        let mut index = self.home(key);
        for _ in 0..self.capacity() {
            match self.entries[index] {
                Some((k, _)) if k == key => return Probe::Found(index),
                Some(_) => index = (index + 1) & mask,
                None => return Probe::Vacant(index),
            }
        }
        Probe::Full
    }

    pub fn get(&self, key: ObjectRef) -> Option<i64> {
        match self.probe(key) {
            Probe::Found(index) => self.entries[index].map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn contains(&self, key: ObjectRef) -> bool {
        matches!(self.probe(key), Probe::Found(_))
    }

    /// Insert or overwrite
    ///
    /// # Returns
    /// `false` if the key is absent and the bucket is full
    pub fn put(&mut self, key: ObjectRef, value: i64) -> bool {
        match self.probe(key) {
            Probe::Found(index) => {
                self.entries[index] = Some((key, value));
                true
            },
            Probe::Vacant(index) => {
                self.entries[index] = Some((key, value));
                self.len += 1;
                true
            },
            Probe::Full => false,
        }
    }

    /// Add one to the value of `key`, inserting 1 if absent
    ///
    /// # Returns
    /// The new value, or `None` if the key is absent and the bucket is full
    pub fn increment(&mut self, key: ObjectRef) -> Option<i64> {
        match self.probe(key) {
            Probe::Found(index) => {
                let entry = self.entries[index].as_mut()?;
                entry.1 = entry.1.wrapping_add(1);
                Some(entry.1)
            },
            Probe::Vacant(index) => {
                self.entries[index] = Some((key, 1));
                self.len += 1;
                Some(1)
            },
            Probe::Full => None,
        }
    }

    /// Remove `key` with backward-shift deletion
    pub fn remove(&mut self, key: ObjectRef) -> Option<i64> {
        let Probe::Found(mut hole) = self.probe(key) else {
            return None;
        };
        let removed = self.entries[hole].take().map(|(_, v)| v);
        self.len -= 1;

        let mask = self.mask();
        let mut next = (hole + 1) & mask;
        while let Some((k, _)) = self.entries[next] {
            let home = self.home(k);
            // Move back unless home lies cyclically in (hole, next].
            if (next.wrapping_sub(home) & mask) >= (next.wrapping_sub(hole) & mask) {
                self.entries[hole] = self.entries[next].take();
                hole = next;
            }
            next = (next + 1) & mask;
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectRef, i64)> + '_ {
        self.entries.iter().flatten().copied()
    }

    /// Bucket of double capacity holding every entry of this one
    pub fn grown(&self) -> Self {
        let mut capacity = self.capacity() * 2;
        loop {
            let mut bucket = MapBucket::with_capacity(capacity);
            if self.iter().all(|(k, v)| bucket.put(k, v)) {
                return bucket;
            }
            capacity *= 2;
        }
    }

    pub(crate) fn restore(reader: &mut RecordReader<'_>) -> Result<Box<dyn HeapObject>> {
        let at = reader.offset();
        let capacity = reader.read_u32()? as usize;
        let count = reader.read_count(ENTRY_SIZE)?;
        if !capacity.is_power_of_two() || count > capacity {
            return Err(MemoryError::corrupt(
                at,
                format!("bucket of {} entries with capacity {}", count, capacity),
            ));
        }

        let mut bucket = MapBucket::with_capacity(capacity);
        for _ in 0..count {
            let at = reader.offset();
            let key = reader
                .read_ref()?
                .ok_or_else(|| MemoryError::corrupt(at, "null map key"))?;
            let value = reader.read_i64()?;
            if bucket.contains(key) || !bucket.put(key, value) {
                return Err(MemoryError::corrupt(at, "duplicate map key"));
            }
        }
        Ok(Box::new(bucket))
    }
}

impl HeapObject for MapBucket {
    fn type_tag(&self) -> TypeTag {
        TypeTag::MAP_BUCKET
    }

    fn type_name(&self) -> &'static str {
        "MapBucket"
    }

    fn data_size(&self) -> usize {
        8 + self.capacity() * ENTRY_SIZE
    }

    fn live(&self, marker: &mut Marker) {
        for (key, _) in self.iter() {
            marker.mark(key);
        }
    }

    fn live_general(&self, _reason: MarkReason, marker: &mut GeneralMarker) {
        for (key, _) in self.iter() {
            marker.visit(key);
        }
    }

    fn flatten(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.write_len(self.capacity())?;
        writer.write_len(self.len)?;
        for (key, value) in self.iter() {
            writer.write_ref(Some(key));
            writer.write_i64(value);
        }
        Ok(())
    }

    impl_as_any!();
}

// ============================================================================
// TABLE
// ============================================================================

/// Map table owning one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapTable {
    bucket: ObjectRef,
}

impl MapTable {
    pub fn bucket(&self) -> ObjectRef {
        self.bucket
    }

    pub(crate) fn restore(reader: &mut RecordReader<'_>) -> Result<Box<dyn HeapObject>> {
        let at = reader.offset();
        let bucket = reader
            .read_ref()?
            .ok_or_else(|| MemoryError::corrupt(at, "map table without bucket"))?;
        Ok(Box::new(MapTable { bucket }))
    }
}

impl HeapObject for MapTable {
    fn type_tag(&self) -> TypeTag {
        TypeTag::MAP_TABLE
    }

    fn type_name(&self) -> &'static str {
        "MapTable"
    }

    fn data_size(&self) -> usize {
        REF_SIZE
    }

    fn live(&self, marker: &mut Marker) {
        marker.mark(self.bucket);
    }

    fn live_general(&self, _reason: MarkReason, marker: &mut GeneralMarker) {
        marker.visit(self.bucket);
    }

    fn flatten(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.write_ref(Some(self.bucket));
        Ok(())
    }

    impl_as_any!();
}

// ============================================================================
// MEMORY OPERATIONS
// ============================================================================

impl Memory {
    /// New empty map table with the configured initial capacity
    pub fn new_map_table(&mut self) -> Result<ObjectRef> {
        let capacity = self.config().map_table_capacity;
        self.new_map_table_with_capacity(capacity)
    }

    pub fn new_map_table_with_capacity(&mut self, capacity: usize) -> Result<ObjectRef> {
        let bucket = self.allocate(Box::new(MapBucket::with_capacity(capacity)))?;
        self.with_held(&[bucket], |memory| {
            memory.allocate(Box::new(MapTable { bucket }))
        })
    }

    fn map_bucket(&self, table: ObjectRef) -> Result<&MapBucket> {
        let bucket = self.get::<MapTable>(table)?.bucket;
        self.get::<MapBucket>(bucket)
    }

    fn map_bucket_mut(&mut self, table: ObjectRef) -> Result<&mut MapBucket> {
        let bucket = self.get::<MapTable>(table)?.bucket;
        self.get_mut::<MapBucket>(bucket)
    }

    /// Replace the bucket of `table` with one of double capacity
    ///
    /// `key` is held across the allocation along with the table.
    fn grow_map(&mut self, table: ObjectRef, key: ObjectRef) -> Result<()> {
        let grown = self.map_bucket(table)?.grown();
        log::trace!(
            "map table {} grows to {} entries",
            table,
            grown.capacity()
        );

        let bucket = self.with_held(&[table, key], |memory| {
            memory.allocate(Box::new(grown))
        })?;
        self.get_mut::<MapTable>(table)?.bucket = bucket;
        Ok(())
    }

    /// Insert or overwrite `key -> value`, growing the bucket as needed
    pub fn map_put(&mut self, table: ObjectRef, value: i64, key: ObjectRef) -> Result<()> {
        if !self.contains(key) {
            return Err(MemoryError::InvalidReference(key));
        }
        loop {
            if self.map_bucket_mut(table)?.put(key, value) {
                return Ok(());
            }
            self.grow_map(table, key)?;
        }
    }

    /// Add one to the value of `key`, inserting 1 if absent
    pub fn map_increment(&mut self, table: ObjectRef, key: ObjectRef) -> Result<i64> {
        if !self.contains(key) {
            return Err(MemoryError::InvalidReference(key));
        }
        loop {
            if let Some(value) = self.map_bucket_mut(table)?.increment(key) {
                return Ok(value);
            }
            self.grow_map(table, key)?;
        }
    }

    pub fn map_get(&self, table: ObjectRef, key: ObjectRef) -> Result<Option<i64>> {
        Ok(self.map_bucket(table)?.get(key))
    }

    pub fn map_contains(&self, table: ObjectRef, key: ObjectRef) -> Result<bool> {
        Ok(self.map_bucket(table)?.contains(key))
    }

    pub fn map_remove(&mut self, table: ObjectRef, key: ObjectRef) -> Result<Option<i64>> {
        Ok(self.map_bucket_mut(table)?.remove(key))
    }

    pub fn map_len(&self, table: ObjectRef) -> Result<usize> {
        Ok(self.map_bucket(table)?.len())
    }

    pub fn map_capacity(&self, table: ObjectRef) -> Result<usize> {
        Ok(self.map_bucket(table)?.capacity())
    }

    /// Snapshot of every entry, in bucket order
    pub fn map_entries(&self, table: ObjectRef) -> Result<Vec<(ObjectRef, i64)>> {
        Ok(self.map_bucket(table)?.iter().collect())
    }

    /// Deep copy of the table and its bucket; keys are shared
    pub fn map_copy(&mut self, table: ObjectRef) -> Result<ObjectRef> {
        let bucket = self.map_bucket(table)?.clone();
        self.with_held(&[table], |memory| {
            let bucket = memory.allocate(Box::new(bucket))?;
            memory.with_held(&[bucket], |memory| {
                memory.allocate(Box::new(MapTable { bucket }))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::object::{SegmentId, SlotId};

    fn key(n: usize) -> ObjectRef {
        ObjectRef::new(SegmentId(0), SlotId(n as u32))
    }

    #[test]
    fn test_put_fails_only_when_full() {
        let mut bucket = MapBucket::with_capacity(4);
        for n in 0..4 {
            assert!(bucket.put(key(n), n as i64));
        }
        assert!(bucket.is_full());
        assert!(bucket.put(key(2), 20));
        assert!(!bucket.put(key(9), 9));
        assert_eq!(bucket.get(key(2)), Some(20));
    }

    #[test]
    fn test_increment_inserts_one() {
        let mut bucket = MapBucket::with_capacity(2);
        assert_eq!(bucket.increment(key(1)), Some(1));
        assert_eq!(bucket.increment(key(1)), Some(2));
        assert_eq!(bucket.increment(key(2)), Some(1));
        assert_eq!(bucket.increment(key(3)), None);
    }

    #[test]
    fn test_remove_keeps_probe_chains() {
        let mut bucket = MapBucket::with_capacity(8);
        for n in 0..8 {
            bucket.put(key(n), n as i64);
        }
        for n in (0..8).step_by(2) {
            assert_eq!(bucket.remove(key(n)), Some(n as i64));
        }

        assert_eq!(bucket.len(), 4);
        for n in 0..8 {
            let expected = (n % 2 == 1).then_some(n as i64);
            assert_eq!(bucket.get(key(n)), expected);
        }
        assert_eq!(bucket.remove(key(0)), None);
    }

    #[test]
    fn test_grown_doubles_and_keeps_entries() {
        let mut bucket = MapBucket::with_capacity(4);
        for n in 0..4 {
            bucket.put(key(n), -(n as i64));
        }
        let grown = bucket.grown();

        assert_eq!(grown.capacity(), 8);
        assert_eq!(grown.len(), 4);
        for n in 0..4 {
            assert_eq!(grown.get(key(n)), Some(-(n as i64)));
        }
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        assert_eq!(MapBucket::with_capacity(0).capacity(), 1);
        assert_eq!(MapBucket::with_capacity(5).capacity(), 8);
    }

    #[test]
    fn test_stale_key_is_rejected() {
        let mut memory = Memory::new(MemoryConfig::default()).unwrap();
        let table = memory.new_map_table().unwrap();
        memory.hold(table);
        let stale = memory.allocate_string("gone").unwrap();
        memory.gc().unwrap();

        assert!(matches!(
            memory.map_put(table, 1, stale),
            Err(MemoryError::InvalidReference(r)) if r == stale
        ));
        assert!(matches!(
            memory.map_increment(table, stale),
            Err(MemoryError::InvalidReference(_))
        ));
        assert_eq!(memory.map_len(table).unwrap(), 0);
    }
}
