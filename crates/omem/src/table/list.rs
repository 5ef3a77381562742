//! Ordered lists
//!
//! [`ListTable`] is a flat array of entries whose size is fixed when it is
//! built. It is either a heap object of its own or embedded in a
//! [`ListObject`], the companion that shares its allocation: the
//! companion's slot is its own fields plus exactly the table's bytes.
//!
//! A list starts embedded. When an append finds the table full, the entries
//! move to a standalone table of double size and the companion keeps a
//! reference to it.
//!
//! Tables flatten their entries last to first and restore them in the same
//! order, so a restored list reads first to last like the original.

use crate::envelope::image::{RecordReader, RecordWriter, REF_SIZE};
use crate::error::{MemoryError, Result};
use crate::marker::{GeneralMarker, MarkReason, Marker};
use crate::memory::Memory;
use crate::object::{impl_as_any, HeapObject, ObjectRef, TypeTag};

/// Companion fields: length and storage word
const COMPANION_SIZE: usize = 16;

/// Smallest standalone table a list grows into
const MIN_GROWN_SIZE: usize = 4;

const EMBEDDED: u8 = 0;
const EXPANDED: u8 = 1;

// ============================================================================
// TABLE
// ============================================================================

/// Fixed-size entry array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListTable {
    entries: Vec<Option<ObjectRef>>,
}

impl ListTable {
    /// Table of `size` null entries
    pub fn with_size(size: usize) -> Self {
        Self {
            entries: vec![None; size],
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> Result<Option<ObjectRef>> {
        self.entries
            .get(index)
            .copied()
            .ok_or(MemoryError::BoundsCheckFailed {
                index,
                length: self.entries.len(),
            })
    }

    pub fn put(&mut self, index: usize, value: Option<ObjectRef>) -> Result<()> {
        let length = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(MemoryError::BoundsCheckFailed { index, length })?;
        *entry = value;
        Ok(())
    }

    pub fn entries(&self) -> &[Option<ObjectRef>] {
        &self.entries
    }

    /// Table of `size` entries starting with the first `len` of this one
    fn resized(&self, len: usize, size: usize) -> Self {
        let mut entries = Vec::with_capacity(size);
        entries.extend_from_slice(&self.entries[..len.min(self.entries.len())]);
        entries.resize(size, None);
        Self { entries }
    }

    fn table_bytes(&self) -> usize {
        8 + self.entries.len() * REF_SIZE
    }

    fn mark_entries(&self, marker: &mut Marker) {
        for entry in self.entries.iter().flatten() {
            marker.mark(*entry);
        }
    }

    fn visit_entries(&self, marker: &mut GeneralMarker) {
        for entry in self.entries.iter().flatten() {
            marker.visit(*entry);
        }
    }

    fn write_entries(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.write_len(self.entries.len())?;
        for entry in self.entries.iter().rev() {
            writer.write_ref(*entry);
        }
        Ok(())
    }

    fn read_entries(reader: &mut RecordReader<'_>) -> Result<Self> {
        let size = reader.read_count(REF_SIZE)?;
        let mut table = ListTable::with_size(size);
        for index in (0..size).rev() {
            table.entries[index] = reader.read_ref()?;
        }
        Ok(table)
    }

    pub(crate) fn restore(reader: &mut RecordReader<'_>) -> Result<Box<dyn HeapObject>> {
        Ok(Box::new(Self::read_entries(reader)?))
    }
}

impl HeapObject for ListTable {
    fn type_tag(&self) -> TypeTag {
        TypeTag::LIST_TABLE
    }

    fn type_name(&self) -> &'static str {
        "ListTable"
    }

    fn data_size(&self) -> usize {
        self.table_bytes()
    }

    fn live(&self, marker: &mut Marker) {
        self.mark_entries(marker);
    }

    fn live_general(&self, _reason: MarkReason, marker: &mut GeneralMarker) {
        self.visit_entries(marker);
    }

    fn flatten(&self, writer: &mut RecordWriter) -> Result<()> {
        self.write_entries(writer)
    }

    impl_as_any!();
}

// ============================================================================
// COMPANION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum ListStorage {
    /// Table co-allocated with the companion
    Embedded(ListTable),
    /// Standalone table owned by reference
    Expanded(ObjectRef),
}

/// Ordered list of references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListObject {
    len: usize,
    storage: ListStorage,
}

impl ListObject {
    /// Empty list with an embedded table of `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            len: 0,
            storage: ListStorage::Embedded(ListTable::with_size(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.storage, ListStorage::Embedded(_))
    }

    /// Standalone table, once the list has outgrown its embedded one
    pub fn table(&self) -> Option<ObjectRef> {
        match self.storage {
            ListStorage::Embedded(_) => None,
            ListStorage::Expanded(table) => Some(table),
        }
    }

    pub(crate) fn restore(reader: &mut RecordReader<'_>) -> Result<Box<dyn HeapObject>> {
        let at = reader.offset();
        let len = reader.read_u32()? as usize;
        let storage = match reader.read_u8()? {
            EMBEDDED => {
                let table = ListTable::read_entries(reader)?;
                if len > table.size() {
                    return Err(MemoryError::corrupt(
                        at,
                        format!("list length {} exceeds table size {}", len, table.size()),
                    ));
                }
                ListStorage::Embedded(table)
            },
            EXPANDED => {
                let table = reader
                    .read_ref()?
                    .ok_or_else(|| MemoryError::corrupt(at, "expanded list without table"))?;
                ListStorage::Expanded(table)
            },
            other => {
                return Err(MemoryError::corrupt(
                    at,
                    format!("unknown list storage {}", other),
                ))
            },
        };
        Ok(Box::new(ListObject { len, storage }))
    }
}

impl HeapObject for ListObject {
    fn type_tag(&self) -> TypeTag {
        TypeTag::LIST
    }

    fn type_name(&self) -> &'static str {
        "List"
    }

    fn data_size(&self) -> usize {
        match &self.storage {
            ListStorage::Embedded(table) => COMPANION_SIZE + table.table_bytes(),
            ListStorage::Expanded(_) => COMPANION_SIZE,
        }
    }

    fn live(&self, marker: &mut Marker) {
        match &self.storage {
            ListStorage::Embedded(table) => table.mark_entries(marker),
            ListStorage::Expanded(table) => marker.mark(*table),
        }
    }

    fn live_general(&self, _reason: MarkReason, marker: &mut GeneralMarker) {
        match &self.storage {
            ListStorage::Embedded(table) => table.visit_entries(marker),
            ListStorage::Expanded(table) => marker.visit(*table),
        }
    }

    fn flatten(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.write_len(self.len)?;
        match &self.storage {
            ListStorage::Embedded(table) => {
                writer.write_u8(EMBEDDED);
                table.write_entries(writer)
            },
            ListStorage::Expanded(table) => {
                writer.write_u8(EXPANDED);
                writer.write_ref(Some(*table));
                Ok(())
            },
        }
    }

    impl_as_any!();
}

// ============================================================================
// MEMORY OPERATIONS
// ============================================================================

impl Memory {
    /// Standalone table of `size` null entries
    pub fn new_list_table(&mut self, size: usize) -> Result<ObjectRef> {
        self.allocate(Box::new(ListTable::with_size(size)))
    }

    pub fn list_table_put(
        &mut self,
        table: ObjectRef,
        index: usize,
        value: Option<ObjectRef>,
    ) -> Result<()> {
        self.get_mut::<ListTable>(table)?.put(index, value)
    }

    pub fn list_table_get(&self, table: ObjectRef, index: usize) -> Result<Option<ObjectRef>> {
        self.get::<ListTable>(table)?.get(index)
    }

    pub fn list_table_size(&self, table: ObjectRef) -> Result<usize> {
        Ok(self.get::<ListTable>(table)?.size())
    }

    /// Empty list with room for `capacity` embedded entries
    pub fn new_list(&mut self, capacity: usize) -> Result<ObjectRef> {
        self.allocate(Box::new(ListObject::with_capacity(capacity)))
    }

    /// Table currently holding the entries of `list`
    fn list_storage(&self, list: ObjectRef) -> Result<(usize, &ListTable)> {
        let object = self.get::<ListObject>(list)?;
        let table = match &object.storage {
            ListStorage::Embedded(table) => table,
            ListStorage::Expanded(table) => self.get::<ListTable>(*table)?,
        };
        Ok((object.len, table))
    }

    pub fn list_append(&mut self, list: ObjectRef, value: ObjectRef) -> Result<()> {
        if !self.contains(value) {
            return Err(MemoryError::InvalidReference(value));
        }
        let (len, table) = self.list_storage(list)?;
        if len == table.size() {
            let grown = table.resized(len, (len * 2).max(MIN_GROWN_SIZE));
            log::trace!("list {} moves to a table of {} entries", list, grown.size());

            let grown = self.with_held(&[list, value], |memory| {
                memory.allocate(Box::new(grown))
            })?;
            self.get_mut::<ListObject>(list)?.storage = ListStorage::Expanded(grown);
        }

        let object = self.get_mut::<ListObject>(list)?;
        let index = object.len;
        match &mut object.storage {
            ListStorage::Embedded(table) => table.put(index, Some(value))?,
            ListStorage::Expanded(table) => {
                let table = *table;
                self.get_mut::<ListTable>(table)?.put(index, Some(value))?
            },
        }
        self.get_mut::<ListObject>(list)?.len += 1;
        Ok(())
    }

    pub fn list_get(&self, list: ObjectRef, index: usize) -> Result<ObjectRef> {
        let (len, table) = self.list_storage(list)?;
        if index >= len {
            return Err(MemoryError::BoundsCheckFailed { index, length: len });
        }
        table
            .get(index)?
            .ok_or(MemoryError::BoundsCheckFailed { index, length: len })
    }

    pub fn list_len(&self, list: ObjectRef) -> Result<usize> {
        Ok(self.get::<ListObject>(list)?.len)
    }

    /// Entries of `list`, first to last
    pub fn list_items(&self, list: ObjectRef) -> Result<Vec<ObjectRef>> {
        let (len, table) = self.list_storage(list)?;
        let end = len.min(table.size());
        Ok(table.entries()[..end].iter().flatten().copied().collect())
    }

    /// New list holding the same entries in the same order
    pub fn list_copy(&mut self, list: ObjectRef) -> Result<ObjectRef> {
        let (len, table) = self.list_storage(list)?;
        let copy = ListObject {
            len,
            storage: ListStorage::Embedded(table.resized(len, len)),
        };
        self.with_held(&[list], |memory| memory.allocate(Box::new(copy)))
    }
}
