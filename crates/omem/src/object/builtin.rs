//! Built-in leaf and container objects
//!
//! - [`StringObject`] - immutable UTF-8 text, owns nothing
//! - [`ArrayObject`] - fixed-length slots of optional references
//! - [`BufferObject`] - zeroed byte storage for numeric temporaries

use super::{impl_as_any, HeapObject, ObjectRef, TypeTag};
use crate::envelope::image::{RecordReader, RecordWriter, REF_SIZE};
use crate::error::{MemoryError, Result};
use crate::marker::{GeneralMarker, MarkReason, Marker};

// ============================================================================
// STRING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringObject {
    value: String,
}

impl StringObject {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub(crate) fn restore(reader: &mut RecordReader<'_>) -> Result<Box<dyn HeapObject>> {
        Ok(Box::new(StringObject::new(reader.read_str()?)))
    }
}

impl HeapObject for StringObject {
    fn type_tag(&self) -> TypeTag {
        TypeTag::STRING
    }

    fn type_name(&self) -> &'static str {
        "String"
    }

    fn data_size(&self) -> usize {
        self.value.len()
    }

    fn live(&self, _marker: &mut Marker) {}

    fn live_general(&self, _reason: MarkReason, _marker: &mut GeneralMarker) {}

    fn flatten(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.write_str(&self.value)
    }

    impl_as_any!();
}

// ============================================================================
// ARRAY
// ============================================================================

/// Fixed-length array of references; fresh elements are null
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayObject {
    elements: Vec<Option<ObjectRef>>,
}

impl ArrayObject {
    /// Array of `len` null elements
    pub fn with_len(len: usize) -> Self {
        Self {
            elements: vec![None; len],
        }
    }

    pub fn from_refs(refs: impl IntoIterator<Item = ObjectRef>) -> Self {
        Self {
            elements: refs.into_iter().map(Some).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Option<ObjectRef>> {
        self.elements
            .get(index)
            .copied()
            .ok_or(MemoryError::BoundsCheckFailed {
                index,
                length: self.elements.len(),
            })
    }

    pub fn set(&mut self, index: usize, value: Option<ObjectRef>) -> Result<()> {
        let length = self.elements.len();
        let slot = self
            .elements
            .get_mut(index)
            .ok_or(MemoryError::BoundsCheckFailed { index, length })?;
        *slot = value;
        Ok(())
    }

    pub fn elements(&self) -> &[Option<ObjectRef>] {
        &self.elements
    }

    pub(crate) fn restore(reader: &mut RecordReader<'_>) -> Result<Box<dyn HeapObject>> {
        let len = reader.read_count(REF_SIZE)?;
        let mut elements = Vec::with_capacity(len);
        for _ in 0..len {
            elements.push(reader.read_ref()?);
        }
        Ok(Box::new(ArrayObject { elements }))
    }
}

impl HeapObject for ArrayObject {
    fn type_tag(&self) -> TypeTag {
        TypeTag::ARRAY
    }

    fn type_name(&self) -> &'static str {
        "Array"
    }

    fn data_size(&self) -> usize {
        self.elements.len() * REF_SIZE
    }

    fn live(&self, marker: &mut Marker) {
        for element in self.elements.iter().flatten() {
            marker.mark(*element);
        }
    }

    fn live_general(&self, _reason: MarkReason, marker: &mut GeneralMarker) {
        for element in self.elements.iter().flatten() {
            marker.visit(*element);
        }
    }

    fn flatten(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.write_len(self.elements.len())?;
        for element in &self.elements {
            writer.write_ref(*element);
        }
        Ok(())
    }

    impl_as_any!();
}

// ============================================================================
// BUFFER
// ============================================================================

/// Zero-initialized byte storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferObject {
    bytes: Vec<u8>,
}

impl BufferObject {
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub(crate) fn restore(reader: &mut RecordReader<'_>) -> Result<Box<dyn HeapObject>> {
        Ok(Box::new(BufferObject {
            bytes: reader.read_bytes()?,
        }))
    }
}

impl HeapObject for BufferObject {
    fn type_tag(&self) -> TypeTag {
        TypeTag::BUFFER
    }

    fn type_name(&self) -> &'static str {
        "Buffer"
    }

    fn data_size(&self) -> usize {
        self.bytes.len()
    }

    fn live(&self, _marker: &mut Marker) {}

    fn live_general(&self, _reason: MarkReason, _marker: &mut GeneralMarker) {}

    fn flatten(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.write_bytes(&self.bytes)
    }

    impl_as_any!();
}
