//! Object Header - Metadata for heap objects
//!
//! Object Header Layout (24 bytes, accounted in every slot):
//! ┌─────────────────────────────────────────┐
//! │         Mark Word (8 bytes)             │  <- epoch of last marking
//! ├─────────────────────────────────────────┤
//! │         Type Tag (8 bytes)              │  <- TypeTag, padded
//! ├─────────────────────────────────────────┤
//! │         Size (8 bytes)                  │  <- slot size incl. header
//! └─────────────────────────────────────────┘
//!
//! An object is live iff its mark word equals the collector's current
//! epoch. Advancing the epoch un-marks every object at once, so no clear
//! pass is needed between cycles.

use super::TypeTag;

/// Size of object header in bytes
pub const HEADER_SIZE: usize = 24;

/// Every slot size is a multiple of this
pub const OBJECT_GRAIN: usize = 8;

/// Smallest slot the allocator carves; smaller remainders are absorbed
pub const MIN_OBJECT_SIZE: usize = 32;

/// Object Header
///
/// Written once at allocation, stamped with the epoch current at that time.
/// Only the collector changes the mark word afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    mark_word: u64,
    type_tag: TypeTag,
    size: usize,
}

impl ObjectHeader {
    /// Create new object header
    ///
    /// # Arguments
    /// * `type_tag` - Type of the object stored in the slot
    /// * `size` - Total slot size including header
    /// * `epoch` - Current collector epoch
    pub fn new(type_tag: TypeTag, size: usize, epoch: u64) -> Self {
        Self {
            mark_word: epoch,
            type_tag,
            size,
        }
    }

    #[inline]
    pub fn mark_word(&self) -> u64 {
        self.mark_word
    }

    #[inline]
    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Check whether the object carries the given epoch
    #[inline]
    pub fn is_live(&self, epoch: u64) -> bool {
        self.mark_word == epoch
    }

    /// Stamp the mark word with `epoch`
    ///
    /// Returns `false` if it already carried that epoch, which is what
    /// terminates marking on cycles.
    #[inline]
    pub fn mark(&mut self, epoch: u64) -> bool {
        if self.mark_word == epoch {
            return false;
        }
        self.mark_word = epoch;
        true
    }

    /// Grow the recorded size when the allocator absorbs a remainder
    pub(crate) fn absorb(&mut self, span: usize) {
        debug_assert!(span >= self.size);
        self.size = span;
    }
}

/// Round `value` up to a multiple of `align` (power of two)
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Slot size for an object whose payload is `data_size` bytes
///
/// # Examples
///
/// ```
/// use omem::object::header::{allocation_size, MIN_OBJECT_SIZE};
///
/// assert_eq!(allocation_size(0), MIN_OBJECT_SIZE);
/// assert_eq!(allocation_size(13), 40);
/// ```
#[inline]
pub const fn allocation_size(data_size: usize) -> usize {
    let size = align_up(HEADER_SIZE + data_size, OBJECT_GRAIN);
    if size < MIN_OBJECT_SIZE {
        MIN_OBJECT_SIZE
    } else {
        size
    }
}
