//! IndexVec / IndexSlab - arenas with typed indices
//!
//! ============================================================================
//! TYPED INDEX PATTERN
//! ============================================================================
//!
//! The heap has two index spaces: segments, and slots inside a segment.
//! Using raw `usize` for both is error-prone, so each space gets a newtype
//! index (see [`define_idx!`]) and the arena only accepts its own index type:
//!
//! ```rust,ignore
//! define_idx!(SegmentId);
//! define_idx!(SlotId);
//!
//! let segments: IndexSlab<SegmentId, Segment> = IndexSlab::new();
//! segments.get(slot_id); // compile error: expected SegmentId
//! ```
//!
//! ============================================================================
//! SLAB RECYCLING
//! ============================================================================
//!
//! Objects die and segments are released, so positions become vacant. An
//! [`IndexSlab`] keeps a free list of vacated positions and hands them out
//! again on the next insert. Live entries never move, which is what keeps a
//! heap handle stable across collections.
//!
//! ```text
//! insert a  insert b  insert c  remove b  insert d
//! [a]       [a b]     [a b c]   [a _ c]   [a d c]   (d reuses index 1)
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use crate::error::{IndexError, IndexResult};

/// Trait for types usable as typed indices
///
/// Implementations must round-trip: `I::from_usize(i).index() == i`.
pub trait Idx: Copy + 'static + Eq + fmt::Debug {
    /// Create an index from a raw position
    fn from_usize(idx: usize) -> Self;

    /// Raw position of this index
    fn index(self) -> usize;
}

/// A vector indexed by `I` instead of `usize`
#[derive(Clone)]
pub struct IndexVec<I, T> {
    raw: Vec<T>,
    _marker: PhantomData<fn(&I)>,
}

impl<I, T> IndexVec<I, T> {
    #[inline]
    pub fn new() -> Self {
        Self {
            raw: Vec::new(),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: Vec::with_capacity(capacity),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.raw.clear()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.raw
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.raw.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.raw.iter_mut()
    }
}

impl<I: Idx, T> IndexVec<I, T> {
    /// Append a value, returning its index
    #[inline]
    pub fn push(&mut self, value: T) -> I {
        let index = self.raw.len();
        self.raw.push(value);
        I::from_usize(index)
    }

    /// Remove the last value together with its index
    #[inline]
    pub fn pop(&mut self) -> Option<(I, T)> {
        self.raw.pop().map(|v| (I::from_usize(self.raw.len()), v))
    }

    #[inline]
    pub fn get(&self, index: I) -> Option<&T> {
        self.raw.get(index.index())
    }

    #[inline]
    pub fn get_mut(&mut self, index: I) -> Option<&mut T> {
        self.raw.get_mut(index.index())
    }

    /// Checked access that reports the offending index
    pub fn try_get(&self, index: I) -> IndexResult<&T> {
        let length = self.raw.len();
        self.raw.get(index.index()).ok_or(IndexError::OutOfBounds {
            index: index.index(),
            length,
        })
    }

    /// Index that the next `push` will return
    #[inline]
    pub fn next_index(&self) -> I {
        I::from_usize(self.raw.len())
    }

    #[inline]
    pub fn iter_enumerated(&self) -> impl Iterator<Item = (I, &T)> {
        self.raw
            .iter()
            .enumerate()
            .map(|(i, v)| (I::from_usize(i), v))
    }

    #[inline]
    pub fn iter_enumerated_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.raw
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (I::from_usize(i), v))
    }

    #[inline]
    pub fn indices(&self) -> impl Iterator<Item = I> {
        (0..self.raw.len()).map(I::from_usize)
    }
}

impl<I: Idx, T> Index<I> for IndexVec<I, T> {
    type Output = T;

    #[inline]
    fn index(&self, index: I) -> &T {
        &self.raw[index.index()]
    }
}

impl<I: Idx, T> IndexMut<I> for IndexVec<I, T> {
    #[inline]
    fn index_mut(&mut self, index: I) -> &mut T {
        &mut self.raw[index.index()]
    }
}

impl<I, T> Default for IndexVec<I, T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<I, T: fmt::Debug> fmt::Debug for IndexVec<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.raw.iter()).finish()
    }
}

/// An [`IndexVec`] of optional entries with a free list of vacated indices
///
/// `insert` prefers the most recently vacated index; `remove` vacates.
/// Indices of live entries never change.
#[derive(Clone)]
pub struct IndexSlab<I, T> {
    entries: IndexVec<I, Option<T>>,
    vacant: Vec<I>,
    len: usize,
}

impl<I: Idx, T> IndexSlab<I, T> {
    pub fn new() -> Self {
        Self {
            entries: IndexVec::new(),
            vacant: Vec::new(),
            len: 0,
        }
    }

    /// Number of occupied entries
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of positions ever created (occupied + vacant)
    #[inline]
    pub fn positions(&self) -> usize {
        self.entries.len()
    }

    /// Store a value, reusing a vacated index when one exists
    pub fn insert(&mut self, value: T) -> I {
        self.len += 1;
        match self.vacant.pop() {
            Some(index) => {
                self.entries[index] = Some(value);
                index
            }
            None => self.entries.push(Some(value)),
        }
    }

    /// Vacate an index, returning the value that occupied it
    pub fn remove(&mut self, index: I) -> Option<T> {
        let taken = self.entries.get_mut(index)?.take();
        if taken.is_some() {
            self.len -= 1;
            self.vacant.push(index);
        }
        taken
    }

    #[inline]
    pub fn contains(&self, index: I) -> bool {
        matches!(self.entries.get(index), Some(Some(_)))
    }

    #[inline]
    pub fn get(&self, index: I) -> Option<&T> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, index: I) -> Option<&mut T> {
        self.entries.get_mut(index).and_then(Option::as_mut)
    }

    /// Checked access distinguishing "never existed" from "vacated"
    pub fn try_get(&self, index: I) -> IndexResult<&T> {
        match self.entries.try_get(index)? {
            Some(value) => Ok(value),
            None => Err(IndexError::Vacant {
                index: index.index(),
            }),
        }
    }

    /// Iterate occupied entries in index order
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.entries
            .iter_enumerated()
            .filter_map(|(i, v)| v.as_ref().map(|v| (i, v)))
    }

    /// Iterate occupied entries mutably in index order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.entries
            .iter_enumerated_mut()
            .filter_map(|(i, v)| v.as_mut().map(|v| (i, v)))
    }

    /// Indices of occupied entries, collected so the slab may be mutated
    /// while walking them
    pub fn occupied(&self) -> Vec<I> {
        self.iter().map(|(i, _)| i).collect()
    }
}

impl<I: Idx, T> Default for IndexSlab<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Idx, T: fmt::Debug> fmt::Debug for IndexSlab<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Macro to define index types easily
///
/// Generates a `u32` newtype implementing [`Idx`].
///
/// ```
/// use omem_util::{define_idx, IndexVec};
///
/// define_idx!(ExprId);
///
/// let mut vec: IndexVec<ExprId, i32> = IndexVec::new();
/// let idx = vec.push(42);
/// assert_eq!(vec[idx], 42);
/// ```
#[macro_export]
macro_rules! define_idx {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $crate::index_vec::Idx for $name {
            fn from_usize(idx: usize) -> Self {
                assert!(idx <= u32::MAX as usize, "Index {} exceeds u32::MAX", idx);
                $name(idx as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}
