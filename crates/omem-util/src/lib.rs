//! omem-util - Foundation types for the omem object memory
//!
//! ============================================================================
//! MODULE OVERVIEW
//! ============================================================================
//!
//! The heap addresses every object through a stable handle instead of a raw
//! address. Handles are pairs of typed indices (segment, slot) into arenas
//! owned by the heap. This crate provides those arenas:
//!
//! - [`IndexVec`]: a growable vector indexed by a newtype index
//! - [`IndexSlab`]: an `IndexVec` whose vacated positions are recycled, so an
//!   index stays valid (and unique among live entries) until it is removed
//!
//! DESIGN PRINCIPLES:
//! ------------------
//! 1. TYPE SAFETY
//!    A `SlotId` can never be used to index the segment table and vice
//!    versa; mixing index spaces is a compile error.
//!
//! 2. ZERO-COST
//!    Indices are `u32` newtypes; indexing compiles down to a bounds-checked
//!    `Vec` access.

pub mod error;
pub mod index_vec;

pub use error::{IndexError, IndexResult};
pub use index_vec::{Idx, IndexSlab, IndexVec};
