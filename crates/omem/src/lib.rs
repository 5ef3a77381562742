//! # omem - Object Memory for a Dynamic Language Runtime
//!
//! omem is the object memory of a dynamically typed language runtime: a
//! segmented, garbage-collected heap that backs every runtime value, two
//! collection types built on it, a mark-sweep collector and a graph
//! serializer for saving and restoring runtime images.
//!
//! ## Overview
//!
//! - **Segmented Heap**: Segments carved first-fit into variably sized slots;
//!   objects above a threshold get a dedicated segment
//! - **Epoch Marking**: An object is live iff its mark word equals the
//!   current epoch, so advancing the epoch un-marks the whole heap at once
//! - **Liveness Protocol**: Every heap object reports what it owns through
//!   [`HeapObject::live`]; the collector never inspects object layout
//! - **Identity Tables**: [`MapTable`] maps objects to integers by identity;
//!   [`ListObject`] keeps an ordered list, embedded until it outgrows its
//!   allocation
//! - **Images**: [`Memory::flatten`] and [`Memory::unflatten`] turn a graph
//!   into position-independent bytes and back, sharing and cycles included
//!
//! ## Quick Start
//!
//! ```rust
//! use omem::{Memory, MemoryConfig, RootKind};
//!
//! fn main() -> Result<(), omem::MemoryError> {
//!     let mut memory = Memory::new(MemoryConfig::default())?;
//!
//!     // Allocate and root a table
//!     let counts = memory.new_map_table()?;
//!     memory.add_root(RootKind::Global, counts, Some("counts"));
//!
//!     let word = memory.allocate_string("hello")?;
//!     memory.map_increment(counts, word)?;
//!     memory.map_increment(counts, word)?;
//!     assert_eq!(memory.map_get(counts, word)?, Some(2));
//!
//!     // Keys are owned by the table, so both survive
//!     memory.gc()?;
//!     assert!(memory.contains(word));
//!
//!     // Round-trip the table through an image
//!     let image = memory.flatten(counts)?;
//!     let restored = memory.unflatten(&image)?;
//!     assert_eq!(memory.map_len(restored)?, 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Memory                            │
//! │                                                          │
//! │  allocate ──► Allocator ──no room──► Collector ──► Heap  │
//! │                  │                      │          │     │
//! │                  └──── new segment ─────┼──────────┘     │
//! │                                         │                │
//! │   RootSet ──────────── mark ────────────┘                │
//! │   TypeRegistry ◄──── unflatten          flatten          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Collection Cycle
//!
//! 1. Advance the epoch
//! 2. Mark from every root and held object, following `live` edges
//! 3. Sweep: free every slot whose mark word is stale, coalesce dead space
//! 4. Release empty segments (the startup segment is kept)
//!
//! ## Thread Safety
//!
//! - `Memory` is `Send`; one mutator per instance
//! - Instances are independent and may run on different threads
//! - Collection and image passes are stop-the-world for their instance
//!
//! ## Modules
//!
//! - [`allocator`]: First-fit and large-object slot reservation
//! - [`config`]: Configuration parameters and validation
//! - [`envelope`]: Image format, flatten and unflatten
//! - [`error`]: Error types for all omem operations
//! - [`gc`]: Collection cycle management
//! - [`heap`]: Segments, slots and dead chunks
//! - [`logging`]: Structured memory events
//! - [`marker`]: Marking and the root set
//! - [`memory`]: The memory instance and its allocation policy
//! - [`object`]: Object model, headers and the type registry
//! - [`stats`]: Cycle statistics and heap census
//! - [`table`]: Map and list tables

// Core modules
pub mod config;
pub mod error;
pub mod gc;
pub mod memory;

// Heap subsystems
pub mod allocator;
pub mod heap;
pub mod object;

// Collection components
pub mod marker;

// Client data structures and images
pub mod envelope;
pub mod table;

// Monitoring
pub mod logging;
pub mod stats;

// Re-export main types for convenience
pub use config::{ConfigError, MemoryConfig};
pub use error::{MemoryError, Result};
pub use gc::{CollectionReason, CollectorState};
pub use marker::{MarkReason, RootHandle, RootKind};
pub use memory::{CollectionGuard, Memory};
pub use object::{
    ArrayObject, BufferObject, HeapObject, ObjectRef, StringObject, TypeTag,
};
pub use stats::{CycleStats, MemoryStats};
pub use table::{ListObject, ListTable, MapBucket, MapTable};

/// omem version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a memory instance with the default configuration
///
/// # Examples
///
/// ```rust
/// let mut memory = omem::init()?;
/// let s = memory.allocate_string("x")?;
/// assert!(memory.contains(s));
/// # Ok::<(), omem::MemoryError>(())
/// ```
pub fn init() -> Result<Memory> {
    Memory::new(MemoryConfig::default())
}

/// Create a memory instance with configuration from the environment
///
/// Reads the `OMEM_*` variables over the defaults; see
/// [`MemoryConfig::from_env`].
pub fn init_from_env() -> Result<Memory> {
    Memory::new(MemoryConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_default() {
        assert!(init().is_ok());
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
