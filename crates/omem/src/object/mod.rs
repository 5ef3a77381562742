//! Object Module - heap object model
//!
//! Every runtime value lives in a heap slot as a `Box<dyn HeapObject>`
//! next to its [`ObjectHeader`]. Callers hold [`ObjectRef`] handles, which
//! stay valid across collections for as long as the object is reachable.
//!
//! The [`HeapObject`] trait is the liveness protocol: `live` reports every
//! directly owned object to the collector, `live_general` reports the same
//! edges for other traversals, and `flatten` writes the object into an image
//! record, visiting exactly those edges again.

pub mod builtin;
pub mod header;
pub mod types;

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};

use omem_util::define_idx;
use rustc_hash::FxHasher;
use serde::Serialize;

use crate::envelope::image::RecordWriter;
use crate::error::Result;
use crate::marker::{GeneralMarker, MarkReason, Marker};

pub use builtin::{ArrayObject, BufferObject, StringObject};
pub use header::{ObjectHeader, HEADER_SIZE, MIN_OBJECT_SIZE, OBJECT_GRAIN};
pub use types::{RestoreFn, TypeInfo, TypeRegistry};

define_idx!(
    /// Index of a segment in the heap
    SegmentId
);
define_idx!(
    /// Index of a slot inside one segment
    SlotId
);

/// Handle to a heap object
///
/// Identity of an object is the identity of its handle: two handles are the
/// same object iff they compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    segment: SegmentId,
    slot: SlotId,
}

impl ObjectRef {
    pub(crate) fn new(segment: SegmentId, slot: SlotId) -> Self {
        Self { segment, slot }
    }

    #[inline]
    pub fn segment(self) -> SegmentId {
        self.segment
    }

    #[inline]
    pub fn slot(self) -> SlotId {
        self.slot
    }

    /// Hash of the object's identity, used by identity-keyed tables
    pub fn identity_hash(self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.segment.0, self.slot.0)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Type identifier stored in every object header and image record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TypeTag(pub u16);

impl TypeTag {
    pub const STRING: TypeTag = TypeTag(1);
    pub const ARRAY: TypeTag = TypeTag(2);
    pub const BUFFER: TypeTag = TypeTag(3);
    pub const MAP_BUCKET: TypeTag = TypeTag(4);
    pub const MAP_TABLE: TypeTag = TypeTag(5);
    pub const LIST_TABLE: TypeTag = TypeTag(6);
    pub const LIST: TypeTag = TypeTag(7);

    /// First tag available to runtime-defined types
    pub const FIRST_USER: TypeTag = TypeTag(256);
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Liveness and flatten protocol implemented by every heap object
///
/// Implementations must report the same set of edges from `live`,
/// `live_general` and `flatten`; the collector, the census and the image
/// writer all rely on it.
pub trait HeapObject: Any + fmt::Debug + Send {
    /// Type tag written into the header and image records
    fn type_tag(&self) -> TypeTag;

    /// Name used in diagnostics and type mismatch errors
    fn type_name(&self) -> &'static str;

    /// Payload size in bytes, excluding the header
    fn data_size(&self) -> usize;

    /// Report every directly owned object to the collector
    fn live(&self, marker: &mut Marker);

    /// Report every directly owned object for a non-collecting traversal
    fn live_general(&self, reason: MarkReason, marker: &mut GeneralMarker);

    /// Write the payload of this object's image record
    fn flatten(&self, writer: &mut RecordWriter) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Implements the `as_any` pair for a concrete heap object type
macro_rules! impl_as_any {
    () => {
        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }
    };
}
pub(crate) use impl_as_any;
