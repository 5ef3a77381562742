//! Table Module - collection types built on the heap
//!
//! - [`map`] - identity-keyed `ObjectRef -> i64` table over an
//!   open-addressed bucket that is replaced, never resized, on growth
//! - [`list`] - ordered entry arrays, standalone or embedded in a list
//!   companion object
//!
//! Both are ordinary heap objects: they report their references through the
//! liveness protocol and flatten like any other object. The operations that
//! allocate live on [`Memory`](crate::Memory), since growth may collect.

pub mod list;
pub mod map;

pub use list::{ListObject, ListTable};
pub use map::{MapBucket, MapTable};
