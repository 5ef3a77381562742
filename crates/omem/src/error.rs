//! Error Module - omem Error Types
//!
//! Defines all error types used by the object memory.
//!
//! # Error Categories
//!
//! ## Fatal
//! - `OutOfMemory` - no segment could be obtained; the owning interpreter
//!   instance cannot continue
//!
//! ## Image Load Failures
//! - `CorruptImage` / `TruncatedImage` / `UnknownType` - a saved image could
//!   not be reconstituted; the caller rebuilds its base environment instead
//!
//! ## Handle Misuse
//! - `InvalidReference` - handle to a slot that holds no object
//! - `TypeMismatch` - object exists but is not the type the caller asked for
//!
//! Table growth is never an error: a full bucket is replaced transparently.

use thiserror::Error;

use crate::config::ConfigError;
use crate::object::{ObjectRef, TypeTag};

/// Main error type for all omem operations
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Out of memory - no new segment could be obtained
    ///
    /// **When returned:** allocation could not be satisfied after collection
    /// and the heap is already at `max_heap_size`
    ///
    /// **Recovery strategy:** none; terminate the owning instance
    #[error("Out of memory: requested {requested} bytes, heap limit {limit} bytes")]
    OutOfMemory { requested: usize, limit: usize },

    /// Saved image is structurally invalid
    ///
    /// **When returned:** bad magic/version, an offset that does not name a
    /// record, a payload that does not decode to its declared type
    ///
    /// **Recovery strategy:** rebuild the environment from source
    #[error("Corrupt image at offset {offset}: {reason}")]
    CorruptImage { offset: usize, reason: String },

    /// Saved image ends before the data it declares
    #[error("Truncated image: needed {needed} bytes at offset {offset}, image has {length}")]
    TruncatedImage {
        offset: usize,
        needed: usize,
        length: usize,
    },

    /// Type identifier has no registered restore function
    #[error("Unknown object type {0}")]
    UnknownType(TypeTag),

    /// Handle does not name a live slot
    #[error("Invalid object reference {0}")]
    InvalidReference(ObjectRef),

    /// Object is not of the requested type
    #[error("Type mismatch for {reference}: expected {expected}, found {found}")]
    TypeMismatch {
        reference: ObjectRef,
        expected: &'static str,
        found: &'static str,
    },

    /// Operation attempted in the wrong collector state
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Index outside a fixed-size object
    #[error("Bounds check failed: index {index} out of bounds for length {length}")]
    BoundsCheckFailed { index: usize, length: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// I/O error while reading or writing an image file
    #[error("Image I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Check if this error must terminate the owning instance
    pub fn is_fatal(&self) -> bool {
        matches!(self, MemoryError::OutOfMemory { .. })
    }

    /// Check if this error is an image load failure (caller falls back to
    /// rebuilding from source)
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            MemoryError::CorruptImage { .. }
                | MemoryError::TruncatedImage { .. }
                | MemoryError::UnknownType(_)
                | MemoryError::Io(_)
        )
    }

    /// Shorthand for a corrupt-image error
    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        MemoryError::CorruptImage {
            offset,
            reason: reason.into(),
        }
    }
}

/// Result type alias for omem operations
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_out_of_memory_is_fatal() {
        let oom = MemoryError::OutOfMemory {
            requested: 64,
            limit: 1024,
        };
        assert!(oom.is_fatal());
        assert!(!oom.is_load_failure());

        let corrupt = MemoryError::corrupt(12, "bad magic");
        assert!(!corrupt.is_fatal());
        assert!(corrupt.is_load_failure());
    }

    #[test]
    fn test_error_messages() {
        let err = MemoryError::TruncatedImage {
            offset: 40,
            needed: 8,
            length: 44,
        };
        assert_eq!(
            err.to_string(),
            "Truncated image: needed 8 bytes at offset 40, image has 44"
        );
    }
}
