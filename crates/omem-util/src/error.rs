//! Core error types for omem-util crate

use thiserror::Error;

/// Error type for typed-index arena operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// Index out of bounds
    #[error("Index out of bounds: index {index}, length {length}")]
    OutOfBounds { index: usize, length: usize },

    /// Index refers to a vacated slab entry
    #[error("Index {index} refers to a vacant entry")]
    Vacant { index: usize },
}

/// Result type alias for index operations
pub type IndexResult<T> = std::result::Result<T, IndexError>;
