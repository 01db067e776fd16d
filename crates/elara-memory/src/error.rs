//! Error types for the memory crate.

use thiserror::Error;

/// Errors that can occur in the memory crate.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Database operation failed. Fatal to the triggering operation.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Index snapshot file I/O failed. Same severity as [`Self::Storage`].
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted index snapshot is unreadable or inconsistent.
    ///
    /// Handled internally by a full rebuild from the relational store; only
    /// surfaces if the rebuild itself fails.
    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    /// The embedding provider failed or returned an invalid vector.
    #[error("embedding error: {0}")]
    Encoding(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid data or state.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
