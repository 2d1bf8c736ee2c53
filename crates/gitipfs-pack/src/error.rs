//! Pack error types.

use thiserror::Error;

/// Errors that can occur while reading pack files and their indexes.
#[derive(Debug, Error)]
pub enum PackError {
    /// Invalid pack file format.
    #[error("invalid pack file: {0}")]
    InvalidPack(String),

    /// Invalid pack index format.
    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    /// Malformed delta instructions.
    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    /// Object is not listed in the index.
    #[error("object not found in pack: {0}")]
    ObjectNotFound(String),

    /// Delta chain is longer than the resolver accepts.
    #[error("delta chain exceeds {0} links")]
    ChainTooLong(usize),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] gitipfs_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
