//! Storage error types.

use thiserror::Error;

/// Errors that can occur while reading or writing git objects and refs.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The object bytes do not follow the git object format.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// The object was not found.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The reference was not found.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// The reference file is malformed.
    #[error("invalid ref: {0}")]
    InvalidRef(String),

    /// zlib compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Stored content does not hash to the id it was stored under.
    #[error("corruption detected: expected {expected}, got {actual}")]
    Corruption {
        /// The id the content was requested by.
        expected: String,
        /// The id the content actually hashes to.
        actual: String,
    },
}
