//! Git object model for gitipfs.
//!
//! This crate provides the pieces of the git on-disk format that both sides
//! of the remote helper share: SHA-1 object ids, the four object types, the
//! zlib loose-object encoding, and parsing of ref files and `packed-refs`.

mod error;
mod loose;
mod object;
mod refs;

pub use error::StorageError;
pub use loose::{decode_loose, encode_loose};
pub use object::{GitObject, ObjectId, ObjectType};
pub use refs::{parse_packed_refs, Reference};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
