//! Pack file support for gitipfs.
//!
//! A remote repository may keep part of its history in pack files under
//! `objects/pack/`. This crate reads the `.idx` companion to locate an object,
//! decodes the single pack entry that holds it, and resolves delta chains
//! against bases found either in the same pack or elsewhere.
//! See: https://git-scm.com/docs/pack-format

mod builder;
mod delta;
mod entry;
mod error;
mod index;
mod read;

pub use builder::{BuiltPack, PackBuilder};
pub use delta::{apply_delta, DeltaBuilder};
pub use entry::{parse_entry, PackEntry};
pub use error::PackError;
pub use index::PackIndex;
pub use read::{read_object, PackData, MAX_DELTA_CHAIN};

/// Result type for pack operations.
pub type Result<T> = std::result::Result<T, PackError>;
