//! Content store backends.
//!
//! The helper only needs a handful of primitives from the content-addressed
//! store: read a path, read part of a path, list a directory, add bytes, and
//! graft a link into a directory tree (which yields a new root, since
//! nothing in the store is ever modified in place).

mod ipfs;
mod memory;

pub use ipfs::IpfsClient;
pub use memory::MemoryStore;

use crate::error::TransportError;
use std::sync::Arc;

/// Result type for content store operations.
pub type StoreResult<T> = std::result::Result<T, TransportError>;

/// What a directory entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// A directory node.
    Directory,
    /// A file.
    File,
    /// Anything else (symlinks, raw blocks).
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Entry name within the directory.
    pub name: String,
    /// Content hash of the entry.
    pub hash: String,
    /// Size in bytes as reported by the store.
    pub size: u64,
    /// What the entry is.
    pub kind: LinkKind,
}

/// Trait for content-addressed store backends.
///
/// Paths are canonical content paths (`/ipfs/<hash>/a/b`).
pub trait ContentStore: Send + Sync {
    /// Reads the whole file at `path`.
    fn cat(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Reads `len` bytes of the file at `path`, starting at `offset`.
    fn cat_range(&self, path: &str, offset: u64, len: u64) -> StoreResult<Vec<u8>>;

    /// Lists the directory at `path`.
    fn ls(&self, path: &str) -> StoreResult<Vec<Link>>;

    /// Adds `data` as a file and returns its hash.
    fn add(&self, data: &[u8]) -> StoreResult<String>;

    /// Links `target` under `name` (which may contain `/`) in the directory
    /// `root`, creating intermediate directories, and returns the new root.
    fn patch_link(&self, root: &str, name: &str, target: &str) -> StoreResult<String>;
}

impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    fn cat(&self, path: &str) -> StoreResult<Vec<u8>> {
        (**self).cat(path)
    }

    fn cat_range(&self, path: &str, offset: u64, len: u64) -> StoreResult<Vec<u8>> {
        (**self).cat_range(path, offset, len)
    }

    fn ls(&self, path: &str) -> StoreResult<Vec<Link>> {
        (**self).ls(path)
    }

    fn add(&self, data: &[u8]) -> StoreResult<String> {
        (**self).add(data)
    }

    fn patch_link(&self, root: &str, name: &str, target: &str) -> StoreResult<String> {
        (**self).patch_link(root, name, target)
    }
}
