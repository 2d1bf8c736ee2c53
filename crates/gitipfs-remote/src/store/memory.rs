//! In-memory content store.

use super::{ContentStore, Link, LinkKind, StoreResult};
use crate::error::TransportError;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Directory(BTreeMap<String, String>),
}

impl Node {
    fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Node::File(data) => {
                hasher.update(b"file\0");
                hasher.update(data);
            }
            Node::Directory(links) => {
                hasher.update(b"dir\0");
                for (name, hash) in links {
                    hasher.update(name.as_bytes());
                    hasher.update(b"\0");
                    hasher.update(hash.as_bytes());
                    hasher.update(b"\n");
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// Content-addressed store kept in memory.
///
/// Files and directories are immutable nodes keyed by the SHA-256 of their
/// content, mirroring how the daemon behaves closely enough for the helper.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<String, Node>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty directory and returns its hash.
    pub fn empty_directory(&self) -> String {
        self.insert(Node::Directory(BTreeMap::new()))
    }

    /// Returns the number of nodes held.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns true if the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn insert(&self, node: Node) -> String {
        let hash = node.hash();
        self.nodes.write().entry(hash.clone()).or_insert(node);
        hash
    }

    fn node(&self, hash: &str) -> Option<Node> {
        self.nodes.read().get(hash).cloned()
    }

    /// Walks `path` down to a node.
    fn resolve(&self, path: &str) -> StoreResult<Node> {
        let not_found = || TransportError::NotFound {
            path: path.to_string(),
        };
        let trimmed = path.strip_prefix("/ipfs/").unwrap_or(path);
        let mut segments = trimmed.split('/').filter(|s| !s.is_empty());
        let root = segments.next().ok_or_else(not_found)?;
        let mut node = self.node(root).ok_or_else(not_found)?;
        for segment in segments {
            let next = match &node {
                Node::Directory(links) => links.get(segment).cloned(),
                Node::File(_) => None,
            };
            node = next
                .and_then(|hash| self.node(&hash))
                .ok_or_else(not_found)?;
        }
        Ok(node)
    }

    fn link_into(
        &self,
        directory: Option<&str>,
        segments: &[&str],
        target: &str,
    ) -> StoreResult<String> {
        let mut links = match directory {
            None => BTreeMap::new(),
            Some(hash) => match self.node(hash) {
                Some(Node::Directory(links)) => links,
                Some(Node::File(_)) => {
                    return Err(TransportError::Status {
                        status: 500,
                        message: format!("{hash} is not a directory"),
                    })
                }
                None => {
                    return Err(TransportError::NotFound {
                        path: hash.to_string(),
                    })
                }
            },
        };

        let (name, rest) = match segments.split_first() {
            Some(split) => split,
            None => {
                return Err(TransportError::Status {
                    status: 400,
                    message: "empty link name".to_string(),
                })
            }
        };
        let child = if rest.is_empty() {
            target.to_string()
        } else {
            let existing = links.get(*name).cloned();
            self.link_into(existing.as_deref(), rest, target)?
        };
        links.insert((*name).to_string(), child);
        Ok(self.insert(Node::Directory(links)))
    }
}

impl ContentStore for MemoryStore {
    fn cat(&self, path: &str) -> StoreResult<Vec<u8>> {
        match self.resolve(path)? {
            Node::File(data) => Ok(data),
            Node::Directory(_) => Err(TransportError::Status {
                status: 500,
                message: "this dag node is a directory".to_string(),
            }),
        }
    }

    fn cat_range(&self, path: &str, offset: u64, len: u64) -> StoreResult<Vec<u8>> {
        let data = self.cat(path)?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start
            .saturating_add(usize::try_from(len).unwrap_or(usize::MAX))
            .min(data.len());
        Ok(data[start..end].to_vec())
    }

    fn ls(&self, path: &str) -> StoreResult<Vec<Link>> {
        let links = match self.resolve(path)? {
            Node::Directory(links) => links,
            Node::File(_) => return Ok(Vec::new()),
        };
        let nodes = self.nodes.read();
        Ok(links
            .into_iter()
            .map(|(name, hash)| {
                let (size, kind) = match nodes.get(&hash) {
                    Some(Node::File(data)) => (data.len() as u64, LinkKind::File),
                    Some(Node::Directory(_)) => (0, LinkKind::Directory),
                    None => (0, LinkKind::Other),
                };
                Link {
                    name,
                    hash,
                    size,
                    kind,
                }
            })
            .collect())
    }

    fn add(&self, data: &[u8]) -> StoreResult<String> {
        Ok(self.insert(Node::File(data.to_vec())))
    }

    fn patch_link(&self, root: &str, name: &str, target: &str) -> StoreResult<String> {
        if self.node(target).is_none() {
            return Err(TransportError::NotFound {
                path: target.to_string(),
            });
        }
        let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
        self.link_into(Some(root), &segments, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_cat() {
        let store = MemoryStore::new();
        let hash = store.add(b"hello").unwrap();
        assert_eq!(store.cat(&hash).unwrap(), b"hello");
        assert_eq!(store.cat(&format!("/ipfs/{hash}")).unwrap(), b"hello");
        assert_eq!(store.add(b"hello").unwrap(), hash);
    }

    #[test]
    fn test_patch_link_creates_directories() {
        let store = MemoryStore::new();
        let root = store.empty_directory();
        let file = store.add(b"ref content\n").unwrap();

        let new_root = store.patch_link(&root, "repo/refs/heads/main", &file).unwrap();
        assert_ne!(new_root, root);
        assert_eq!(
            store
                .cat(&format!("/ipfs/{new_root}/repo/refs/heads/main"))
                .unwrap(),
            b"ref content\n"
        );

        // The old root is untouched.
        assert!(store.ls(&format!("/ipfs/{root}")).unwrap().is_empty());
    }

    #[test]
    fn test_patch_link_keeps_siblings() {
        let store = MemoryStore::new();
        let a = store.add(b"a").unwrap();
        let b = store.add(b"b").unwrap();
        let root = store.empty_directory();
        let root = store.patch_link(&root, "dir/a", &a).unwrap();
        let root = store.patch_link(&root, "dir/b", &b).unwrap();

        let names: Vec<String> = store
            .ls(&format!("/ipfs/{root}/dir"))
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_ls_kinds_and_sizes() {
        let store = MemoryStore::new();
        let file = store.add(b"12345").unwrap();
        let root = store.empty_directory();
        let root = store.patch_link(&root, "sub/file", &file).unwrap();
        let root = store.patch_link(&root, "top", &file).unwrap();

        let links = store.ls(&root).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].name, "sub");
        assert_eq!(links[0].kind, LinkKind::Directory);
        assert_eq!(links[1].name, "top");
        assert_eq!(links[1].kind, LinkKind::File);
        assert_eq!(links[1].size, 5);
    }

    #[test]
    fn test_missing_paths() {
        let store = MemoryStore::new();
        let root = store.empty_directory();
        let err = store.cat(&format!("/ipfs/{root}/info/refs")).unwrap_err();
        assert!(err.is_not_found());
        assert!(store.ls("/ipfs/unknown").unwrap_err().is_not_found());
        assert!(store
            .patch_link(&root, "x", "unknown")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_cat_range() {
        let store = MemoryStore::new();
        let hash = store.add(b"0123456789").unwrap();
        assert_eq!(store.cat_range(&hash, 2, 3).unwrap(), b"234");
        assert_eq!(store.cat_range(&hash, 8, 10).unwrap(), b"89");
        assert!(store.cat_range(&hash, 20, 1).unwrap().is_empty());
    }

    #[test]
    fn test_cat_directory_is_error() {
        let store = MemoryStore::new();
        let root = store.empty_directory();
        let err = store.cat(&root).unwrap_err();
        assert!(!err.is_not_found());
    }
}
