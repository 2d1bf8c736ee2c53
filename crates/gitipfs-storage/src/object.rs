//! Git object types and utilities.

use crate::{Result, StorageError};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// Tree entry mode of a submodule commit (gitlink).
const GITLINK_MODE: &[u8] = b"160000";

/// A 20-byte SHA-1 object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Length of the hex representation.
    pub const HEX_LEN: usize = 40;

    /// The all-zero id, which git uses for "no object".
    pub const NULL: ObjectId = ObjectId([0u8; 20]);

    /// Creates an ObjectId from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates an ObjectId from a 20-byte slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; 20] = slice.try_into().map_err(|_| {
            StorageError::InvalidObject(format!("invalid object id length: {}", slice.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Creates an ObjectId from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != Self::HEX_LEN {
            return Err(StorageError::InvalidObject(format!(
                "invalid object id length: {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|e| StorageError::InvalidObject(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Returns true if `s` is a well-formed 40-character hex id.
    pub fn is_hex(s: &str) -> bool {
        s.len() == Self::HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns true for the all-zero id.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Path of the loose object relative to an `objects/` directory (`xx/yyyy...`).
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }

    /// Computes the SHA-1 hash of data with a git object header.
    pub fn hash_object(object_type: ObjectType, data: &[u8]) -> Self {
        let header = format!("{} {}\0", object_type.as_str(), data.len());
        let mut hasher = Sha1::new();
        hasher.update(header.as_bytes());
        hasher.update(data);
        let result = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }
}

impl FromStr for ObjectId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Git object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Commit object.
    Commit,
    /// Annotated tag.
    Tag,
}

impl ObjectType {
    /// Returns the string representation used in git.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parses an object type from a string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            _ => Err(StorageError::InvalidObject(format!(
                "unknown object type: {}",
                s
            ))),
        }
    }

    /// Returns the type code used in pack files.
    pub fn pack_type(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parses an object type from a pack file type code.
    pub fn from_pack_type(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            _ => Err(StorageError::InvalidObject(format!(
                "unknown pack type: {}",
                code
            ))),
        }
    }
}

/// A git object (blob, tree, commit, or tag).
#[derive(Debug, Clone)]
pub struct GitObject {
    /// The object's unique identifier (SHA-1 hash).
    pub id: ObjectId,
    /// The type of object.
    pub object_type: ObjectType,
    /// The raw object data (uncompressed, without header).
    pub data: Bytes,
}

impl GitObject {
    /// Creates a new git object, computing its ID from the data.
    pub fn new(object_type: ObjectType, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let id = ObjectId::hash_object(object_type, &data);
        Self {
            id,
            object_type,
            data,
        }
    }

    /// Creates a blob object from file content.
    pub fn blob(content: impl Into<Bytes>) -> Self {
        Self::new(ObjectType::Blob, content)
    }

    /// Creates a tree object from `(mode, name, id)` entries, in the given order.
    pub fn tree(entries: &[(&str, &str, ObjectId)]) -> Self {
        let mut data = Vec::new();
        for (mode, name, id) in entries {
            data.extend_from_slice(mode.as_bytes());
            data.push(b' ');
            data.extend_from_slice(name.as_bytes());
            data.push(0);
            data.extend_from_slice(id.as_bytes());
        }
        Self::new(ObjectType::Tree, data)
    }

    /// Creates a commit object.
    pub fn commit(
        tree_id: &ObjectId,
        parents: &[ObjectId],
        author: &str,
        committer: &str,
        message: &str,
    ) -> Self {
        let mut content = format!("tree {}\n", tree_id);
        for parent in parents {
            content.push_str(&format!("parent {}\n", parent));
        }
        content.push_str(&format!("author {}\n", author));
        content.push_str(&format!("committer {}\n", committer));
        content.push_str(&format!("\n{}", message));
        Self::new(ObjectType::Commit, content.into_bytes())
    }

    /// Returns the size of the object data.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Checks that the object hashes to `expected`.
    pub fn verify(&self, expected: &ObjectId) -> Result<()> {
        if &self.id != expected {
            return Err(StorageError::Corruption {
                expected: expected.to_hex(),
                actual: self.id.to_hex(),
            });
        }
        Ok(())
    }

    /// Returns the ids of the objects this object points at.
    ///
    /// Commits link to their tree and parents, trees to their entries
    /// (submodule entries excluded, they live in another repository),
    /// tags to their target. Blobs have no links.
    pub fn links(&self) -> Result<Vec<ObjectId>> {
        match self.object_type {
            ObjectType::Blob => Ok(Vec::new()),
            ObjectType::Commit => header_links(&self.data, &["tree ", "parent "]),
            ObjectType::Tag => header_links(&self.data, &["object "]),
            ObjectType::Tree => tree_links(&self.data),
        }
    }
}

/// Collects the ids named by the given header keys, up to the first blank line.
fn header_links(data: &[u8], keys: &[&str]) -> Result<Vec<ObjectId>> {
    let mut ids = Vec::new();
    for line in data.split(|&b| b == b'\n') {
        if line.is_empty() {
            break;
        }
        let line = String::from_utf8_lossy(line);
        for key in keys {
            if let Some(hex) = line.strip_prefix(key) {
                ids.push(ObjectId::from_hex(hex.trim())?);
            }
        }
    }
    Ok(ids)
}

fn tree_links(data: &[u8]) -> Result<Vec<ObjectId>> {
    let mut ids = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let space = data[pos..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| StorageError::InvalidObject("tree entry without mode".to_string()))?;
        let mode = &data[pos..pos + space];
        let nul = data[pos + space..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| StorageError::InvalidObject("tree entry without name".to_string()))?;
        let id_start = pos + space + nul + 1;
        let id_end = id_start + 20;
        if id_end > data.len() {
            return Err(StorageError::InvalidObject(
                "truncated tree entry".to_string(),
            ));
        }
        if mode != GITLINK_MODE {
            ids.push(ObjectId::from_slice(&data[id_start..id_end])?);
        }
        pos = id_end;
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_hex_roundtrip() {
        let hex = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";
        let id = ObjectId::from_hex(hex).unwrap();
        assert_eq!(id.to_hex(), hex);
        assert_eq!(hex.parse::<ObjectId>().unwrap(), id);
    }

    #[test]
    fn test_blob_hash() {
        // This is the actual git hash for "hello\n"
        let obj = GitObject::blob(b"hello\n".to_vec());
        assert_eq!(obj.id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn test_empty_tree_hash() {
        let tree = GitObject::tree(&[]);
        assert_eq!(tree.id.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn test_object_id_invalid_hex() {
        assert!(ObjectId::from_hex("abc").is_err());
        assert!(ObjectId::from_hex("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3ff").is_err());
        assert!(ObjectId::from_hex("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn test_is_hex() {
        assert!(ObjectId::is_hex("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"));
        assert!(!ObjectId::is_hex("a94a8fe5"));
        assert!(!ObjectId::is_hex("g94a8fe5ccb19ba61c4c0873d391e987982fbbd3"));
    }

    #[test]
    fn test_null_id() {
        assert!(ObjectId::NULL.is_null());
        assert_eq!(ObjectId::NULL.to_hex(), "0".repeat(40));
        assert!(!ObjectId::from_bytes([1u8; 20]).is_null());
    }

    #[test]
    fn test_loose_path() {
        let id = ObjectId::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();
        assert_eq!(id.loose_path(), "ce/013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn test_object_type_pack_type_roundtrip() {
        for ot in [
            ObjectType::Commit,
            ObjectType::Tree,
            ObjectType::Blob,
            ObjectType::Tag,
        ] {
            assert_eq!(ObjectType::from_pack_type(ot.pack_type()).unwrap(), ot);
            assert_eq!(ObjectType::parse(ot.as_str()).unwrap(), ot);
        }
        assert!(ObjectType::from_pack_type(0).is_err());
        assert!(ObjectType::from_pack_type(6).is_err());
    }

    #[test]
    fn test_commit_links() {
        let tree_id = ObjectId::from_bytes([1u8; 20]);
        let parents = vec![
            ObjectId::from_bytes([2u8; 20]),
            ObjectId::from_bytes([3u8; 20]),
        ];
        let author = "Alice <alice@example.com> 1234567890 +0000";
        let commit = GitObject::commit(&tree_id, &parents, author, author, "tree ffff\n");

        let links = commit.links().unwrap();
        assert_eq!(links, vec![tree_id, parents[0], parents[1]]);
    }

    #[test]
    fn test_tree_links_skip_gitlinks() {
        let blob = GitObject::blob(b"content".to_vec());
        let sub = GitObject::tree(&[("100644", "a.txt", blob.id)]);
        let module = ObjectId::from_bytes([9u8; 20]);
        let root = GitObject::tree(&[
            ("100644", "file.txt", blob.id),
            ("40000", "dir", sub.id),
            ("160000", "vendor", module),
        ]);

        let links = root.links().unwrap();
        assert_eq!(links, vec![blob.id, sub.id]);
    }

    #[test]
    fn test_truncated_tree_rejected() {
        let tree = GitObject::new(ObjectType::Tree, b"100644 a\0short".to_vec());
        assert!(tree.links().is_err());
    }

    #[test]
    fn test_tag_links() {
        let target = GitObject::blob(b"x".to_vec());
        let body = format!(
            "object {}\ntype blob\ntag v1\ntagger T <t@example.com> 0 +0000\n\nmsg\n",
            target.id
        );
        let tag = GitObject::new(ObjectType::Tag, body.into_bytes());
        assert_eq!(tag.links().unwrap(), vec![target.id]);
    }

    #[test]
    fn test_blob_has_no_links() {
        let blob = GitObject::blob(b"tree 0000\n".to_vec());
        assert!(blob.links().unwrap().is_empty());
    }

    #[test]
    fn test_verify() {
        let blob = GitObject::blob(b"data".to_vec());
        assert!(blob.verify(&blob.id).is_ok());
        let other = ObjectId::from_bytes([7u8; 20]);
        assert!(matches!(
            blob.verify(&other),
            Err(StorageError::Corruption { .. })
        ));
    }
}
