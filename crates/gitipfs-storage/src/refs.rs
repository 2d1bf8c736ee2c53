//! Git reference files.

use crate::{ObjectId, Result, StorageError};

/// A git reference (branch, tag, or symbolic ref).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Direct reference to an object.
    Direct(ObjectId),
    /// Symbolic reference (e.g., HEAD -> refs/heads/main).
    Symbolic(String),
}

impl Reference {
    /// Parses the content of a ref file: either `ref: <name>` or a hex id.
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim();
        if let Some(target) = content.strip_prefix("ref:") {
            let target = target.trim();
            if target.is_empty() {
                return Err(StorageError::InvalidRef(content.to_string()));
            }
            return Ok(Self::Symbolic(target.to_string()));
        }
        ObjectId::from_hex(content)
            .map(Self::Direct)
            .map_err(|_| StorageError::InvalidRef(content.to_string()))
    }

    /// Returns the object ID if this is a direct reference.
    pub fn as_direct(&self) -> Option<ObjectId> {
        match self {
            Self::Direct(id) => Some(*id),
            Self::Symbolic(_) => None,
        }
    }

    /// Returns the target name if this is a symbolic reference.
    pub fn as_symbolic(&self) -> Option<&str> {
        match self {
            Self::Direct(_) => None,
            Self::Symbolic(target) => Some(target),
        }
    }
}

/// Parses a `packed-refs` file into `(name, id)` pairs in file order.
///
/// Comment lines (`#`) and peeled tag lines (`^`) are skipped.
pub fn parse_packed_refs(text: &str) -> Result<Vec<(String, ObjectId)>> {
    let mut refs = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
            continue;
        }
        let (hex, name) = line
            .split_once(' ')
            .ok_or_else(|| StorageError::InvalidRef(line.to_string()))?;
        let id = ObjectId::from_hex(hex).map_err(|_| StorageError::InvalidRef(line.to_string()))?;
        refs.push((name.to_string(), id));
    }
    Ok(refs)
}
