//! Ref resolution against the remote.
//!
//! A remote repository publishes its refs in two ways: the flat manifest
//! `info/refs` (one round trip), and the `refs/` directory tree (one round
//! trip per ref). Strategies are tried in order until one succeeds.

use crate::location::RemoteLocation;
use crate::store::{ContentStore, LinkKind};
use crate::{Error, Result};
use gitipfs_storage::{ObjectId, Reference, StorageError};
use std::collections::BTreeMap;

/// Path of the flat ref manifest inside a repository.
pub const MANIFEST_PATH: &str = "info/refs";
/// Path of the explicit HEAD pointer inside a repository.
pub const HEAD_PATH: &str = "HEAD";

/// Ref names mapped to the objects they point at, in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefMapping(BTreeMap<String, ObjectId>);

impl RefMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `id`, returning the previous target.
    pub fn insert(&mut self, name: impl Into<String>, id: ObjectId) -> Option<ObjectId> {
        self.0.insert(name.into(), id)
    }

    /// Returns the target of `name`.
    pub fn get(&self, name: &str) -> Option<ObjectId> {
        self.0.get(name).copied()
    }

    /// Returns the number of refs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no refs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, id)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.0.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Returns the distinct ids the refs point at.
    pub fn tips(&self) -> Vec<ObjectId> {
        let mut tips: Vec<ObjectId> = self.0.values().copied().collect();
        tips.sort();
        tips.dedup();
        tips
    }

    /// Parses an `info/refs` manifest (`<hash>\t<name>` per line).
    ///
    /// Peeled tag lines (`<name>^{}`) are skipped.
    pub fn parse_manifest(text: &str) -> Result<Self> {
        let mut mapping = Self::new();
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (hex, name) = line
                .split_once(['\t', ' '])
                .ok_or_else(|| StorageError::InvalidRef(line.to_string()))?;
            let name = name.trim();
            if name.ends_with("^{}") {
                continue;
            }
            let id = ObjectId::from_hex(hex.trim())
                .map_err(|_| StorageError::InvalidRef(line.to_string()))?;
            mapping.insert(name, id);
        }
        Ok(mapping)
    }

    /// Renders the mapping as an `info/refs` manifest.
    pub fn to_manifest(&self) -> String {
        self.iter()
            .map(|(name, id)| format!("{id}\t{name}\n"))
            .collect()
    }

    /// Guesses HEAD as the first ref, in name order, whose name ends in `master`.
    pub fn guess_head(&self) -> Option<ObjectId> {
        self.iter()
            .find(|(name, _)| name.ends_with("master"))
            .map(|(_, id)| id)
    }
}

/// Result of a `list`: the refs and the HEAD they imply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefListing {
    /// All refs found.
    pub refs: RefMapping,
    /// The HEAD hash; all zeros when nothing better is known.
    pub head: ObjectId,
}

impl RefListing {
    /// Formats the `list` response lines, HEAD last.
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .refs
            .iter()
            .map(|(name, id)| format!("{id} {name}"))
            .collect();
        lines.push(format!("{} HEAD", self.head));
        lines
    }
}

/// One way of enumerating the refs of a remote repository.
pub trait RefStrategy {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Lists the refs at `location`.
    fn list(&self, store: &dyn ContentStore, location: &RemoteLocation) -> Result<RefMapping>;
}

/// Reads the flat `info/refs` manifest.
#[derive(Debug, Default)]
pub struct ManifestStrategy;

impl RefStrategy for ManifestStrategy {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn list(&self, store: &dyn ContentStore, location: &RemoteLocation) -> Result<RefMapping> {
        let bytes = store.cat(&location.join(MANIFEST_PATH))?;
        RefMapping::parse_manifest(&String::from_utf8_lossy(&bytes))
    }
}

/// Walks the `refs/` directory, reading one file per ref.
#[derive(Debug, Default)]
pub struct TreeWalkStrategy;

impl TreeWalkStrategy {
    fn walk(
        &self,
        store: &dyn ContentStore,
        location: &RemoteLocation,
        prefix: &str,
        mapping: &mut RefMapping,
    ) -> Result<()> {
        for link in store.ls(&location.join(prefix))? {
            let name = format!("{prefix}/{}", link.name);
            match link.kind {
                LinkKind::Directory => self.walk(store, location, &name, mapping)?,
                LinkKind::File => {
                    let bytes = store.cat(&location.join(&name))?;
                    match Reference::parse(&String::from_utf8_lossy(&bytes))? {
                        Reference::Direct(id) => {
                            mapping.insert(name, id);
                        }
                        Reference::Symbolic(target) => {
                            tracing::debug!(name = %name, target = %target, "skipping symbolic ref");
                        }
                    }
                }
                LinkKind::Other => {
                    tracing::debug!(name = %name, "skipping non-file entry under refs");
                }
            }
        }
        Ok(())
    }
}

impl RefStrategy for TreeWalkStrategy {
    fn name(&self) -> &'static str {
        "tree-walk"
    }

    fn list(&self, store: &dyn ContentStore, location: &RemoteLocation) -> Result<RefMapping> {
        let mut mapping = RefMapping::new();
        self.walk(store, location, "refs", &mut mapping)?;
        Ok(mapping)
    }
}

/// Builds the ref listing of a remote from an ordered list of strategies.
pub struct RefResolver {
    strategies: Vec<Box<dyn RefStrategy>>,
}

impl Default for RefResolver {
    fn default() -> Self {
        Self::new(vec![Box::new(ManifestStrategy), Box::new(TreeWalkStrategy)])
    }
}

impl RefResolver {
    /// Creates a resolver trying `strategies` in order.
    pub fn new(strategies: Vec<Box<dyn RefStrategy>>) -> Self {
        Self { strategies }
    }

    /// Lists the refs of the repository at `location`.
    ///
    /// For a fetch, an empty or unreadable remote is an error. For a push,
    /// a remote with no refs at all is a valid, new repository; failures
    /// other than "not found" are still errors.
    pub fn resolve(
        &self,
        store: &dyn ContentStore,
        location: &RemoteLocation,
        for_push: bool,
    ) -> Result<RefListing> {
        let mut failures = Vec::new();
        let mut only_missing = true;
        let mut found = None;

        for strategy in &self.strategies {
            match strategy.list(store, location) {
                Ok(refs) => {
                    tracing::debug!(strategy = strategy.name(), refs = refs.len(), "listed refs");
                    found = Some(refs);
                    break;
                }
                Err(e) => {
                    tracing::debug!(strategy = strategy.name(), error = %e, "ref strategy failed");
                    only_missing &= e.is_not_found();
                    failures.push(format!("{}: {e}", strategy.name()));
                }
            }
        }

        let refs = match found {
            Some(refs) => refs,
            None if for_push && only_missing => {
                tracing::info!(location = %location, "remote has no refs, treating as new repository");
                RefMapping::new()
            }
            None => {
                return Err(Error::RefListing {
                    location: location.to_string(),
                    reason: failures.join("; "),
                })
            }
        };

        if refs.is_empty() && !for_push {
            return Err(Error::RefListing {
                location: location.to_string(),
                reason: "no refs found".to_string(),
            });
        }

        let head = read_head(store, location, &refs)
            .or_else(|| refs.guess_head())
            .unwrap_or(ObjectId::NULL);
        Ok(RefListing { refs, head })
    }
}

/// Reads the explicit HEAD of the remote. Any failure yields `None`.
fn read_head(
    store: &dyn ContentStore,
    location: &RemoteLocation,
    refs: &RefMapping,
) -> Option<ObjectId> {
    let bytes = match store.cat(&location.join(HEAD_PATH)) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "no explicit HEAD");
            return None;
        }
    };
    match Reference::parse(&String::from_utf8_lossy(&bytes)) {
        Ok(Reference::Direct(id)) => Some(id),
        Ok(Reference::Symbolic(target)) => {
            let id = refs.get(&target);
            if id.is_none() {
                tracing::debug!(target = %target, "HEAD points at a ref the remote does not list");
            }
            id
        }
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed remote HEAD");
            None
        }
    }
}
