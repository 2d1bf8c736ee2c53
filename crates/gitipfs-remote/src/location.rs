//! Remote URL parsing and the canonical content path.

use crate::error::SetupError;
use std::fmt;

/// URL prefixes accepted for a remote, all meaning `/ipfs/`.
const URL_PREFIXES: [&str; 2] = ["ipfs://ipfs/", "ipfs:///ipfs/"];

/// Where the remote repository lives: a content root plus a path inside it.
///
/// The root changes after every push, since the store is immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    root: String,
    subpath: String,
}

impl RemoteLocation {
    /// Parses `ipfs://ipfs/<hash>/<path>` or `ipfs:///ipfs/<hash>/<path>`.
    pub fn parse(url: &str) -> Result<Self, SetupError> {
        let rest = URL_PREFIXES
            .iter()
            .find_map(|prefix| url.strip_prefix(prefix))
            .ok_or_else(|| SetupError::UnsupportedUrl(url.to_string()))?;

        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let root = segments
            .next()
            .ok_or_else(|| SetupError::InvalidPath(format!("{url}: missing content hash")))?;
        if !root.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SetupError::InvalidPath(format!(
                "{url}: {root} is not a content hash"
            )));
        }

        let segments: Vec<&str> = segments.collect();
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(SetupError::InvalidPath(format!(
                "{url}: relative segments are not allowed"
            )));
        }

        Ok(Self {
            root: root.to_string(),
            subpath: segments.join("/"),
        })
    }

    /// Returns the content hash of the root.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns the path of the repository below the root, possibly empty.
    pub fn subpath(&self) -> &str {
        &self.subpath
    }

    /// Returns the canonical path `/ipfs/<hash>[/<path>]`.
    pub fn path(&self) -> String {
        if self.subpath.is_empty() {
            format!("/ipfs/{}", self.root)
        } else {
            format!("/ipfs/{}/{}", self.root, self.subpath)
        }
    }

    /// Returns the canonical path of `relative` inside the repository.
    pub fn join(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            self.path()
        } else {
            format!("{}/{}", self.path(), relative)
        }
    }

    /// Returns the link name of `relative` as seen from the root, used when
    /// patching the root directory.
    pub fn link_name(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if self.subpath.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.subpath, relative)
        }
    }

    /// Returns the same repository under a new root.
    pub fn with_root(&self, root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            subpath: self.subpath.clone(),
        }
    }

    /// Returns a URL git can clone from.
    pub fn url(&self) -> String {
        format!("ipfs:/{}", self.path())
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}
