//! Push orchestration.
//!
//! The store is immutable, so a push builds a new root: every missing object
//! is added and linked under `objects/`, then the ref file, the `info/refs`
//! manifest and (for a new repository) `HEAD` are linked in. The session
//! moves on to the new root once a ref has been pushed.

use crate::local::LocalRepository;
use crate::location::RemoteLocation;
use crate::refs::{RefMapping, RefResolver, HEAD_PATH, MANIFEST_PATH};
use crate::store::ContentStore;
use crate::{Error, Result};
use gitipfs_storage::{encode_loose, ObjectId};
use std::str::FromStr;

/// Reason reported for delete requests.
pub const DELETE_UNSUPPORTED: &str = "delete not supported";

/// One `push` line: `[+]<src>:<dst>`, or `:<dst>` to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushCommand {
    /// Update `dst` to whatever `src` resolves to locally.
    Update {
        /// Local ref or object.
        src: String,
        /// Remote ref.
        dst: String,
        /// Whether the client asked for a non-fast-forward update.
        force: bool,
    },
    /// Delete `dst` on the remote.
    Delete {
        /// Remote ref.
        dst: String,
    },
}

impl PushCommand {
    /// Returns the remote ref this command targets.
    pub fn dst(&self) -> &str {
        match self {
            Self::Update { dst, .. } | Self::Delete { dst } => dst,
        }
    }
}

impl FromStr for PushCommand {
    type Err = Error;

    fn from_str(refspec: &str) -> Result<Self> {
        let (force, spec) = match refspec.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, refspec),
        };
        let (src, dst) = spec
            .split_once(':')
            .ok_or_else(|| Error::Protocol(format!("malformed refspec: {refspec:?}")))?;
        if dst.is_empty() || dst.contains(char::is_whitespace) {
            return Err(Error::Protocol(format!("malformed refspec: {refspec:?}")));
        }
        if src.is_empty() {
            return Ok(Self::Delete {
                dst: dst.to_string(),
            });
        }
        Ok(Self::Update {
            src: src.to_string(),
            dst: dst.to_string(),
            force,
        })
    }
}

/// The result of one push line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The ref was updated.
    Ok(String),
    /// The ref was not updated.
    Error {
        /// Remote ref.
        dst: String,
        /// Single-line reason.
        reason: String,
    },
}

impl PushOutcome {
    /// Formats the response line.
    pub fn line(&self) -> String {
        match self {
            Self::Ok(dst) => format!("ok {dst}"),
            Self::Error { dst, reason } => format!("error {dst} {reason}"),
        }
    }
}

/// Outcomes of a push batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// One outcome per attempted line, in order.
    pub outcomes: Vec<PushOutcome>,
    /// True if a failure stopped the batch before every line was attempted.
    pub halted: bool,
    /// Where the repository lives after the batch, if any ref was pushed.
    pub new_location: Option<RemoteLocation>,
}

/// What the orchestrator knows about the remote during one batch.
struct RemoteState {
    refs: RefMapping,
    has_head: bool,
}

/// Pushes refs from the local repository to the remote.
pub struct PushOrchestrator<'a> {
    store: &'a dyn ContentStore,
    local: &'a LocalRepository,
    resolver: &'a RefResolver,
}

impl<'a> PushOrchestrator<'a> {
    /// Creates an orchestrator.
    pub fn new(
        store: &'a dyn ContentStore,
        local: &'a LocalRepository,
        resolver: &'a RefResolver,
    ) -> Self {
        Self {
            store,
            local,
            resolver,
        }
    }

    /// Processes a push batch in order, moving `location` to each new root.
    ///
    /// Deletes are refused without stopping the batch. Any other failure is
    /// reported for its ref and stops the batch.
    pub fn push_batch(
        &self,
        location: &mut RemoteLocation,
        commands: &[PushCommand],
    ) -> PushReport {
        let mut report = PushReport::default();
        let mut remote: Option<RemoteState> = None;

        for command in commands {
            match command {
                PushCommand::Delete { dst } => {
                    tracing::warn!(dst = %dst, "refusing to delete remote ref");
                    report.outcomes.push(PushOutcome::Error {
                        dst: dst.clone(),
                        reason: DELETE_UNSUPPORTED.to_string(),
                    });
                }
                PushCommand::Update { src, dst, force } => {
                    match self.push_ref(location, &mut remote, src, dst, *force) {
                        Ok(id) => {
                            tracing::info!(dst = %dst, id = %id, "pushed ref");
                            report.outcomes.push(PushOutcome::Ok(dst.clone()));
                        }
                        Err(e) => {
                            let reason = single_line(&e.to_string());
                            let e = Error::PushRef {
                                dst: dst.clone(),
                                reason: reason.clone(),
                            };
                            tracing::error!(error = %e, "push halted");
                            report.outcomes.push(PushOutcome::Error {
                                dst: dst.clone(),
                                reason,
                            });
                            report.halted = true;
                            break;
                        }
                    }
                }
            }
        }

        if report.outcomes.iter().any(|o| matches!(o, PushOutcome::Ok(_))) {
            tracing::info!(url = %location.url(), "remote moved to new root");
            report.new_location = Some(location.clone());
        }
        report
    }

    fn remote_state(&self, location: &RemoteLocation) -> Result<RemoteState> {
        let listing = self.resolver.resolve(self.store, location, true)?;
        let has_head = match self.store.cat(&location.join(HEAD_PATH)) {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e.into()),
        };
        Ok(RemoteState {
            refs: listing.refs,
            has_head,
        })
    }

    fn push_ref(
        &self,
        location: &mut RemoteLocation,
        remote: &mut Option<RemoteState>,
        src: &str,
        dst: &str,
        force: bool,
    ) -> Result<ObjectId> {
        validate_dst(dst)?;
        let id = self.local.resolve_ref(src)?;

        let state = match remote {
            Some(state) => state,
            None => remote.insert(self.remote_state(location)?),
        };
        if let Some(old) = state.refs.get(dst) {
            tracing::debug!(dst, old = %old, new = %id, force, "updating existing ref");
        }

        let objects = self.local.reachable(&id, &state.refs.tips())?;
        tracing::info!(dst, objects = objects.len(), "uploading objects");

        let mut root = location.root().to_string();
        for oid in &objects {
            let object = self.local.read_object(oid)?;
            let hash = self.store.add(&encode_loose(&object)?)?;
            let name = location.link_name(&format!("objects/{}", oid.loose_path()));
            root = self.store.patch_link(&root, &name, &hash)?;
        }

        root = self.link_file(location, &root, dst, format!("{id}\n"))?;
        state.refs.insert(dst, id);
        root = self.link_file(location, &root, MANIFEST_PATH, state.refs.to_manifest())?;
        if !state.has_head && dst.starts_with("refs/heads/") {
            root = self.link_file(location, &root, HEAD_PATH, format!("ref: {dst}\n"))?;
            state.has_head = true;
        }

        *location = location.with_root(root);
        Ok(id)
    }

    /// Adds `content` and links it at `relative` inside the repository.
    fn link_file(
        &self,
        location: &RemoteLocation,
        root: &str,
        relative: &str,
        content: String,
    ) -> Result<String> {
        let hash = self.store.add(content.as_bytes())?;
        Ok(self
            .store
            .patch_link(root, &location.link_name(relative), &hash)?)
    }
}

fn validate_dst(dst: &str) -> Result<()> {
    let valid = dst.starts_with("refs/")
        && dst
            .split('/')
            .all(|s| !s.is_empty() && s != "." && s != "..");
    if valid {
        Ok(())
    } else {
        Err(Error::Protocol(format!("invalid destination ref: {dst}")))
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
