//! One helper invocation: the remote, the local repository, and the
//! components that move objects between them.

use crate::error::SetupError;
use crate::fetch::{FetchContext, ObjectFetcher};
use crate::interrupt::CancellationFlag;
use crate::local::LocalRepository;
use crate::location::RemoteLocation;
use crate::push::{PushCommand, PushOrchestrator, PushReport};
use crate::refs::{RefListing, RefResolver};
use crate::store::ContentStore;
use crate::Result;
use gitipfs_storage::ObjectId;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Resolves the value of `GIT_DIR` against the working directory.
pub fn resolve_git_dir(value: Option<&OsStr>, cwd: &Path) -> std::result::Result<PathBuf, SetupError> {
    let value = match value {
        Some(v) if !v.is_empty() => Path::new(v),
        _ => return Err(SetupError::MissingGitDir),
    };
    if value == Path::new(".") {
        Ok(cwd.to_path_buf())
    } else if value.is_relative() {
        Ok(cwd.join(value))
    } else {
        Ok(value.to_path_buf())
    }
}

/// State of a running helper.
pub struct Session<S> {
    store: S,
    location: RemoteLocation,
    local: LocalRepository,
    resolver: RefResolver,
    fetcher: ObjectFetcher,
    cancel: CancellationFlag,
}

impl<S: ContentStore> Session<S> {
    /// Creates a session with the default strategies.
    pub fn new(store: S, location: RemoteLocation, local: LocalRepository) -> Self {
        Self {
            store,
            location,
            local,
            resolver: RefResolver::default(),
            fetcher: ObjectFetcher::default(),
            cancel: CancellationFlag::new(),
        }
    }

    /// Replaces the cancellation flag.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces the ref resolver.
    pub fn with_resolver(mut self, resolver: RefResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the object fetcher.
    pub fn with_fetcher(mut self, fetcher: ObjectFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// The current remote location. Moves to a new root after each push.
    pub fn location(&self) -> &RemoteLocation {
        &self.location
    }

    /// The local repository.
    pub fn local(&self) -> &LocalRepository {
        &self.local
    }

    /// The content store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// True once an interrupt was received.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Lists the remote refs.
    pub fn list(&self, for_push: bool) -> Result<RefListing> {
        self.resolver.resolve(&self.store, &self.location, for_push)
    }

    /// Fetches a batch of objects into the local repository.
    pub fn fetch(&self, requests: &[(ObjectId, String)]) -> Result<usize> {
        let ctx = FetchContext {
            store: &self.store,
            location: &self.location,
            local: &self.local,
        };
        self.fetcher.fetch_batch(&ctx, requests)
    }

    /// Pushes a batch of refs.
    pub fn push(&mut self, commands: &[PushCommand]) -> PushReport {
        let orchestrator = PushOrchestrator::new(&self.store, &self.local, &self.resolver);
        orchestrator.push_batch(&mut self.location, commands)
    }
}
