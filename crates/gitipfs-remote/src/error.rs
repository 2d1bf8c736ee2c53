//! Error types for the remote helper.

use thiserror::Error;

/// Errors that can occur while serving the remote-helper protocol.
#[derive(Debug, Error)]
pub enum Error {
    /// Session could not be set up.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Malformed or unrecognized command line.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Neither ref strategy produced a usable mapping.
    #[error("cannot list refs of {location}: {reason}")]
    RefListing {
        /// The remote location that was listed.
        location: String,
        /// Why listing failed.
        reason: String,
    },

    /// No retrieval strategy could locate the object.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Pushing a single ref failed.
    #[error("push of {dst} failed: {reason}")]
    PushRef {
        /// The remote ref being updated.
        dst: String,
        /// Why the push failed.
        reason: String,
    },

    /// Content store failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Git object format error.
    #[error("storage error: {0}")]
    Storage(#[from] gitipfs_storage::StorageError),

    /// Pack format error.
    #[error("pack error: {0}")]
    Pack(#[from] gitipfs_pack::PackError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An interrupt was received between commands.
    #[error("interrupted")]
    Interrupted,
}

impl Error {
    /// Returns true if the underlying cause is a path missing from the content store.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_not_found(),
            Self::ObjectNotFound(_) => true,
            _ => false,
        }
    }
}

/// Failures talking to the content store.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The path does not exist in the store.
    #[error("{path} does not exist")]
    NotFound {
        /// The path that was requested.
        path: String,
    },

    /// The request could not be sent or its body could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status.
    #[error("API returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the API.
        message: String,
    },

    /// The API answered with a body we could not interpret.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Returns true if the requested path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Failures before the protocol loop starts.
#[derive(Debug, Error)]
pub enum SetupError {
    /// `GIT_DIR` is not set.
    #[error("GIT_DIR is not set")]
    MissingGitDir,

    /// `GIT_DIR` does not point at a git directory.
    #[error("not a git repository: {0}")]
    NotARepository(String),

    /// The URL does not use a supported scheme.
    #[error("unsupported remote URL: {0}")]
    UnsupportedUrl(String),

    /// The URL names a malformed content path.
    #[error("invalid content path: {0}")]
    InvalidPath(String),

    /// The helper configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<config::ConfigError> for SetupError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
