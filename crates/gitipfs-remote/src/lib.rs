//! Git remote helper that uses IPFS as a remote.
//!
//! Git runs `git-remote-ipfs <remote> <url>` for URLs of the form
//! `ipfs://ipfs/<root>[/<path>]` and talks to it over standard input and
//! output. The helper lists refs, fetches objects (loose or packed) into the
//! local repository, and pushes by publishing a new immutable root whose
//! address is reported on standard error.

pub mod config;
pub mod error;
pub mod fetch;
pub mod interrupt;
pub mod local;
pub mod location;
pub mod logging;
pub mod protocol;
pub mod push;
pub mod refs;
pub mod session;
pub mod store;

pub use self::config::HelperConfig;
pub use error::{Error, SetupError, TransportError};
pub use fetch::{FetchContext, LooseStrategy, ObjectFetcher, PackedStrategy, Retrieval};
pub use interrupt::CancellationFlag;
pub use local::LocalRepository;
pub use location::RemoteLocation;
pub use logging::LogFormat;
pub use protocol::{Command, Engine};
pub use push::{PushCommand, PushOrchestrator, PushOutcome, PushReport};
pub use refs::{
    ManifestStrategy, RefListing, RefMapping, RefResolver, RefStrategy, TreeWalkStrategy,
};
pub use session::{resolve_git_dir, Session};
pub use store::{ContentStore, IpfsClient, Link, LinkKind, MemoryStore};

/// Result type for helper operations.
pub type Result<T> = std::result::Result<T, Error>;
