//! git-remote-ipfs - git remote helper for `ipfs://` URLs.
//!
//! Git starts this binary with the remote name and URL, and `GIT_DIR` set to
//! the repository it is operating on.

use anyhow::Context;
use clap::Parser;
use gitipfs_remote::{
    interrupt, logging, resolve_git_dir, CancellationFlag, Engine, HelperConfig, IpfsClient,
    LocalRepository, RemoteLocation, Session,
};
use std::io;

/// Git remote helper that uses IPFS as a remote
#[derive(Parser, Debug)]
#[command(name = "git-remote-ipfs")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the remote
    remote: String,

    /// Remote URL, ipfs://ipfs/<root>[/<path>]
    url: String,
}

fn main() {
    let args = Args::parse();

    let config = match HelperConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log_level, config.log_format);

    if let Err(e) = run(args, &config) {
        eprintln!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args, config: &HelperConfig) -> anyhow::Result<()> {
    tracing::debug!(remote = %args.remote, url = %args.url, "starting");

    let cwd = std::env::current_dir().context("reading the working directory")?;
    let git_dir = resolve_git_dir(std::env::var_os("GIT_DIR").as_deref(), &cwd)?;
    let location = RemoteLocation::parse(&args.url)?;
    let local = LocalRepository::open(&git_dir)?;
    let store = IpfsClient::new(config.api_url.as_str(), config.timeout())
        .with_context(|| format!("creating API client for {}", config.api_url))?;

    let cancel = CancellationFlag::new();
    interrupt::spawn_watcher(cancel.clone()).context("starting interrupt watcher")?;

    let mut session = Session::new(store, location.clone(), local).with_cancellation(cancel);
    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    let result = Engine::new(&mut session, stdin, stdout).run();

    // Pushes land under a new root even when the session fails later.
    if session.location() != &location {
        eprintln!("pushed to {}", session.location().url());
    }
    result?;

    tracing::debug!(location = %session.location(), "session ended");
    Ok(())
}
