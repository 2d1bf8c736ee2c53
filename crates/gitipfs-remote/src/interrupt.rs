//! Interrupt handling.
//!
//! The first interrupt sets a flag the protocol engine checks between
//! commands. A second interrupt exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Exit status used when a second interrupt forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Starts a thread that turns Ctrl-C into cancellation requests.
pub fn spawn_watcher(flag: CancellationFlag) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("interrupt-watcher".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot start interrupt watcher");
                    return;
                }
            };
            runtime.block_on(async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::warn!(error = %e, "cannot listen for interrupts");
                        return;
                    }
                    if flag.is_cancelled() {
                        eprintln!("interrupted again, exiting");
                        std::process::exit(FORCED_EXIT_CODE);
                    }
                    tracing::warn!("interrupt received, stopping after the current command");
                    flag.cancel();
                }
            });
        })
}
