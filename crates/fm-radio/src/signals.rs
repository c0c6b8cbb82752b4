//! SIGINT / SIGTERM handling.
//!
//! The control loop is synchronous; signals are awaited on a helper thread
//! running a current-thread tokio runtime, which trips the shared
//! [`StopSignal`] and exits.

use std::thread;

use anyhow::Context;
use tokio::signal::unix::{signal, SignalKind};
use transmitter::StopSignal;

/// Spawn the watcher thread. The returned handle may be dropped.
pub fn watch(stop: StopSignal) -> anyhow::Result<thread::JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    // Register in this thread so a signal arriving before the watcher is
    // scheduled is not lost.
    let (mut interrupt, mut terminate) = runtime.block_on(async {
        Ok::<_, std::io::Error>((
            signal(SignalKind::interrupt())?,
            signal(SignalKind::terminate())?,
        ))
    })
    .context("installing signal handlers")?;

    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            let name = runtime.block_on(async {
                tokio::select! {
                    _ = interrupt.recv() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                }
            });
            tracing::info!(signal = name, "stop requested");
            stop.trip();
        })
        .context("spawning signal thread")
}
