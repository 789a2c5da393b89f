use std::future::Future;

use anyhow::{Context, Result};
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// Registers the OS shutdown signal handlers and returns a future that
/// resolves once any of them fires.
///
/// Registration happens eagerly so a signal arriving before the future is
/// polled is not lost.
pub fn wait_shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut quit_signal = signal(SignalKind::quit()).context("Register SIGQUIT handler")?;
    let mut interrupt_signal =
        signal(SignalKind::interrupt()).context("Register SIGINT handler")?;
    let mut terminate_signal =
        signal(SignalKind::terminate()).context("Register SIGTERM handler")?;

    Ok(async move {
        let name = select! {
            _ = quit_signal.recv() => "SIGQUIT",
            _ = interrupt_signal.recv() => "SIGINT",
            _ = terminate_signal.recv() => "SIGTERM",
        };
        info!(signal = name, "Received shutdown signal");
    })
}
