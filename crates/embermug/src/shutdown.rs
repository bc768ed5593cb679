//! Signal handling.
//!
//! SIGTERM and SIGINT cancel the root token; every long-running command
//! derives its scopes from that token, so one signal unwinds everything.

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;

/// Cancel `cancel` on the first SIGTERM or SIGINT.
///
/// The returned task also finishes when `cancel` fires for another reason.
pub fn cancel_on_signals(cancel: CancellationToken) -> Result<JoinHandle<()>, CliError> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
        cancel.cancel();
    }))
}
