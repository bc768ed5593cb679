//! `embermug watch`: copy snapshot lines from a running service to stdout.

use std::path::Path;

use embermug_config::Config;
use embermug_core::Snapshot;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::shutdown;

/// Connect to the service socket, mapping failure to a diagnostic.
pub async fn connect(path: &Path) -> Result<UnixStream, CliError> {
    UnixStream::connect(path)
        .await
        .map_err(|source| CliError::ServiceUnavailable {
            path: path.to_path_buf(),
            source,
        })
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let path = super::socket_path(global, cfg);
    let stream = connect(&path).await?;
    let mut lines = BufReader::new(stream).lines();
    let mut stdout = tokio::io::stdout();

    let cancel = CancellationToken::new();
    let signals = shutdown::cancel_on_signals(cancel.clone())?;

    let result: Result<(), CliError> = async {
        loop {
            let line = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("service closed the connection");
                return Ok(());
            };

            // Reject anything that is not a snapshot before passing it on.
            let _: Snapshot = serde_json::from_str(&line)?;
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;

            if args.once {
                return Ok(());
            }
        }
    }
    .await;

    cancel.cancel();
    let _ = signals.await;
    match result {
        Err(CliError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}
