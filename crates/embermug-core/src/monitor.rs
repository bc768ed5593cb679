// ── Monitor ──
//
// Single-consumer alternative to the service: take the mug directly and
// write its state as JSON lines to one sink. Useful for scripting and for
// checking a mug without running the daemon.

use embermug_api::{Adapter, Mug};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWrite;
use tokio_util::codec::{FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::connection::connect_with_retry;
use crate::error::CoreError;
use crate::protocol::Snapshot;
use crate::tracker::StateTracker;

/// Connect, refresh, and write a snapshot line now and after every change,
/// until `cancel` fires or the mug stops sending events.
pub async fn monitor<A, W>(
    adapter: &A,
    config: &ServiceConfig,
    out: W,
    cancel: CancellationToken,
) -> Result<(), CoreError>
where
    A: Adapter,
    W: AsyncWrite + Unpin,
{
    let peripheral = connect_with_retry(adapter, config).await?;
    let mug = Mug::new(peripheral).await?;
    let mut events = mug.events().await?;
    info!(address = %mug.address(), "monitoring mug");

    let mut tracker = StateTracker::new();
    tracker.set_connected(true);
    tracker.refresh(&mug).await;

    let mut lines = FramedWrite::new(out, LinesCodec::new());
    let mut result = write(&mut lines, tracker.snapshot()).await;

    while result.is_ok() {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            item = events.next() => item,
        };
        let Some(item) = item else {
            debug!("event stream ended");
            break;
        };

        match item {
            Ok(event) => match tracker.apply_event(&mug, event).await {
                Ok(true) => result = write(&mut lines, tracker.snapshot()).await,
                Ok(false) => {}
                Err(e) => warn!(%event, error = %e, "failed to apply mug event"),
            },
            Err(e) => warn!(error = %e, "ignoring malformed mug event"),
        }
    }

    for (step, outcome) in [
        ("stop event notifications", mug.stop_events().await),
        ("disconnect", mug.close().await),
    ] {
        match outcome {
            Err(e) if !e.is_disconnected() => warn!(step, error = %e, "mug teardown step failed"),
            _ => {}
        }
    }

    result
}

async fn write<W: AsyncWrite + Unpin>(
    lines: &mut FramedWrite<W, LinesCodec>,
    snapshot: &Snapshot,
) -> Result<(), CoreError> {
    let line = serde_json::to_string(snapshot).map_err(|e| CoreError::Protocol {
        message: e.to_string(),
    })?;
    lines.send(line).await.map_err(|e| match e {
        LinesCodecError::Io(e) => CoreError::Io(e),
        LinesCodecError::MaxLineLengthExceeded => CoreError::Protocol {
            message: e.to_string(),
        },
    })
}
