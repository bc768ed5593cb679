// ── Client session ──
//
// Serves one accepted socket: greet with the current snapshot, then
// forward every update while a reader task decodes control messages.
// The session ends when its scope is cancelled, a write fails, or the
// reader hits a protocol violation. End of input from the client only
// stops the reader; updates keep flowing until a write fails.
//
// Every write and every reconnect request is raced against the scope, so
// a client that stops reading can still be cancelled.

use std::sync::Arc;

use embermug_api::Adapter;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::error::CoreError;
use crate::protocol::{MAX_LINE_LENGTH, Message, Snapshot};
use crate::registry::{Client, ClientRegistry};

const MESSAGE_QUEUE_SIZE: usize = 16;

type Lines<S> = FramedWrite<WriteHalf<S>, LinesCodec>;

/// Run the session for `client` over `stream` until it ends, then
/// cancel the client's scope and remove it from `registry`.
pub async fn serve<S, A>(
    stream: S,
    client: Client,
    manager: ConnectionManager<A>,
    registry: ClientRegistry,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
    A: Adapter,
{
    let Client {
        id,
        cancel,
        greeting,
        mut updates,
    } = client;
    debug!(client_id = %id, "session started");

    let (reader, writer) = tokio::io::split(stream);
    let mut lines = FramedWrite::new(writer, LinesCodec::new());
    let mut reader_task = None;

    let greeted = until_cancelled(&cancel, send(&mut lines, &greeting)).await;
    match greeted {
        None => {}
        Some(Err(e)) => report(&id, "greeting", &e),
        Some(Ok(())) => {
            let (tx, mut messages) = mpsc::channel(MESSAGE_QUEUE_SIZE);
            let frames = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
            reader_task = Some(tokio::spawn(read_messages(
                frames,
                tx,
                cancel.clone(),
                id.clone(),
            )));

            let mut last_sent = greeting;
            let mut reading = true;
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    message = messages.recv(), if reading => {
                        match message {
                            Some(message) => {
                                if until_cancelled(&cancel, handle_message(&id, message, &manager))
                                    .await
                                    .is_none()
                                {
                                    break;
                                }
                            }
                            None => reading = false,
                        }
                    }
                    update = updates.recv() => {
                        let Some(snapshot) = update else {
                            debug!(client_id = %id, "removed from registry");
                            break;
                        };
                        // A dispatch racing registration repeats the greeting.
                        if Arc::ptr_eq(&snapshot, &last_sent) {
                            continue;
                        }
                        let sent = until_cancelled(&cancel, send(&mut lines, &snapshot)).await;
                        match sent {
                            None => break,
                            Some(Err(e)) => {
                                report(&id, "update", &e);
                                break;
                            }
                            Some(Ok(())) => last_sent = snapshot,
                        }
                    }
                }
            }
        }
    }

    // ── Teardown ──
    cancel.cancel();
    registry.remove(&id);
    // Dropped unflushed: a peer that stopped reading cannot hold us here.
    drop(lines);
    if let Some(task) = reader_task {
        let _ = task.await;
    }
    debug!(client_id = %id, "session closed");
}

/// Run `fut` unless `cancel` fires first.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

async fn send<S: AsyncWrite>(lines: &mut Lines<S>, snapshot: &Snapshot) -> Result<(), CoreError> {
    let line = serde_json::to_string(snapshot).map_err(|e| CoreError::Protocol {
        message: e.to_string(),
    })?;
    lines.send(line).await.map_err(codec_error)
}

fn codec_error(err: LinesCodecError) -> CoreError {
    match err {
        LinesCodecError::Io(e) => CoreError::Io(e),
        LinesCodecError::MaxLineLengthExceeded => CoreError::Protocol {
            message: format!("line longer than {MAX_LINE_LENGTH} bytes"),
        },
    }
}

/// Hangups end a session quietly; anything else is worth a warning.
fn report(id: &str, stage: &str, err: &CoreError) {
    if err.is_hangup() {
        debug!(client_id = %id, stage, "client hung up");
    } else {
        warn!(client_id = %id, stage, error = %err, "client session failed");
    }
}

async fn handle_message<A: Adapter>(id: &str, message: Message, manager: &ConnectionManager<A>) {
    if !message.reconnect {
        return;
    }
    info!(client_id = %id, "client requested reconnect");
    match manager.connect().await {
        Ok(_) => debug!(client_id = %id, "reconnect succeeded"),
        Err(e) => warn!(client_id = %id, error = %e, "reconnect failed"),
    }
}

/// Decode control messages until end of input, cancellation, or a
/// protocol violation. Violations and socket errors cancel the session.
async fn read_messages<R: AsyncRead + Unpin>(
    mut frames: FramedRead<R, LinesCodec>,
    messages: mpsc::Sender<Message>,
    cancel: CancellationToken,
    id: String,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };

        match frame {
            None => {
                debug!(client_id = %id, "client closed its side");
                break;
            }
            Some(Ok(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Message>(&line) {
                    Ok(message) => {
                        if messages.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(client_id = %id, error = %e, "undecodable client message");
                        cancel.cancel();
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                report(&id, "read", &codec_error(e));
                cancel.cancel();
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::time::Duration;

    use embermug_api::mock::{MockAdapter, MockPeripheral};
    use embermug_api::{DeviceAddress, Event, Temperature};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::task::JoinHandle;

    use super::*;
    use crate::config::ServiceConfig;

    const ADDRESS: DeviceAddress = DeviceAddress::new([0xC8, 0x6E, 0x14, 0xA0, 0x3B, 0x7F]);

    struct Harness {
        adapter: MockAdapter,
        mug: MockPeripheral,
        manager: ConnectionManager<MockAdapter>,
        registry: ClientRegistry,
        root: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            let adapter = MockAdapter::new();
            let mug = MockPeripheral::new(ADDRESS);
            adapter.add_device(mug.clone());
            let registry = ClientRegistry::new();
            let manager =
                ConnectionManager::new(adapter.clone(), ServiceConfig::new(ADDRESS), registry.clone());
            Self {
                adapter,
                mug,
                manager,
                registry,
                root: CancellationToken::new(),
            }
        }

        fn open(&self) -> (DuplexStream, String, CancellationToken, JoinHandle<()>) {
            let (ours, theirs) = tokio::io::duplex(4096);
            let client = self.registry.register(&self.root);
            let id = client.id.clone();
            let cancel = client.cancel.clone();
            let task = tokio::spawn(serve(
                theirs,
                client,
                self.manager.clone(),
                self.registry.clone(),
            ));
            (ours, id, cancel, task)
        }
    }

    async fn next_json<R: AsyncRead + Unpin>(
        lines: &mut tokio::io::Lines<BufReader<R>>,
    ) -> Option<serde_json::Value> {
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()?;
        Some(serde_json::from_str(&line).unwrap())
    }

    #[tokio::test]
    async fn greets_then_streams_changes_and_honours_reconnect() {
        let h = Harness::new();
        h.adapter.fail_next_connects(10);
        let (stream, _, _, _task) = h.open();
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();

        let greeting = next_json(&mut lines).await.unwrap();
        assert_eq!(greeting["Connected"], false);

        assert!(h.manager.connect().await.is_err());
        h.manager.connect().await.unwrap();
        let connected = next_json(&mut lines).await.unwrap();
        assert_eq!(connected["Connected"], true);
        assert_eq!(connected["Current"], 2130);

        h.mug.set_current_temperature(Temperature::from_raw(2200));
        h.mug.push_event(Event::RefreshTemperature);
        let warmer = next_json(&mut lines).await.unwrap();
        assert_eq!(warmer["Current"], 2200);
        assert_eq!(warmer["State"], connected["State"]);

        let calls = h.adapter.connect_calls();
        write.write_all(b"{\"Reconnect\":true}\n").await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while h.adapter.connect_calls() == calls {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.adapter.connect_calls(), calls + 1);
    }

    #[tokio::test]
    async fn half_close_keeps_updates_flowing() {
        let h = Harness::new();
        let (stream, id, _, _task) = h.open();
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        next_json(&mut lines).await.unwrap();

        write.shutdown().await.unwrap();
        h.manager.connect().await.unwrap();
        let update = next_json(&mut lines).await.unwrap();
        assert_eq!(update["Connected"], true);
        assert!(h.registry.contains(&id));
    }

    #[tokio::test]
    async fn garbage_input_ends_the_session() {
        let h = Harness::new();
        let (stream, id, cancel, task) = h.open();
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        next_json(&mut lines).await.unwrap();

        write.write_all(b"this is not json\n").await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert!(cancel.is_cancelled());
        assert!(!h.registry.contains(&id));
        assert!(next_json(&mut lines).await.is_none());
    }

    #[tokio::test]
    async fn parent_cancellation_closes_the_socket() {
        let h = Harness::new();
        let (stream, id, _, task) = h.open();
        let mut lines = BufReader::new(stream).lines();
        next_json(&mut lines).await.unwrap();

        h.root.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(next_json(&mut lines).await.is_none());
        assert!(!h.registry.contains(&id));
    }

    fn spawn_over(h: &Harness, stream: DuplexStream) -> (String, JoinHandle<()>) {
        let client = h.registry.register(&h.root);
        let id = client.id.clone();
        let task = tokio::spawn(serve(stream, client, h.manager.clone(), h.registry.clone()));
        (id, task)
    }

    #[tokio::test]
    async fn cancellation_reaches_a_client_that_never_reads() {
        let h = Harness::new();
        // Too small for the greeting, and nobody reads the other end.
        let (_ours, theirs) = tokio::io::duplex(16);
        let (id, task) = spawn_over(&h, theirs);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        h.root.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!h.registry.contains(&id));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_blocked_update() {
        let h = Harness::new();
        let (_ours, theirs) = tokio::io::duplex(512);
        let (id, task) = spawn_over(&h, theirs);

        for current in [2100, 2150, 2200, 2250, 2300] {
            h.registry
                .dispatch(Snapshot {
                    connected: true,
                    current: Temperature::from_raw(current),
                    ..Snapshot::default()
                })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        h.root.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!h.registry.contains(&id));
    }

    #[tokio::test]
    async fn broken_pipe_on_greeting_ends_quietly() {
        let h = Harness::new();
        let mock = tokio_test::io::Builder::new()
            .write_error(io::Error::from(io::ErrorKind::BrokenPipe))
            .build();
        let client = h.registry.register(&h.root);
        let id = client.id.clone();

        tokio::time::timeout(
            Duration::from_secs(2),
            serve(mock, client, h.manager.clone(), h.registry.clone()),
        )
        .await
        .unwrap();
        assert!(!h.registry.contains(&id));
    }

    #[tokio::test]
    async fn unrelated_messages_are_ignored() {
        let h = Harness::new();
        let (stream, id, _, _task) = h.open();
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        next_json(&mut lines).await.unwrap();

        write
            .write_all(b"\n{\"Reconnect\":false}\n{}\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.adapter.connect_calls(), 0);
        assert!(h.registry.contains(&id));
    }
}
