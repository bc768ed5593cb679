#![allow(clippy::unwrap_used)]

// End-to-end tests: a `Service` on a real Unix socket in a temp dir,
// driven through the mock transport.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use embermug_api::mock::{MockAdapter, MockPeripheral};
use embermug_api::{DeviceAddress, Event, Temperature};
use embermug_core::{CoreError, Service, ServiceConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const ADDRESS: DeviceAddress = DeviceAddress::new([0xC8, 0x6E, 0x14, 0xA0, 0x3B, 0x7F]);
const TIMEOUT: Duration = Duration::from_secs(2);

struct Running {
    adapter: MockAdapter,
    mug: MockPeripheral,
    service: Arc<Service<MockAdapter>>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), CoreError>>,
    _dir: tempfile::TempDir,
    socket: std::path::PathBuf,
}

fn start(failing_connects: usize) -> Running {
    let adapter = MockAdapter::new();
    let mug = MockPeripheral::new(ADDRESS);
    adapter.add_device(mug.clone());
    adapter.fail_next_connects(failing_connects);

    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("embermug.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let service = Arc::new(Service::new(adapter.clone(), ServiceConfig::new(ADDRESS)));
    let cancel = CancellationToken::new();
    let task = {
        let service = Arc::clone(&service);
        let cancel = cancel.clone();
        tokio::spawn(async move { service.run(listener, cancel).await })
    };

    Running {
        adapter,
        mug,
        service,
        cancel,
        task,
        _dir: dir,
        socket,
    }
}

async fn open(socket: &Path) -> (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
    let stream = UnixStream::connect(socket).await.unwrap();
    let (read, write) = stream.into_split();
    (BufReader::new(read).lines(), write)
}

async fn next_json(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Option<serde_json::Value> {
    let line = tokio::time::timeout(TIMEOUT, lines.next_line())
        .await
        .unwrap()
        .unwrap()?;
    Some(serde_json::from_str(&line).unwrap())
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn clients_follow_the_mug_and_can_request_reconnect() {
    let running = start(10);
    // Initial connect used up all ten attempts before anyone connected.
    wait_for(|| running.adapter.connect_calls() == 10).await;

    let (mut lines, mut write) = open(&running.socket).await;
    let greeting = next_json(&mut lines).await.unwrap();
    assert_eq!(greeting["Connected"], false);

    running.service.manager().connect().await.unwrap();
    let connected = next_json(&mut lines).await.unwrap();
    assert_eq!(connected["Connected"], true);
    assert_eq!(connected["Current"], 2130);
    assert_eq!(connected["Battery"]["Charge"], 50);

    running.mug.set_current_temperature(Temperature::from_raw(2200));
    running.mug.push_event(Event::RefreshTemperature);
    let warmer = next_json(&mut lines).await.unwrap();
    assert_eq!(warmer["Current"], 2200);
    assert_eq!(warmer["State"], connected["State"]);

    let before = running.adapter.connect_calls();
    write.write_all(b"{\"Reconnect\":true}\n").await.unwrap();
    wait_for(|| running.adapter.connect_calls() > before).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(running.adapter.connect_calls(), before + 1);

    running.cancel.cancel();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn late_clients_are_greeted_with_the_current_state() {
    let running = start(0);
    let (mut first, _w1) = open(&running.socket).await;
    // The first greeting may predate the initial connect.
    let mut snapshot = next_json(&mut first).await.unwrap();
    while snapshot["Connected"] != true {
        snapshot = next_json(&mut first).await.unwrap();
    }

    let (mut second, _w2) = open(&running.socket).await;
    let greeting = next_json(&mut second).await.unwrap();
    assert_eq!(greeting, snapshot);

    running.cancel.cancel();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn cancellation_closes_clients_and_releases_the_mug() {
    let running = start(0);
    let (mut a, _wa) = open(&running.socket).await;
    let (mut b, _wb) = open(&running.socket).await;
    next_json(&mut a).await.unwrap();
    next_json(&mut b).await.unwrap();
    wait_for(|| running.mug.is_subscribed() && running.service.registry().len() == 2).await;

    running.cancel.cancel();
    tokio::time::timeout(TIMEOUT, running.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    for lines in [&mut a, &mut b] {
        loop {
            match tokio::time::timeout(TIMEOUT, lines.next_line()).await.unwrap() {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
    }
    assert_eq!(running.mug.unsubscribe_calls(), 1);
    assert_eq!(running.mug.disconnect_calls(), 1);
    assert!(running.service.registry().is_empty());
}

#[tokio::test]
async fn run_returns_cleanly_with_no_device() {
    let running = start(usize::MAX);
    wait_for(|| running.adapter.connect_calls() >= 10).await;

    running.cancel.cancel();
    running.task.await.unwrap().unwrap();
    assert_eq!(running.mug.disconnect_calls(), 0);
}
