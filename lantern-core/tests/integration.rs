//! Integration tests: session pairs over real TCP on localhost.
//! Covers the greeting gate, roster and status flow, control
//! arbitration and broadcast file transfer.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lantern_core::protocol::screen::{CaptureRect, MouseButton, ScreenFrameMeta};
use lantern_core::screen::{CaptureSelector, CapturedFrame};
use lantern_core::transfer::TransferEvent;
use lantern_core::{
    Collaborators, Connection, FrameSink, FrameSource, InputInjector, LanternError, Message,
    NodeCommand, NodeEvent, PeerAddr, PeerDirectory, PeerRole, SessionConfig, SessionHandle,
    SessionManager, Sighting,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

// ── Helpers ──────────────────────────────────────────────────────

struct SolidSource;

#[async_trait]
impl FrameSource for SolidSource {
    fn monitor_count(&self) -> u32 {
        1
    }

    async fn capture(&mut self, _selector: CaptureSelector) -> Result<CapturedFrame, LanternError> {
        Ok(CapturedFrame {
            rgb: vec![0x55; 8 * 8 * 3],
            width: 8,
            height: 8,
            rect: CaptureRect::new(0, 0, 8, 8),
            monitor_index: 0,
            monitor_count: 1,
        })
    }
}

struct NullSink;

#[async_trait]
impl FrameSink for NullSink {
    async fn render_frame(&mut self, _jpeg: &[u8], _meta: ScreenFrameMeta) -> Result<(), LanternError> {
        Ok(())
    }
}

struct NullInjector;

#[async_trait]
impl InputInjector for NullInjector {
    async fn move_cursor(&mut self, _x: i32, _y: i32) -> Result<(), LanternError> {
        Ok(())
    }
    async fn button_down(&mut self, _button: MouseButton) -> Result<(), LanternError> {
        Ok(())
    }
    async fn button_up(&mut self, _button: MouseButton) -> Result<(), LanternError> {
        Ok(())
    }
    async fn scroll(&mut self, _delta: i32) -> Result<(), LanternError> {
        Ok(())
    }
    async fn key_down(&mut self, _key: &str) -> Result<(), LanternError> {
        Ok(())
    }
    async fn key_up(&mut self, _key: &str) -> Result<(), LanternError> {
        Ok(())
    }
    async fn hotkey(&mut self, _keys: &[String]) -> Result<(), LanternError> {
        Ok(())
    }
}

fn collaborators() -> Collaborators {
    Collaborators {
        source_factory: Box::new(|| Box::new(SolidSource)),
        sink: Box::new(NullSink),
        injector: Box::new(NullInjector),
    }
}

struct TestNode {
    handle: SessionHandle,
    events: mpsc::Receiver<NodeEvent>,
    sightings: mpsc::Sender<Sighting>,
    port: u16,
    dir: tempfile::TempDir,
}

/// Spin up a full session on an OS-assigned port, with its own
/// scratch directory for downloads and the peer directory.
async fn spawn_node(name: &str, allow_control: bool) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        display_name: name.into(),
        mac: format!("{name}-mac"),
        allow_control,
        listen_port: 0,
        download_dir: dir.path().to_path_buf(),
        data_dir: dir.path().to_path_buf(),
    };
    let session = SessionManager::bind(config, collaborators()).unwrap();
    let port = session.local_port().unwrap();
    let handle = session.handle();

    let (sighting_tx, sighting_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(256);
    tokio::spawn(session.run(sighting_rx, event_tx));

    TestNode {
        handle,
        events: event_rx,
        sightings: sighting_tx,
        port,
        dir,
    }
}

fn localhost(port: u16) -> PeerAddr {
    PeerAddr::new(IpAddr::from([127, 0, 0, 1]), port)
}

/// Feed `dialer` a discovery sighting of `target`, as the beacon
/// listener would.
async fn introduce(dialer: &TestNode, target: &TestNode) {
    dialer
        .sightings
        .send(Sighting {
            addr: localhost(target.port),
            display_name: "beacon".into(),
        })
        .await
        .unwrap();
}

/// Wait until `pick` claims an event, discarding the rest.
async fn wait_for<T>(
    events: &mut mpsc::Receiver<NodeEvent>,
    mut pick: impl FnMut(NodeEvent) -> Option<T>,
) -> T {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if let Some(out) = pick(event) {
                return out;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn wait_for_join(events: &mut mpsc::Receiver<NodeEvent>) -> lantern_core::Peer {
    wait_for(events, |event| match event {
        NodeEvent::PeerJoined(peer) => Some(peer),
        _ => None,
    })
    .await
}

/// Assert that nothing happens on this node for `window`.
async fn expect_quiet(events: &mut mpsc::Receiver<NodeEvent>, window: Duration) {
    if let Ok(Some(event)) = timeout(window, events.recv()).await {
        panic!("unexpected event: {event:?}");
    }
}

async fn drain_until_quiet(events: &mut mpsc::Receiver<NodeEvent>, window: Duration) {
    while let Ok(Some(_)) = timeout(window, events.recv()).await {}
}

// ── Greeting gate ────────────────────────────────────────────────

#[tokio::test]
async fn link_is_mute_until_greeted() {
    let mut bob = spawn_node("bob", true).await;

    // A hand-rolled client, so the greeting timing is ours to pick.
    let mut conn = Connection::connect(localhost(bob.port)).await.unwrap();

    // The session greets immediately on accept.
    let frame = timeout(Duration::from_secs(5), conn.recv())
        .await
        .expect("timeout")
        .expect("link closed");
    let (message, _) = Message::from_frame(frame).unwrap();
    match message {
        Message::Greeting(identity) => {
            assert_eq!(identity.display_name, "bob");
            assert_eq!(identity.mac, "bob-mac");
            assert_eq!(identity.role, PeerRole::Follower);
        }
        other => panic!("expected a greeting, got {other}"),
    }

    // Chat before our greeting goes nowhere.
    conn.send(Message::PlainText("early".into()).into_frame().unwrap())
        .await
        .unwrap();
    expect_quiet(&mut bob.events, Duration::from_millis(300)).await;

    // Greet, and the same chat gets through under our name.
    let identity = lantern_core::PeerIdentity::new("raw", "raw-mac", PeerRole::Follower);
    conn.send(Message::Greeting(identity).into_frame().unwrap())
        .await
        .unwrap();
    let joined = wait_for_join(&mut bob.events).await;
    assert_eq!(joined.display_name, "raw");
    assert!(joined.online);

    conn.send(Message::PlainText("hello".into()).into_frame().unwrap())
        .await
        .unwrap();
    let (from, text) = wait_for(&mut bob.events, |event| match event {
        NodeEvent::Chat { from, text } => Some((from, text)),
        _ => None,
    })
    .await;
    assert_eq!(from, "raw");
    assert_eq!(text, "hello");

    // The greeting's MAC landed in the peer directory, keyed by IP.
    let directory = PeerDirectory::in_dir(bob.dir.path());
    assert_eq!(
        directory.lookup("127.0.0.1".parse().unwrap()).as_deref(),
        Some("raw-mac")
    );
}

#[tokio::test]
async fn undecodable_messages_leave_the_link_up() {
    let mut bob = spawn_node("bob", true).await;

    let mut conn = Connection::connect(localhost(bob.port)).await.unwrap();
    let _their_greeting = timeout(Duration::from_secs(5), conn.recv())
        .await
        .expect("timeout")
        .expect("link closed");

    let identity = lantern_core::PeerIdentity::new("raw", "raw-mac", PeerRole::Follower);
    conn.send(Message::Greeting(identity).into_frame().unwrap())
        .await
        .unwrap();
    wait_for_join(&mut bob.events).await;

    // CBOR map { "Wormhole": 1 }, a tag nobody speaks.
    let bogus = lantern_core::Frame::structured_only(Bytes::from_static(b"\xa1\x68Wormhole\x01"));
    conn.send(bogus).await.unwrap();

    // Not CBOR at all.
    let garbage = lantern_core::Frame::structured_only(Bytes::from_static(b"\xff\xff\xff"));
    conn.send(garbage).await.unwrap();

    // The link survives both; a chat still goes through.
    conn.send(Message::PlainText("still here".into()).into_frame().unwrap())
        .await
        .unwrap();
    let text = wait_for(&mut bob.events, |event| match event {
        NodeEvent::Chat { text, .. } => Some(text),
        _ => None,
    })
    .await;
    assert_eq!(text, "still here");
}

// ── Roster and status ────────────────────────────────────────────

#[tokio::test]
async fn sessions_exchange_roster_and_status() {
    let mut alice = spawn_node("alice", true).await;
    let mut bob = spawn_node("bob", true).await;

    introduce(&alice, &bob).await;

    let bob_entry = wait_for_join(&mut alice.events).await;
    assert_eq!(bob_entry.display_name, "bob");
    assert_eq!(bob_entry.mac, "bob-mac");
    assert_eq!(bob_entry.roster_line(), format!("bob@127.0.0.1:{} // bob-mac", bob.port));

    let alice_entry = wait_for_join(&mut bob.events).await;
    assert_eq!(alice_entry.display_name, "alice");

    // Repeat sighting of a connected address must not re-join.
    introduce(&alice, &bob).await;
    expect_quiet(&mut alice.events, Duration::from_millis(300)).await;

    // Status flows with its history.
    alice
        .handle
        .send(NodeCommand::SetStatus("busy".into()))
        .await
        .unwrap();
    let change = wait_for(&mut bob.events, |event| match event {
        NodeEvent::StatusChanged {
            from,
            previous,
            current,
        } => Some((from, previous, current)),
        _ => None,
    })
    .await;
    assert_eq!(change, ("alice".into(), "".into(), "busy".into()));

    alice
        .handle
        .send(NodeCommand::SetStatus("back".into()))
        .await
        .unwrap();
    let change = wait_for(&mut bob.events, |event| match event {
        NodeEvent::StatusChanged {
            previous, current, ..
        } => Some((previous, current)),
        _ => None,
    })
    .await;
    assert_eq!(change, ("busy".into(), "back".into()));

    // Roster snapshot agrees.
    let (reply_tx, reply_rx) = oneshot::channel();
    bob.handle.send(NodeCommand::ListPeers(reply_tx)).await.unwrap();
    let roster = reply_rx.await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].status, "back");

    // Stopping a session takes its peer offline on the other side.
    alice.handle.stop();
    let departed = wait_for(&mut bob.events, |event| match event {
        NodeEvent::PeerLeft(peer) => Some(peer),
        _ => None,
    })
    .await;
    assert_eq!(departed.display_name, "alice");
    assert!(!departed.online);
}

// ── Remote control ───────────────────────────────────────────────

#[tokio::test]
async fn control_session_streams_and_releases() {
    let mut alice = spawn_node("alice", true).await;
    let mut bob = spawn_node("bob", true).await;

    introduce(&bob, &alice).await;
    let alice_as_bob_sees = wait_for_join(&mut bob.events).await;
    wait_for_join(&mut alice.events).await;

    bob.handle
        .send(NodeCommand::RequestControl(alice_as_bob_sees.addr))
        .await
        .unwrap();

    let granted_by = wait_for(&mut bob.events, |event| match event {
        NodeEvent::ControlGranted { peer } => Some(peer),
        _ => None,
    })
    .await;
    assert_eq!(granted_by, alice_as_bob_sees.addr);

    wait_for(&mut alice.events, |event| match event {
        NodeEvent::ControlStarted { peer } => Some(peer),
        _ => None,
    })
    .await;

    // Frames flow until the release.
    for _ in 0..3 {
        wait_for(&mut bob.events, |event| match event {
            NodeEvent::Viewing { fps, .. } => Some(fps),
            _ => None,
        })
        .await;
    }

    // Retiming the capture loop must not disturb the stream.
    bob.handle.send(NodeCommand::SetFps(10)).await.unwrap();
    wait_for(&mut bob.events, |event| match event {
        NodeEvent::Viewing { .. } => Some(()),
        _ => None,
    })
    .await;

    bob.handle.send(NodeCommand::ReleaseControl).await.unwrap();
    wait_for(&mut bob.events, |event| match event {
        NodeEvent::ControlEnded { .. } => Some(()),
        _ => None,
    })
    .await;
    wait_for(&mut alice.events, |event| match event {
        NodeEvent::ControlEnded { .. } => Some(()),
        _ => None,
    })
    .await;

    // No more frames once the session is over.
    drain_until_quiet(&mut bob.events, Duration::from_millis(300)).await;
    expect_quiet(&mut bob.events, Duration::from_millis(500)).await;
}

#[tokio::test]
async fn control_is_exclusive_until_released() {
    let mut alice = spawn_node("alice", true).await;
    let mut bob = spawn_node("bob", true).await;
    let mut carol = spawn_node("carol", true).await;

    introduce(&bob, &alice).await;
    let alice_as_bob_sees = wait_for_join(&mut bob.events).await;
    introduce(&carol, &alice).await;
    let alice_as_carol_sees = wait_for_join(&mut carol.events).await;

    bob.handle
        .send(NodeCommand::RequestControl(alice_as_bob_sees.addr))
        .await
        .unwrap();
    wait_for(&mut bob.events, |event| match event {
        NodeEvent::ControlGranted { .. } => Some(()),
        _ => None,
    })
    .await;

    // Alice is taken; carol gets the busy signal.
    carol
        .handle
        .send(NodeCommand::RequestControl(alice_as_carol_sees.addr))
        .await
        .unwrap();
    let denied_by = wait_for(&mut carol.events, |event| match event {
        NodeEvent::ControlDenied { peer } => Some(peer),
        _ => None,
    })
    .await;
    assert_eq!(denied_by, alice_as_carol_sees.addr);

    // Once bob lets go, the same request succeeds.
    bob.handle.send(NodeCommand::ReleaseControl).await.unwrap();
    wait_for(&mut alice.events, |event| match event {
        NodeEvent::ControlEnded { .. } => Some(()),
        _ => None,
    })
    .await;

    carol
        .handle
        .send(NodeCommand::RequestControl(alice_as_carol_sees.addr))
        .await
        .unwrap();
    wait_for(&mut carol.events, |event| match event {
        NodeEvent::ControlGranted { .. } => Some(()),
        _ => None,
    })
    .await;
}

// ── File transfer ────────────────────────────────────────────────

#[tokio::test]
async fn file_broadcast_reaches_every_peer() {
    let mut alice = spawn_node("alice", true).await;
    let mut bob = spawn_node("bob", true).await;
    let mut carol = spawn_node("carol", true).await;

    introduce(&alice, &bob).await;
    introduce(&alice, &carol).await;
    wait_for_join(&mut alice.events).await;
    wait_for_join(&mut alice.events).await;
    wait_for_join(&mut bob.events).await;
    wait_for_join(&mut carol.events).await;

    let content: Vec<u8> = (0..450_000u32).map(|i| (i % 251) as u8).collect();
    let source = alice.dir.path().join("handbook.pdf");
    std::fs::write(&source, &content).unwrap();

    alice
        .handle
        .send(NodeCommand::SendFile(source))
        .await
        .unwrap();

    for node in [&mut bob, &mut carol] {
        let path = wait_for(&mut node.events, |event| match event {
            NodeEvent::Transfer(TransferEvent::ReceiveFinished { path, filename }) => {
                assert_eq!(filename, "handbook.pdf");
                Some(path)
            }
            _ => None,
        })
        .await;
        assert_eq!(std::fs::read(&path).unwrap(), content);
    }

    let sent = wait_for(&mut alice.events, |event| match event {
        NodeEvent::Transfer(TransferEvent::SendFinished { filename }) => Some(filename),
        _ => None,
    })
    .await;
    assert_eq!(sent, "handbook.pdf");
}
