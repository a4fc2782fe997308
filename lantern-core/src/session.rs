//! Session management: one task owns every piece of mutable state.
//!
//! ```text
//! discovery ──Sighting──►┐
//! accept    ──Opened────►│
//! pumps     ──Inbound───►├──► dispatcher ──► NodeEvent
//! handle    ──Command───►│    (peers, arbitrator,    │
//! timer     ──tick──────►┘     transfers, streamer)  └──► outbound frames
//! ```
//!
//! Links, the peer roster, the control arbitrator and the transfer
//! table all live inside the dispatcher loop, so no lock guards any
//! of them. Reader and writer tasks per link, the accept loop and
//! dialing tasks only ever talk to the dispatcher through its inbox.
//!
//! A link becomes a peer when its greeting arrives. Until then it can
//! send nothing else; after that, everything. Each side greets exactly
//! once, immediately after the link opens.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::control::{BreakOutcome, ControlArbitrator, ControlVerdict};
use crate::discovery::Sighting;
use crate::error::LanternError;
use crate::frame::Frame;
use crate::message::{ControlAction, Message};
use crate::network::connection::{CHANNEL_CAPACITY, apply_buffer_hints};
use crate::network::{Connection, PeerAddr};
use crate::peers::{Peer, PeerDirectory, PeerIdentity};
use crate::protocol::screen::{CaptureRect, KeyboardEvent, MouseEvent, ScreenFrameMeta};
use crate::screen::{
    DEFAULT_FRAME_INTERVAL, FrameSink, FrameSource, InputInjector, ScreenStreamer,
    StreamerCommand, ViewportTracker, inject_keyboard, inject_mouse,
};
use crate::transfer::{TransferEvent, TransferTable, send_file};

/// How often the dispatcher checks the viewport for staleness.
const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(1);

// ── Configuration ─────────────────────────────────────────────────

/// How a node presents itself and where it keeps its files.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name sent in greetings and discovery beacons.
    pub display_name: String,

    /// MAC sent in greetings and persisted by receivers.
    pub mac: String,

    /// Whether incoming control requests may be granted.
    pub allow_control: bool,

    /// Session listen port, `0` for an OS-assigned one.
    pub listen_port: u16,

    /// Where finished file transfers land.
    pub download_dir: PathBuf,

    /// Where the peer directory file lives.
    pub data_dir: PathBuf,
}

// ── Commands and events ───────────────────────────────────────────

/// Instructions from the embedding application.
#[derive(Debug)]
pub enum NodeCommand {
    /// Broadcast a chat line to every greeted peer.
    SendChat(String),

    /// Broadcast a status change to every greeted peer.
    SetStatus(String),

    /// Stream a file to every greeted peer.
    SendFile(PathBuf),

    /// Ask one peer for control of its desktop.
    RequestControl(PeerAddr),

    /// End the active control session, whichever side we are.
    ReleaseControl,

    /// Toggle whether incoming control requests are granted.
    AllowRemoteControl(bool),

    /// Retime the viewed peer's capture loop. Zero is refused.
    SetFps(u32),

    /// Point the viewed peer's capture at one monitor.
    SelectMonitor(i32),

    /// Point the viewed peer's capture at a rectangle.
    SetCaptureRegion(CaptureRect),

    /// Drive the peer we control.
    SendMouse(MouseEvent),

    /// Type on the peer we control.
    SendKeyboard(KeyboardEvent),

    /// Snapshot of the roster, online and offline entries both.
    ListPeers(oneshot::Sender<Vec<Peer>>),
}

/// What the session reports back to the embedding application.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    PeerJoined(Peer),
    PeerLeft(Peer),
    Chat {
        from: String,
        text: String,
    },
    StatusChanged {
        from: String,
        previous: String,
        current: String,
    },
    /// A peer granted our control request; its frames will follow.
    ControlGranted {
        peer: PeerAddr,
    },
    /// A peer refused our control request.
    ControlDenied {
        peer: PeerAddr,
    },
    /// We started streaming our desktop to a peer.
    ControlStarted {
        peer: PeerAddr,
    },
    /// The active control session ended, on either side.
    ControlEnded {
        peer: PeerAddr,
    },
    /// A frame was presented; `fps` is the rolling reading rate.
    Viewing {
        from: PeerAddr,
        fps: f64,
    },
    /// No frame has arrived for the liveness window.
    ViewportStale {
        from: PeerAddr,
    },
    Transfer(TransferEvent),
}

// ── Collaborators ─────────────────────────────────────────────────

/// Builds a fresh frame source for each streaming session.
pub type FrameSourceFactory = Box<dyn Fn() -> Box<dyn FrameSource> + Send + Sync>;

/// Platform pieces the embedding application supplies.
pub struct Collaborators {
    pub source_factory: FrameSourceFactory,
    pub sink: Box<dyn FrameSink + Sync>,
    pub injector: Box<dyn InputInjector + Sync>,
}

// ── Session manager ───────────────────────────────────────────────

/// Cloneable control surface for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<NodeCommand>,
    running: Arc<AtomicBool>,
}

impl SessionHandle {
    pub async fn send(&self, command: NodeCommand) -> Result<(), LanternError> {
        Ok(self.commands.send(command).await?)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Owns the listener and, once [`run`](Self::run) is called, the
/// dispatcher loop.
pub struct SessionManager {
    config: SessionConfig,
    listener: TcpListener,
    running: Arc<AtomicBool>,
    commands_tx: mpsc::Sender<NodeCommand>,
    commands_rx: mpsc::Receiver<NodeCommand>,
    collaborators: Collaborators,
}

impl SessionManager {
    /// Bind the session listener. Check [`local_port`](Self::local_port)
    /// afterwards: the discovery beacon must advertise it.
    pub fn bind(config: SessionConfig, collaborators: Collaborators) -> Result<Self, LanternError> {
        let listener = bind_listener(config.listen_port)?;
        let (commands_tx, commands_rx) = mpsc::channel(CHANNEL_CAPACITY);
        Ok(Self {
            config,
            listener,
            running: Arc::new(AtomicBool::new(true)),
            commands_tx,
            commands_rx,
            collaborators,
        })
    }

    pub fn local_port(&self) -> Result<u16, LanternError> {
        Ok(self.listener.local_addr()?.port())
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.commands_tx.clone(),
            running: self.running.clone(),
        }
    }

    /// Dispatcher loop. Consumes the manager; runs until the stop
    /// handle flips.
    pub async fn run(
        self,
        mut sightings: mpsc::Receiver<Sighting>,
        events: mpsc::Sender<NodeEvent>,
    ) -> Result<(), LanternError> {
        let port = self.local_port()?;
        info!(port, name = %self.config.display_name, "session listening");

        let (inbox_tx, mut inbox) = mpsc::channel(CHANNEL_CAPACITY);
        let (transfer_tx, mut transfer_rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(accept_loop(
            self.listener,
            inbox_tx.clone(),
            self.running.clone(),
        ));

        let directory = PeerDirectory::in_dir(&self.config.data_dir);
        for (ip, mac) in directory.load_all() {
            debug!(%ip, %mac, "remembered peer");
        }

        let mut dispatcher = Dispatcher {
            display_name: self.config.display_name,
            mac: self.config.mac,
            arbitrator: ControlArbitrator::new(self.config.allow_control),
            directory,
            links: HashMap::new(),
            peers: HashMap::new(),
            transfers: TransferTable::new(self.config.download_dir, transfer_tx.clone()),
            transfer_tx,
            streamer: None,
            tracker: ViewportTracker::new(),
            stale_flagged: false,
            collaborators: self.collaborators,
            inbox_tx,
            events,
        };

        let mut commands = self.commands_rx;
        let mut liveness = tokio::time::interval(LIVENESS_CHECK_INTERVAL);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(event) = inbox.recv() => match event {
                    LinkEvent::Opened(conn) => dispatcher.on_opened(conn).await,
                    LinkEvent::Inbound { from, frame } => dispatcher.on_frame(from, frame).await,
                    LinkEvent::Closed { from } => dispatcher.on_closed(from).await,
                },
                Some(command) = commands.recv() => dispatcher.on_command(command).await,
                Some(sighting) = sightings.recv() => dispatcher.on_sighting(sighting),
                Some(event) = transfer_rx.recv() => {
                    let _ = dispatcher.events.send(NodeEvent::Transfer(event)).await;
                }
                _ = liveness.tick() => dispatcher.check_liveness().await,
                _ = wait_for_stop(&self.running) => break,
            }
        }

        info!("session stopped");
        Ok(())
    }
}

// ── Dispatcher ────────────────────────────────────────────────────

enum LinkEvent {
    Opened(Connection),
    Inbound { from: PeerAddr, frame: Frame },
    Closed { from: PeerAddr },
}

struct Dispatcher {
    display_name: String,
    mac: String,
    arbitrator: ControlArbitrator,
    directory: PeerDirectory,
    /// Every open link, greeted or not, keyed by session address.
    links: HashMap<PeerAddr, mpsc::Sender<Frame>>,
    /// The roster. Offline entries stay for their status history.
    peers: HashMap<PeerAddr, Peer>,
    transfers: TransferTable,
    transfer_tx: mpsc::Sender<TransferEvent>,
    streamer: Option<ScreenStreamer>,
    tracker: ViewportTracker,
    stale_flagged: bool,
    collaborators: Collaborators,
    inbox_tx: mpsc::Sender<LinkEvent>,
    events: mpsc::Sender<NodeEvent>,
}

impl Dispatcher {
    fn greeted(&self, addr: PeerAddr) -> bool {
        self.peers.get(&addr).is_some_and(|p| p.online)
    }

    fn peer_name(&self, addr: PeerAddr) -> String {
        self.peers
            .get(&addr)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| addr.to_string())
    }

    async fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event).await;
    }

    async fn send_to(&self, to: PeerAddr, message: Message) {
        let Some(link) = self.links.get(&to) else {
            warn!(peer = %to, tag = %message, "no link for outbound message");
            return;
        };
        match message.into_frame() {
            Ok(frame) => {
                if link.send(frame).await.is_err() {
                    debug!(peer = %to, "link closed while sending");
                }
            }
            Err(e) => error!("message encode failed: {e}"),
        }
    }

    async fn broadcast(&self, message: Message) {
        let frame = match message.into_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("message encode failed: {e}");
                return;
            }
        };
        for (addr, link) in &self.links {
            if !self.greeted(*addr) {
                continue;
            }
            if link.send(frame.clone()).await.is_err() {
                debug!(peer = %addr, "link closed while broadcasting");
            }
        }
    }

    // ── Link lifecycle ────────────────────────────────────────────

    fn on_sighting(&self, sighting: Sighting) {
        if self.links.keys().any(|addr| addr.ip == sighting.addr.ip) {
            trace!(peer = %sighting.addr, "sighting for a connected address");
            return;
        }
        info!(peer = %sighting.addr, name = %sighting.display_name, "peer sighted, dialing");
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            match Connection::connect(sighting.addr).await {
                Ok(conn) => {
                    let _ = inbox.send(LinkEvent::Opened(conn)).await;
                }
                // No retry: the next beacon is at most one interval away.
                Err(e) => error!(peer = %sighting.addr, "connect failed: {e}"),
            }
        });
    }

    async fn on_opened(&mut self, conn: Connection) {
        let (tx, rx, from) = conn.into_parts();
        if self.links.contains_key(&from) {
            debug!(peer = %from, "duplicate link dropped");
            return;
        }

        let greeting = Message::Greeting(PeerIdentity::new(
            self.display_name.clone(),
            self.mac.clone(),
            self.arbitrator.role(),
        ));
        match greeting.into_frame() {
            Ok(frame) => {
                if tx.send(frame).await.is_err() {
                    warn!(peer = %from, "link died before greeting");
                    return;
                }
            }
            Err(e) => {
                error!("greeting encode failed: {e}");
                return;
            }
        }

        self.links.insert(from, tx);
        tokio::spawn(pump(rx, from, self.inbox_tx.clone()));
        debug!(peer = %from, "link up, greeting sent");
    }

    async fn on_closed(&mut self, from: PeerAddr) {
        self.links.remove(&from);

        if self.arbitrator.on_disconnect(from) {
            self.streamer = None;
            self.stale_flagged = false;
            info!(peer = %from, "control session ended by disconnect");
            self.emit(NodeEvent::ControlEnded { peer: from }).await;
        }

        let departed = match self.peers.get_mut(&from) {
            Some(peer) if peer.online => {
                peer.online = false;
                Some(peer.clone())
            }
            _ => None,
        };
        if let Some(peer) = departed {
            info!("{} left", peer.roster_line());
            self.emit(NodeEvent::PeerLeft(peer)).await;
        }
    }

    // ── Inbound messages ──────────────────────────────────────────

    async fn on_frame(&mut self, from: PeerAddr, frame: Frame) {
        let (message, attachment) = match Message::from_frame(frame) {
            Ok(decoded) => decoded,
            Err(LanternError::UnknownTag(tag)) => {
                warn!(peer = %from, tag, "unknown message tag dropped");
                return;
            }
            Err(e) => {
                warn!(peer = %from, "undecodable message dropped: {e}");
                return;
            }
        };

        if !self.greeted(from) {
            if let Message::Greeting(identity) = message {
                self.register(from, identity).await;
            } else {
                warn!(peer = %from, tag = %message, "message before greeting dropped");
            }
            return;
        }

        self.dispatch(from, message, attachment).await;
    }

    async fn register(&mut self, from: PeerAddr, identity: PeerIdentity) {
        if let Err(e) = self.directory.upsert(from.ip, &identity.mac) {
            warn!("peer directory update failed: {e}");
        }

        let peer = Peer {
            addr: from,
            display_name: identity.display_name,
            mac: identity.mac,
            role: identity.role,
            status: self
                .peers
                .get(&from)
                .map(|p| p.status.clone())
                .unwrap_or_default(),
            online: true,
        };
        info!("{} joined", peer.roster_line());
        self.peers.insert(from, peer.clone());
        self.emit(NodeEvent::PeerJoined(peer)).await;
    }

    async fn dispatch(&mut self, from: PeerAddr, message: Message, attachment: Bytes) {
        match message {
            Message::Greeting(_) => {
                warn!(peer = %from, "repeated greeting ignored");
            }
            Message::PlainText(text) => {
                let from = self.peer_name(from);
                self.emit(NodeEvent::Chat { from, text }).await;
            }
            Message::StatusUpdate(current) => self.on_status(from, current).await,
            Message::ControlRequest(action) => self.on_control(from, action).await,
            Message::MouseEvent(event) => {
                if !self.arbitrator.accepts_input_from(from) {
                    warn!(peer = %from, "mouse event without control dropped");
                    return;
                }
                if let Err(e) = inject_mouse(self.collaborators.injector.as_mut(), event).await {
                    warn!("mouse injection failed: {e}");
                }
            }
            Message::KeyboardEvent(event) => {
                if !self.arbitrator.accepts_input_from(from) {
                    warn!(peer = %from, "keyboard event without control dropped");
                    return;
                }
                if let Err(e) = inject_keyboard(self.collaborators.injector.as_mut(), event).await {
                    warn!("keyboard injection failed: {e}");
                }
            }
            Message::ControlFps(fps) => {
                self.on_tuning(from, StreamerCommand::SetFps(fps)).await;
            }
            Message::ControlCaptureRegion(rect) => {
                self.on_tuning(from, StreamerCommand::SetRegion(rect)).await;
            }
            Message::ControlSelectMonitor(index) => {
                self.on_tuning(from, StreamerCommand::SelectMonitor(index)).await;
            }
            Message::ScreenFrame(meta) => self.on_screen_frame(from, meta, attachment).await,
            Message::FileChunk(meta) => {
                if let Err(e) = self.transfers.accept_chunk(meta, attachment).await {
                    warn!(peer = %from, "file chunk rejected: {e}");
                }
            }
        }
    }

    async fn on_status(&mut self, from: PeerAddr, current: String) {
        let Some(peer) = self.peers.get_mut(&from) else {
            return;
        };
        let previous = std::mem::replace(&mut peer.status, current.clone());
        let from = peer.display_name.clone();
        info!("peer {from} changed status from {previous} to {current}");
        self.emit(NodeEvent::StatusChanged {
            from,
            previous,
            current,
        })
        .await;
    }

    // ── Remote control ────────────────────────────────────────────

    async fn on_control(&mut self, from: PeerAddr, action: ControlAction) {
        match action {
            ControlAction::GiveMeControl => match self.arbitrator.on_control_request(from) {
                ControlVerdict::Granted => {
                    self.send_to(from, Message::ControlRequest(ControlAction::Granted))
                        .await;
                    self.start_streaming(from);
                    info!(peer = %from, "control granted, streaming starts");
                    self.emit(NodeEvent::ControlStarted { peer: from }).await;
                }
                ControlVerdict::Occupied => {
                    debug!(peer = %from, "control refused");
                    self.send_to(from, Message::ControlRequest(ControlAction::Occupied))
                        .await;
                }
            },
            ControlAction::Granted => match self.arbitrator.on_granted(from) {
                Ok(()) => {
                    self.tracker = ViewportTracker::new();
                    self.tracker.arm(std::time::Instant::now());
                    self.stale_flagged = false;
                    info!(peer = %from, "control request granted");
                    self.emit(NodeEvent::ControlGranted { peer: from }).await;
                }
                Err(e) => warn!(peer = %from, "unexpected grant: {e}"),
            },
            ControlAction::Occupied => match self.arbitrator.on_occupied(from) {
                Ok(()) => {
                    info!(peer = %from, "peer is occupied");
                    self.emit(NodeEvent::ControlDenied { peer: from }).await;
                }
                Err(e) => warn!(peer = %from, "unexpected refusal: {e}"),
            },
            ControlAction::Break => match self.arbitrator.on_break(from) {
                BreakOutcome::StopStreamingAndEcho => {
                    self.streamer = None;
                    self.send_to(from, Message::ControlRequest(ControlAction::Break))
                        .await;
                    info!(peer = %from, "controller ended the session");
                    self.emit(NodeEvent::ControlEnded { peer: from }).await;
                }
                BreakOutcome::CloseViewport => {
                    self.stale_flagged = false;
                    info!(peer = %from, "viewed peer ended the session");
                    self.emit(NodeEvent::ControlEnded { peer: from }).await;
                }
                BreakOutcome::Ignored => debug!(peer = %from, "stray break ignored"),
            },
        }
    }

    fn start_streaming(&mut self, viewer: PeerAddr) {
        let Some(link) = self.links.get(&viewer) else {
            warn!(peer = %viewer, "no link to stream to");
            return;
        };
        let source = (self.collaborators.source_factory)();
        self.streamer = Some(ScreenStreamer::spawn(
            source,
            link.clone(),
            DEFAULT_FRAME_INTERVAL,
        ));
    }

    /// Capture tuning is only honored from the peer that holds
    /// control, like input itself.
    async fn on_tuning(&mut self, from: PeerAddr, command: StreamerCommand) {
        if !self.arbitrator.accepts_input_from(from) {
            warn!(peer = %from, "capture tuning without control dropped");
            return;
        }
        match &self.streamer {
            Some(streamer) => streamer.command(command).await,
            None => warn!(peer = %from, "capture tuning with no active stream"),
        }
    }

    async fn on_screen_frame(&mut self, from: PeerAddr, meta: ScreenFrameMeta, jpeg: Bytes) {
        if self.arbitrator.viewed_peer() != Some(from) {
            debug!(peer = %from, "frame from a peer we are not viewing");
            return;
        }
        if let Err(e) = self.collaborators.sink.render_frame(&jpeg, meta).await {
            warn!("frame render failed: {e}");
        }
        let fps = self.tracker.record_frame(std::time::Instant::now());
        self.stale_flagged = false;
        self.emit(NodeEvent::Viewing { from, fps }).await;
    }

    async fn check_liveness(&mut self) {
        let Some(viewed) = self.arbitrator.viewed_peer() else {
            return;
        };
        if !self.stale_flagged && self.tracker.is_stale(std::time::Instant::now()) {
            self.stale_flagged = true;
            warn!(peer = %viewed, "no frames within the liveness window");
            self.emit(NodeEvent::ViewportStale { from: viewed }).await;
        }
    }

    // ── Local commands ────────────────────────────────────────────

    async fn on_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::SendChat(text) => self.broadcast(Message::PlainText(text)).await,
            NodeCommand::SetStatus(status) => self.broadcast(Message::StatusUpdate(status)).await,
            NodeCommand::SendFile(path) => {
                let links: Vec<_> = self
                    .links
                    .iter()
                    .filter(|(addr, _)| self.greeted(**addr))
                    .map(|(_, link)| link.clone())
                    .collect();
                if links.is_empty() {
                    warn!("no peers to send {} to", path.display());
                    return;
                }
                let events = self.transfer_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = send_file(path, links, events).await {
                        error!("file transfer failed: {e}");
                    }
                });
            }
            NodeCommand::RequestControl(peer) => {
                if !self.greeted(peer) {
                    warn!(%peer, "cannot request control of an unknown peer");
                    return;
                }
                match self.arbitrator.begin_request(peer) {
                    Ok(()) => {
                        self.send_to(peer, Message::ControlRequest(ControlAction::GiveMeControl))
                            .await;
                    }
                    Err(e) => warn!("control request refused locally: {e}"),
                }
            }
            NodeCommand::ReleaseControl => match self.arbitrator.cancel() {
                Ok(peer) => {
                    self.streamer = None;
                    self.stale_flagged = false;
                    self.send_to(peer, Message::ControlRequest(ControlAction::Break))
                        .await;
                    info!(%peer, "control session released");
                    self.emit(NodeEvent::ControlEnded { peer }).await;
                }
                Err(e) => warn!("nothing to release: {e}"),
            },
            NodeCommand::AllowRemoteControl(allow) => {
                self.arbitrator.set_allow_control(allow);
                info!(allow, "remote control policy changed");
            }
            NodeCommand::SetFps(fps) => {
                if fps == 0 {
                    warn!("refusing a frame rate of zero");
                    return;
                }
                self.send_viewed(Message::ControlFps(fps)).await;
            }
            NodeCommand::SelectMonitor(index) => {
                self.send_viewed(Message::ControlSelectMonitor(index)).await;
            }
            NodeCommand::SetCaptureRegion(rect) => {
                self.send_viewed(Message::ControlCaptureRegion(rect)).await;
            }
            NodeCommand::SendMouse(event) => self.send_viewed(Message::MouseEvent(event)).await,
            NodeCommand::SendKeyboard(event) => {
                self.send_viewed(Message::KeyboardEvent(event)).await;
            }
            NodeCommand::ListPeers(reply) => {
                let _ = reply.send(self.peers.values().cloned().collect());
            }
        }
    }

    async fn send_viewed(&self, message: Message) {
        match self.arbitrator.viewed_peer() {
            Some(peer) => self.send_to(peer, message).await,
            None => warn!(tag = %message, "not controlling any peer"),
        }
    }
}

// ── Plumbing ──────────────────────────────────────────────────────

/// Forward a link's inbound frames into the dispatcher inbox, then
/// report the link closed.
async fn pump(mut rx: mpsc::Receiver<Frame>, from: PeerAddr, inbox: mpsc::Sender<LinkEvent>) {
    while let Some(frame) = rx.recv().await {
        if inbox.send(LinkEvent::Inbound { from, frame }).await.is_err() {
            return;
        }
    }
    let _ = inbox.send(LinkEvent::Closed { from }).await;
}

async fn accept_loop(
    listener: TcpListener,
    inbox: mpsc::Sender<LinkEvent>,
    running: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    let conn = Connection::from_stream(stream, addr.into());
                    if inbox.send(LinkEvent::Opened(conn)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("accept failed: {e}"),
            },
            _ = wait_for_stop(&running) => break,
        }
    }
    debug!("accept loop ended");
}

/// Buffer hints go on the listener socket so accepted sockets
/// inherit them.
fn bind_listener(port: u16) -> Result<TcpListener, LanternError> {
    let socket = TcpSocket::new_v4()?;
    apply_buffer_hints(&socket);
    socket.bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
    Ok(socket.listen(1024)?)
}

async fn wait_for_stop(flag: &AtomicBool) {
    while flag.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
