//! Node service core logic.
//!
//! Binds the session, starts the discovery beacon, and bridges both
//! to the console: stdin lines become commands, session events become
//! log lines. Runs until stopped or until `/quit`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use lantern_core::protocol::screen::{KeyboardEvent, MouseButton, MouseEvent};
use lantern_core::screen::FrameSource;
use lantern_core::{
    Collaborators, DiscoveryService, NodeCommand, NodeEvent, SessionHandle, SessionManager,
    TransferEvent,
};

use crate::capture::PatternSource;
use crate::config::NodeConfig;
use crate::console::{self, ConsoleAction};
use crate::input::{TraceInjector, TraceSink};

/// Queue depth for sightings and session events.
const CHANNEL_DEPTH: usize = 100;

// ── NodeService ──────────────────────────────────────────────────

/// The top-level node service.
///
/// Owns the configuration and the stop flag; everything else lives
/// for the duration of [`run`](Self::run).
pub struct NodeService {
    config: NodeConfig,
    running: Arc<AtomicBool>,
}

impl NodeService {
    /// Create a new node service with the given config.
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task or a signal handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the service until stopped.
    ///
    /// 1. Binds the session listener and learns its port.
    /// 2. Starts the discovery beacon advertising that port.
    /// 3. Feeds sightings into the session and console lines into
    ///    commands, logging every session event, until `running`
    ///    becomes `false` or the user types `/quit`.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::SeqCst);

        let collaborators = Collaborators {
            source_factory: Box::new(|| Box::new(PatternSource::default()) as Box<dyn FrameSource>),
            sink: Box::new(TraceSink),
            injector: Box::new(TraceInjector),
        };

        let session = SessionManager::bind(self.config.to_session_config(), collaborators)?;
        let port = session.local_port()?;
        let handle = session.handle();

        let discovery = DiscoveryService::new(self.config.to_discovery_config(port));
        let discovery_stop = discovery.stop_handle();

        let (sightings_tx, sightings_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (events_tx, mut events_rx) = mpsc::channel(CHANNEL_DEPTH);

        tokio::spawn(async move {
            if let Err(e) = discovery.run(sightings_tx).await {
                error!("discovery error: {e}");
            }
        });

        let session_task = tokio::spawn(async move {
            if let Err(e) = session.run(sightings_rx, events_tx).await {
                error!("session error: {e}");
            }
        });

        // Console lines arrive over a channel so the select loop never
        // blocks on stdin.
        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut console_open = true;
        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => log_event(event),
                    None => break,
                },
                line = line_rx.recv(), if console_open => match line {
                    Some(line) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match console::parse(&line) {
                            Ok(action) => {
                                if !dispatch(&handle, action).await {
                                    self.stop();
                                }
                            }
                            Err(message) => warn!("{message}"),
                        }
                    }
                    None => {
                        debug!("console closed; running headless");
                        console_open = false;
                    }
                },
                _ = Self::wait_for_stop(&self.running) => break,
            }
        }

        discovery_stop.store(false, Ordering::SeqCst);
        handle.stop();
        self.running.store(false, Ordering::SeqCst);
        let _ = session_task.await;
        info!("node service stopped");
        Ok(())
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the service is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

// ── Console dispatch ─────────────────────────────────────────────

/// Forward one console action to the session. Returns `false` when
/// the user asked to quit.
async fn dispatch(handle: &SessionHandle, action: ConsoleAction) -> bool {
    let commands = match action {
        ConsoleAction::Command(command) => vec![command],

        // A button press acts wherever the pointer currently is, so
        // the move has to land first.
        ConsoleAction::Click { x, y } => vec![
            NodeCommand::SendMouse(MouseEvent::Move { x, y }),
            NodeCommand::SendMouse(MouseEvent::Down {
                button: MouseButton::Left,
            }),
            NodeCommand::SendMouse(MouseEvent::Up {
                button: MouseButton::Left,
            }),
        ],

        ConsoleAction::Tap { key } => vec![
            NodeCommand::SendKeyboard(KeyboardEvent::Down { key: key.clone() }),
            NodeCommand::SendKeyboard(KeyboardEvent::Up { key }),
        ],

        ConsoleAction::Peers => {
            print_roster(handle).await;
            return true;
        }

        ConsoleAction::Help => {
            println!("{}", console::help());
            return true;
        }

        ConsoleAction::Quit => return false,
    };

    for command in commands {
        if let Err(e) = handle.send(command).await {
            warn!("session rejected command: {e}");
            break;
        }
    }
    true
}

/// Ask the session for its roster and print one line per peer.
async fn print_roster(handle: &SessionHandle) {
    let (reply_tx, reply_rx) = oneshot::channel();
    if handle.send(NodeCommand::ListPeers(reply_tx)).await.is_err() {
        warn!("session is not running");
        return;
    }
    match reply_rx.await {
        Ok(peers) if peers.is_empty() => info!("no peers seen yet"),
        Ok(peers) => {
            for peer in peers {
                let state = if peer.online { "online" } else { "offline" };
                if peer.status.is_empty() {
                    info!("{} ({state})", peer.roster_line());
                } else {
                    info!("{} ({state}, {})", peer.roster_line(), peer.status);
                }
            }
        }
        Err(_) => warn!("session dropped the roster request"),
    }
}

// ── Event presentation ───────────────────────────────────────────

/// Log one session event. Roster and control bookkeeping the session
/// already reports stays at debug; chat, transfers, and the viewer
/// side of control are the node's own output.
fn log_event(event: NodeEvent) {
    match event {
        NodeEvent::PeerJoined(peer) => debug!("roster add: {}", peer.roster_line()),
        NodeEvent::PeerLeft(peer) => debug!("roster drop: {}", peer.roster_line()),
        NodeEvent::Chat { from, text } => info!("<{from}> {text}"),
        NodeEvent::StatusChanged { from, current, .. } => {
            debug!("{from} is now '{current}'");
        }
        NodeEvent::ControlGranted { peer } => info!("control granted; viewing {peer}"),
        NodeEvent::ControlDenied { peer } => warn!("control denied: {peer} is taken"),
        NodeEvent::ControlStarted { peer } => debug!("streaming to {peer}"),
        NodeEvent::ControlEnded { peer } => info!("control session with {peer} ended"),
        NodeEvent::Viewing { from, fps } => debug!("viewing {from} at {fps:.1} fps"),
        NodeEvent::ViewportStale { from } => debug!("viewport stale: {from}"),
        NodeEvent::Transfer(transfer) => log_transfer(transfer),
    }
}

fn log_transfer(event: TransferEvent) {
    match event {
        TransferEvent::ChunkSent {
            filename,
            sent,
            total_size,
        } => debug!("sent {sent}/{total_size} bytes of {filename}"),
        TransferEvent::SendFinished { filename } => info!("finished broadcasting {filename}"),
        TransferEvent::ReceiveStarted {
            filename,
            total_size,
        } => info!("receiving {filename} ({total_size} bytes)"),
        TransferEvent::ChunkReceived {
            filename,
            received,
            total_size,
        } => debug!("{filename}: {received}/{total_size} bytes"),
        TransferEvent::ReceiveFinished { filename, path } => {
            info!("{filename} saved to {}", path.display());
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    #[test]
    fn service_creates_with_defaults() {
        let svc = NodeService::new(NodeConfig::default());
        assert!(!svc.is_running());
    }

    #[test]
    fn stop_handle_works() {
        let svc = NodeService::new(NodeConfig::default());
        let handle = svc.stop_handle();
        handle.store(true, Ordering::SeqCst);
        assert!(svc.is_running());
        svc.stop();
        assert!(!svc.is_running());
    }
}
