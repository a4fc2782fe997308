//! A framed TCP link to one peer.
//!
//! The socket is split behind two channels: the owner sends [`Frame`]s
//! into the writer task and receives decoded frames from the reader
//! task. A framing error on either side ends the task, which closes
//! its channel, which the owner observes as disconnection. Nothing is
//! retried at this layer.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, error, warn};

use crate::codec::FrameCodec;
use crate::error::LanternError;
use crate::frame::Frame;

/// Receive and send buffer depth requested for every session socket.
pub const SOCKET_BUFFER_SIZE: u32 = 200_000;

/// Channel depth between a link's tasks and its owner.
pub(crate) const CHANNEL_CAPACITY: usize = 100;

// ── Peer Address ──────────────────────────────────────────────────

/// The address a peer accepts session connections on.
///
/// This is session identity: two links resolving to the same
/// `PeerAddr` are the same peer, and the later link is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

// ── Connection ────────────────────────────────────────────────────

/// An established link to one peer.
pub struct Connection {
    tx: mpsc::Sender<Frame>,
    rx: mpsc::Receiver<Frame>,
    peer: PeerAddr,
}

impl Connection {
    /// Adopt an already-accepted stream.
    pub fn from_stream(stream: TcpStream, peer: PeerAddr) -> Self {
        let framed = Framed::new(stream, FrameCodec::new());
        let (mut net_writer, mut net_reader) = framed.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = net_writer.send(frame).await {
                    error!(%peer, "link write failed: {e}");
                    break;
                }
            }
            debug!(%peer, "writer task ended");
        });

        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(frame) => {
                        if inbound_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(%peer, "link framing failed: {e}");
                        break;
                    }
                }
            }
            debug!(%peer, "reader task ended");
        });

        Self {
            tx: outbound_tx,
            rx: inbound_rx,
            peer,
        }
    }

    /// Dial a peer's session port.
    pub async fn connect(peer: PeerAddr) -> Result<Self, LanternError> {
        let socket = match peer.ip {
            IpAddr::V4(_) => TcpSocket::new_v4()?,
            IpAddr::V6(_) => TcpSocket::new_v6()?,
        };
        apply_buffer_hints(&socket);
        let stream = socket.connect(peer.socket_addr()).await?;
        Ok(Self::from_stream(stream, peer))
    }

    /// Queue a frame for the writer task.
    pub async fn send(&self, frame: Frame) -> Result<(), LanternError> {
        Ok(self.tx.send(frame).await?)
    }

    /// Next decoded frame, or `None` once the link is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// A cloneable handle for queueing outbound frames.
    pub fn sender(&self) -> mpsc::Sender<Frame> {
        self.tx.clone()
    }

    pub fn peer(&self) -> PeerAddr {
        self.peer
    }

    /// Split into the outbound handle and the inbound stream, for
    /// owners that pump frames into their own event loop.
    pub fn into_parts(self) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>, PeerAddr) {
        (self.tx, self.rx, self.peer)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}

/// Ask the OS for [`SOCKET_BUFFER_SIZE`] byte socket buffers.
/// Best effort: a refusal is logged and ignored.
pub fn apply_buffer_hints(socket: &TcpSocket) {
    if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE) {
        warn!("could not set receive buffer size: {e}");
    }
    if let Err(e) = socket.set_send_buffer_size(SOCKET_BUFFER_SIZE) {
        warn!("could not set send buffer size: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_addr_display() {
        let addr = PeerAddr::new(IpAddr::from([192, 168, 1, 7]), 45123);
        assert_eq!(addr.to_string(), "192.168.1.7:45123");
    }

    #[test]
    fn peer_addr_from_socket_addr() {
        let socket: SocketAddr = "10.0.0.2:8000".parse().unwrap();
        let addr = PeerAddr::from(socket);
        assert_eq!(addr.port, 8000);
        assert_eq!(addr.socket_addr(), socket);
    }
}
