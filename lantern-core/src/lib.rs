//! # lantern-core
//!
//! Core library for the Lantern LAN collaboration protocol: peers
//! find each other by UDP beacon, then talk over framed TCP links.
//!
//! This crate contains:
//! - **Framing**: `FrameHeader`, `Frame`, `FrameCodec` for framed TCP I/O via `tokio_util`
//! - **Messages**: `Message`, the tagged CBOR payloads of every frame
//! - **Discovery**: `DiscoveryService` broadcasting and collecting `Announcement` beacons
//! - **Network**: `Connection` for a framed link split behind channels
//! - **Peers**: `Peer`, `PeerIdentity` and the persisted `PeerDirectory`
//! - **Control**: `ControlArbitrator`, the single-controller state machine
//! - **Screen**: capture selection, JPEG streaming and viewport accounting
//! - **Transfer**: broadcast file sending and keyed reassembly
//! - **Session**: `SessionManager`, one dispatcher task owning all of the above
//! - **Error**: `LanternError`, the typed `thiserror`-based error hierarchy

pub mod codec;
pub mod control;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod header;
pub mod message;
pub mod network;
pub mod peers;
pub mod protocol;
pub mod screen;
pub mod session;
pub mod transfer;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{FrameCodec, MAX_FRAME_SIZE, datagram::Announcement};
pub use control::{BreakOutcome, ControlArbitrator, ControlState, ControlVerdict};
pub use discovery::{BROADCAST_INTERVAL, DISCOVERY_PORT, DiscoveryConfig, DiscoveryService, Sighting};
pub use error::LanternError;
pub use frame::Frame;
pub use header::FrameHeader;
pub use message::{ControlAction, Message};
pub use network::{Connection, PeerAddr};
pub use peers::{Peer, PeerDirectory, PeerIdentity, PeerRole};
pub use screen::{
    CaptureSelector, CapturedFrame, FpsCounter, FrameSink, FrameSource, InputInjector,
    ScreenStreamer, ViewportTracker,
};
pub use session::{
    Collaborators, FrameSourceFactory, NodeCommand, NodeEvent, SessionConfig, SessionHandle,
    SessionManager,
};
pub use transfer::{TransferEvent, TransferTable, send_file};
