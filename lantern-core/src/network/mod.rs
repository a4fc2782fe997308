//! TCP link plumbing for peer sessions.

pub mod connection;

pub use connection::{Connection, PeerAddr};
