//! # lantern-node
//!
//! Headless Lantern node. Wires a [`lantern_core`] session to a UDP
//! discovery beacon and drives both from a line-based console:
//! chat, status, file broadcast, and remote viewing of peers.
//!
//! Screen capture and input injection are stubbed with synthetic
//! collaborators, so the binary runs on any machine without a
//! desktop session. A GUI would supply real ones in their place.

pub mod capture;
pub mod config;
pub mod console;
pub mod input;
pub mod service;
