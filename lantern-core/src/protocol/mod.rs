//! Structured payload definitions for the peer protocol.
//!
//! Each sub-module defines the payload types for one protocol domain
//! (screen viewing and remote input, file transfer). Payloads are
//! serialized with `serde` + `ciborium` and carried inside [`Message`]
//! variants, which in turn ride in [`Frame`] bodies.
//!
//! [`Message`]: crate::message::Message
//! [`Frame`]: crate::frame::Frame

pub mod file;
pub mod screen;

// Re-export the most commonly used types at the protocol level.
pub use file::FileChunkMeta;
pub use screen::{CaptureRect, KeyboardEvent, MouseButton, MouseEvent, ScreenFrameMeta};
