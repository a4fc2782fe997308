//! Wire payloads for screen viewing and remote input.
//!
//! # Wire Protocol
//!
//! ## Viewing (continuous)
//! ```text
//! Controlled ──[ScreenFrame + JPEG attachment]──► Viewer   (repeated)
//!   Payload: ScreenFrameMeta (CBOR)
//! ```
//!
//! ## Capture tuning
//! ```text
//! Viewer ──[ControlFps]──────────────────────────► Controlled
//! Viewer ──[ControlCaptureRegion]────────────────► Controlled
//! Viewer ──[ControlSelectMonitor]────────────────► Controlled
//! ```
//!
//! ## Input injection
//! ```text
//! Viewer ──[MouseEvent]──────────────────────────► Controlled
//! Viewer ──[KeyboardEvent]───────────────────────► Controlled
//! ```
//!
//! Input is applied only while the sender holds the control grant; see
//! [`crate::control`].

use serde::{Deserialize, Serialize};

// ── Capture Rect ──────────────────────────────────────────────────

/// A rectangle on the virtual desktop, in global coordinates.
///
/// Origins can be negative on multi-monitor layouts where a secondary
/// display sits left of or above the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle encloses any pixels at all.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ── Screen Frame ──────────────────────────────────────────────────

/// Capture target spanning the whole desktop rather than one monitor.
pub const ALL_MONITORS: i32 = -1;

/// Metadata for one captured frame.
///
/// The JPEG bytes ride in the frame's binary attachment, not here, so
/// decoding the structured payload stays cheap at streaming rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenFrameMeta {
    /// Desktop region the image covers.
    pub rect: CaptureRect,

    /// Monitor the region belongs to, or [`ALL_MONITORS`].
    pub monitor_index: i32,

    /// How many monitors the capturing machine has. Lets the viewer
    /// build its monitor picker without a separate query.
    pub monitor_count: u32,
}

// ── Mouse Input ───────────────────────────────────────────────────

/// Remote mouse input relayed from the viewer to the controlled peer.
///
/// Button events carry no coordinates: they act at wherever the
/// pointer currently is, so a press is always preceded by a `Move`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseEvent {
    /// Move the pointer to absolute desktop coordinates.
    Move { x: i32, y: i32 },

    /// Press a button at the current pointer position.
    Down { button: MouseButton },

    /// Release a button at the current pointer position.
    Up { button: MouseButton },

    /// Scroll one notch; positive is away from the user.
    Scroll { delta: i32 },
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

// ── Keyboard Input ────────────────────────────────────────────────

/// Remote keyboard input relayed from the viewer to the controlled
/// peer. Keys travel as portable names ("a", "enter", "ctrl"), not
/// platform scan codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyboardEvent {
    /// Press and hold a named key.
    Down { key: String },

    /// Release a named key.
    Up { key: String },

    /// Press a chord of keys in order and release them in reverse.
    Chord { keys: Vec<String> },
}
