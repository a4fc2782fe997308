//! The message catalog for peer links.
//!
//! Every frame's structured payload decodes to exactly one [`Message`].
//! On the wire a message is a single-entry CBOR map from tag to payload
//! (serde's external tagging):
//!
//! ```text
//! {"PlainText": "hi"}
//! {"ControlRequest": "GiveMeControl"}
//! {"FileChunk": {"hash": ..., "total_size": ..., ...}}
//! ```
//!
//! The catalog is closed: a tag outside it decodes to
//! [`LanternError::UnknownTag`], which receivers log and drop without
//! touching the connection. Only the framing layer can kill a link.

use std::fmt;

use bytes::Bytes;
use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use crate::error::LanternError;
use crate::frame::Frame;
use crate::peers::PeerIdentity;
use crate::protocol::file::FileChunkMeta;
use crate::protocol::screen::{CaptureRect, KeyboardEvent, MouseEvent, ScreenFrameMeta};

/// All tags this build understands, in wire form.
const KNOWN_TAGS: &[&str] = &[
    "PlainText",
    "Greeting",
    "StatusUpdate",
    "MouseEvent",
    "KeyboardEvent",
    "FileChunk",
    "ControlFps",
    "ControlCaptureRegion",
    "ControlSelectMonitor",
    "ControlRequest",
    "ScreenFrame",
];

/// Everything a peer can say over an established link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Chat line shown in every peer's transcript.
    PlainText(String),

    /// Handshake introduction: name, MAC, and control role. Each side
    /// of a link sends exactly one.
    Greeting(PeerIdentity),

    /// The sender's free-form presence status changed.
    StatusUpdate(String),

    /// Remote mouse input for the controlled desktop.
    MouseEvent(MouseEvent),

    /// Remote keyboard input for the controlled desktop.
    KeyboardEvent(KeyboardEvent),

    /// One slice of a file transfer; bytes ride in the attachment.
    FileChunk(FileChunkMeta),

    /// Viewer retimes the sender's capture loop to this many frames
    /// per second.
    ControlFps(u32),

    /// Viewer restricts capture to a desktop rectangle.
    ControlCaptureRegion(CaptureRect),

    /// Viewer picks a monitor to capture, or [`ALL_MONITORS`].
    ///
    /// [`ALL_MONITORS`]: crate::protocol::screen::ALL_MONITORS
    ControlSelectMonitor(i32),

    /// Remote-control arbitration verb.
    ControlRequest(ControlAction),

    /// One captured frame; JPEG bytes ride in the attachment.
    ScreenFrame(ScreenFrameMeta),
}

/// Verbs of the remote-control handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlAction {
    /// Ask the receiver to surrender its desktop.
    GiveMeControl,

    /// The receiver granted control to the asker.
    Granted,

    /// The receiver is already controlled by someone else.
    Occupied,

    /// End the control relationship. The controlled side echoes this
    /// back so both ends settle in the same order.
    Break,
}

impl Message {
    /// Wire tag of this message.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::PlainText(_) => "PlainText",
            Message::Greeting(_) => "Greeting",
            Message::StatusUpdate(_) => "StatusUpdate",
            Message::MouseEvent(_) => "MouseEvent",
            Message::KeyboardEvent(_) => "KeyboardEvent",
            Message::FileChunk(_) => "FileChunk",
            Message::ControlFps(_) => "ControlFps",
            Message::ControlCaptureRegion(_) => "ControlCaptureRegion",
            Message::ControlSelectMonitor(_) => "ControlSelectMonitor",
            Message::ControlRequest(_) => "ControlRequest",
            Message::ScreenFrame(_) => "ScreenFrame",
        }
    }

    /// Whether this message's frame is expected to carry a binary
    /// attachment.
    pub fn carries_attachment(&self) -> bool {
        matches!(self, Message::FileChunk(_) | Message::ScreenFrame(_))
    }

    /// Serialize to the structured payload bytes.
    pub fn to_structured(&self) -> Result<Vec<u8>, LanternError> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|e| LanternError::Encoding(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize from structured payload bytes.
    ///
    /// Distinguishes a well-formed envelope with a tag outside the
    /// catalog ([`LanternError::UnknownTag`]) from bytes that are not
    /// a valid envelope at all ([`LanternError::Encoding`]).
    pub fn from_structured(bytes: &[u8]) -> Result<Self, LanternError> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| LanternError::Encoding(e.to_string()))?;

        match value.deserialized::<Message>() {
            Ok(message) => Ok(message),
            Err(e) => match unknown_tag_of(&value) {
                Some(tag) => Err(LanternError::UnknownTag(tag)),
                None => Err(LanternError::Encoding(e.to_string())),
            },
        }
    }

    /// Build a frame pairing this message with a binary attachment.
    pub fn into_frame_with_attachment(self, attachment: Bytes) -> Result<Frame, LanternError> {
        let structured = self.to_structured()?;
        Ok(Frame::new(Bytes::from(structured), attachment))
    }

    /// Build a frame with no binary attachment.
    pub fn into_frame(self) -> Result<Frame, LanternError> {
        self.into_frame_with_attachment(Bytes::new())
    }

    /// Split a received frame into its message and attachment.
    pub fn from_frame(frame: Frame) -> Result<(Self, Bytes), LanternError> {
        let message = Self::from_structured(&frame.structured)?;
        Ok((message, frame.attachment))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Extract the tag of an envelope whose shape is fine but whose tag is
/// not in the catalog, as opposed to a payload that is malformed.
fn unknown_tag_of(value: &Value) -> Option<String> {
    let tag = match value {
        Value::Map(entries) => match entries.as_slice() {
            [(Value::Text(tag), _)] => tag,
            _ => return None,
        },
        // A payload-less tag serializes as bare text.
        Value::Text(tag) => tag,
        _ => return None,
    };
    (!KNOWN_TAGS.contains(&tag.as_str())).then(|| tag.clone())
}
