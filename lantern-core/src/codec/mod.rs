//! Stream reassembly for the framed TCP protocol.
//!
//! TCP delivers bytes with no message boundaries: a frame may arrive
//! split at any offset or coalesced with its neighbors. The codec
//! buffers partial input and emits complete [`Frame`]s, one per
//! `decode` call. `FramedRead` keeps calling `decode` until it returns
//! `Ok(None)`, so every frame already sitting in the buffer is drained
//! before the socket is polled again.
//!
//! ```text
//!                ┌───────────────────┐  12 bytes buffered   ┌──────────────────┐
//!  incoming ───► │  AwaitingHeader   │ ───────────────────► │   AwaitingBody   │
//!    bytes       │                   │ ◄─────────────────── │   (total_len)    │
//!                └───────────────────┘  body buffered,      └──────────────────┘
//!                                       frame emitted
//! ```
//!
//! A header that fails validation or announces an oversized body is a
//! framing error: the stream has lost its byte boundaries and the error
//! tears the connection down.

pub mod datagram;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LanternError;
use crate::frame::Frame;
use crate::header::FrameHeader;

/// Upper bound on a frame body. A header announcing more than this is
/// treated as stream corruption, not a large message.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Decoder state carried between `decode` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecodeState {
    /// Waiting for the fixed-size header.
    #[default]
    AwaitingHeader,

    /// Header parsed and validated; waiting for its announced body.
    AwaitingBody(FrameHeader),
}

/// Codec for framed peer links.
#[derive(Debug, Default)]
pub struct FrameCodec {
    state: DecodeState,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = LanternError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, LanternError> {
        let header = match self.state {
            DecodeState::AwaitingHeader => {
                if src.len() < FrameHeader::SIZE {
                    return Ok(None);
                }

                let header = FrameHeader::decode(&src[..FrameHeader::SIZE])?;
                header.validate()?;
                if header.body_len() > MAX_FRAME_SIZE {
                    return Err(LanternError::FrameTooLarge {
                        size: header.body_len(),
                        max: MAX_FRAME_SIZE,
                    });
                }

                src.advance(FrameHeader::SIZE);
                src.reserve(header.body_len());
                self.state = DecodeState::AwaitingBody(header);
                header
            }
            DecodeState::AwaitingBody(header) => header,
        };

        if src.len() < header.body_len() {
            return Ok(None);
        }

        let structured = src.split_to(header.structured_len as usize).freeze();
        let attachment = src.split_to(header.binary_len as usize).freeze();
        self.state = DecodeState::AwaitingHeader;
        src.reserve(FrameHeader::SIZE);

        Ok(Some(Frame::new(structured, attachment)))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = LanternError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), LanternError> {
        let body_len = frame.structured.len() + frame.attachment.len();
        if body_len > MAX_FRAME_SIZE {
            return Err(LanternError::FrameTooLarge {
                size: body_len,
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(FrameHeader::SIZE + body_len);
        dst.extend_from_slice(&frame.header().encode());
        dst.extend_from_slice(&frame.structured);
        dst.extend_from_slice(&frame.attachment);
        Ok(())
    }
}
