//! Fixed-size header prefixed to every frame on a peer link.
//!
//! # Wire Format
//!
//! ```text
//! ┌───────────────┬────────────────────┬────────────────┐
//! │ total_len u32 │ structured_len u32 │ binary_len u32 │   all big-endian
//! └───────────────┴────────────────────┴────────────────┘
//! ```
//!
//! `total_len` counts the body bytes that follow the header and must
//! equal `structured_len + binary_len`. A header that breaks that
//! identity leaves the stream without a recoverable byte boundary, so
//! the connection carrying it is torn down.

use crate::error::LanternError;

/// Header prefixed to every TCP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Byte count of the whole body that follows this header.
    pub total_len: u32,

    /// Byte count of the CBOR structured payload at the start of the body.
    pub structured_len: u32,

    /// Byte count of the opaque binary attachment that follows it.
    pub binary_len: u32,
}

impl FrameHeader {
    /// Encoded size of the header in bytes.
    pub const SIZE: usize = 12;

    /// Build a header for a body with the given section lengths.
    pub fn new(structured_len: u32, binary_len: u32) -> Self {
        Self {
            total_len: structured_len + binary_len,
            structured_len,
            binary_len,
        }
    }

    /// Encode into the 12-byte wire representation.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.total_len.to_be_bytes());
        buf[4..8].copy_from_slice(&self.structured_len.to_be_bytes());
        buf[8..12].copy_from_slice(&self.binary_len.to_be_bytes());
        buf
    }

    /// Decode from the first [`Self::SIZE`] bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, LanternError> {
        if buf.len() < Self::SIZE {
            return Err(LanternError::InvalidHeader("truncated header"));
        }
        Ok(Self {
            total_len: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            structured_len: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            binary_len: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }

    /// Check the length identity the framing relies on.
    pub fn validate(&self) -> Result<(), LanternError> {
        let sum = u64::from(self.structured_len) + u64::from(self.binary_len);
        if u64::from(self.total_len) != sum {
            return Err(LanternError::InvalidHeader(
                "total length does not equal structured + binary",
            ));
        }
        Ok(())
    }

    /// Length of the body announced by this header.
    pub fn body_len(&self) -> usize {
        self.total_len as usize
    }
}
