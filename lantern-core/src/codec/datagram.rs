//! Discovery announcement datagrams.
//!
//! # Wire Format
//!
//! ```text
//! ┌────────────┬─────────────────────────────────────────┐
//! │ len u32 BE │ CBOR array [display_name, listen_port]  │
//! └────────────┴─────────────────────────────────────────┘
//! ```
//!
//! Unlike the TCP stream, a datagram arrives whole or not at all, so
//! decoding never waits for more bytes. Malformed datagrams are
//! unauthenticated broadcast noise and are dropped by the caller.

use serde::{Deserialize, Serialize};

use crate::error::LanternError;

/// A presence announcement broadcast over UDP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Human-readable name the peer advertises.
    pub display_name: String,

    /// TCP port the peer accepts session connections on.
    pub port: u16,
}

impl Announcement {
    pub fn new(display_name: impl Into<String>, port: u16) -> Self {
        Self {
            display_name: display_name.into(),
            port,
        }
    }

    /// Encode with the length prefix.
    ///
    /// The payload is a two-element CBOR array, not a map, so the
    /// field names never hit the wire.
    pub fn to_datagram(&self) -> Result<Vec<u8>, LanternError> {
        let mut body = Vec::new();
        ciborium::ser::into_writer(&(&self.display_name, self.port), &mut body)
            .map_err(|e| LanternError::Encoding(e.to_string()))?;

        let mut datagram = Vec::with_capacity(4 + body.len());
        datagram.extend_from_slice(&(body.len() as u32).to_be_bytes());
        datagram.extend_from_slice(&body);
        Ok(datagram)
    }

    /// Decode a received datagram.
    ///
    /// Bytes past the announced length are ignored.
    pub fn from_datagram(buf: &[u8]) -> Result<Self, LanternError> {
        if buf.len() < 4 {
            return Err(LanternError::InvalidHeader(
                "datagram shorter than length prefix",
            ));
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let body = buf.get(4..4 + len).ok_or(LanternError::InvalidHeader(
            "datagram shorter than announced length",
        ))?;

        let (display_name, port): (String, u16) = ciborium::de::from_reader(body)
            .map_err(|e| LanternError::Encoding(e.to_string()))?;
        Ok(Self { display_name, port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_roundtrip() {
        let announcement = Announcement::new("alice", 38245);
        let wire = announcement.to_datagram().unwrap();
        let decoded = Announcement::from_datagram(&wire).unwrap();

        assert_eq!(decoded, announcement);
        assert_eq!(decoded.display_name, "alice");
        assert_eq!(decoded.port, 38245);
    }

    #[test]
    fn length_prefix_matches_body() {
        let wire = Announcement::new("bob", 1).to_datagram().unwrap();
        let len = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize;
        assert_eq!(len, wire.len() - 4);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut wire = Announcement::new("carol", 40000).to_datagram().unwrap();
        wire.extend_from_slice(b"junk");
        let decoded = Announcement::from_datagram(&wire).unwrap();
        assert_eq!(decoded.display_name, "carol");
    }

    #[test]
    fn rejects_short_datagram() {
        let result = Announcement::from_datagram(&[0, 0]);
        assert!(matches!(result, Err(LanternError::InvalidHeader(_))));
    }

    #[test]
    fn rejects_truncated_body() {
        let mut wire = Announcement::new("dave", 9).to_datagram().unwrap();
        wire.truncate(wire.len() - 1);
        let result = Announcement::from_datagram(&wire);
        assert!(matches!(result, Err(LanternError::InvalidHeader(_))));
    }

    #[test]
    fn rejects_garbage_body() {
        let mut wire = vec![0, 0, 0, 4];
        wire.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        let result = Announcement::from_datagram(&wire);
        assert!(matches!(result, Err(LanternError::Encoding(_))));
    }

    #[test]
    fn unicode_display_name() {
        let announcement = Announcement::new("pièce-de-résistance", 51000);
        let wire = announcement.to_datagram().unwrap();
        assert_eq!(Announcement::from_datagram(&wire).unwrap(), announcement);
    }
}
