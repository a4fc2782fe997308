//! The unit of exchange on a peer link.

use bytes::Bytes;

use crate::header::FrameHeader;

/// A single frame: CBOR structured payload plus an opaque binary
/// attachment.
///
/// Most messages travel with an empty attachment. Screen frames and
/// file chunks put their bulk in the attachment so the CBOR section
/// stays small and cheap to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// CBOR-encoded structured payload.
    pub structured: Bytes,

    /// Opaque binary attachment, owned by whatever message the
    /// structured payload carries.
    pub attachment: Bytes,
}

impl Frame {
    /// Build a frame from its two body sections.
    pub fn new(structured: Bytes, attachment: Bytes) -> Self {
        Self {
            structured,
            attachment,
        }
    }

    /// Build a frame with no binary attachment.
    pub fn structured_only(structured: Bytes) -> Self {
        Self::new(structured, Bytes::new())
    }

    /// Header describing this frame's body.
    pub fn header(&self) -> FrameHeader {
        FrameHeader::new(self.structured.len() as u32, self.attachment.len() as u32)
    }

    /// Total wire size: header plus both body sections.
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.structured.len() + self.attachment.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_reflects_section_lengths() {
        let frame = Frame::new(Bytes::from(vec![1, 2, 3]), Bytes::from(vec![9; 10]));
        let header = frame.header();

        assert_eq!(header.structured_len, 3);
        assert_eq!(header.binary_len, 10);
        assert_eq!(header.total_len, 13);
    }

    #[test]
    fn structured_only_has_empty_attachment() {
        let frame = Frame::structured_only(Bytes::from_static(b"payload"));
        assert!(frame.attachment.is_empty());
        assert_eq!(frame.header().binary_len, 0);
    }

    #[test]
    fn encoded_len_includes_header() {
        let frame = Frame::new(Bytes::from(vec![0; 5]), Bytes::from(vec![0; 7]));
        assert_eq!(frame.encoded_len(), FrameHeader::SIZE + 12);
    }
}
