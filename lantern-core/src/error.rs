//! Domain-specific error types for the lantern protocol.
//!
//! All fallible operations return `Result<T, LanternError>`.
//! No panics on invalid input: every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the lantern protocol.
#[derive(Debug, Error)]
pub enum LanternError {
    // ── Framing Errors ───────────────────────────────────────────
    /// A field in the frame header could not be parsed.
    #[error("invalid frame header: {0}")]
    InvalidHeader(&'static str),

    /// Frame size exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Protocol Errors ──────────────────────────────────────────
    /// A structured payload carried a tag this build does not know.
    #[error("unknown message tag: {0}")]
    UnknownTag(String),

    /// A message or state transition violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Connection Errors ────────────────────────────────────────
    /// The socket/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Application Errors ───────────────────────────────────────
    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LanternError {
    fn from(s: String) -> Self {
        LanternError::Other(s)
    }
}

impl From<&str> for LanternError {
    fn from(s: &str) -> Self {
        LanternError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LanternError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LanternError::ChannelClosed
    }
}

impl From<serde_json::Error> for LanternError {
    fn from(e: serde_json::Error) -> Self {
        LanternError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = LanternError::InvalidHeader("length mismatch");
        assert!(e.to_string().contains("length mismatch"));

        let e = LanternError::FrameTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn from_string() {
        let e: LanternError = "something broke".into();
        assert!(matches!(e, LanternError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: LanternError = io_err.into();
        assert!(matches!(e, LanternError::Connection(_)));
    }

    #[test]
    fn from_json() {
        let bad = serde_json::from_str::<serde_json::Value>("{nope");
        let e: LanternError = bad.unwrap_err().into();
        assert!(matches!(e, LanternError::Encoding(_)));
    }
}
