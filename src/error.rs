//! Error taxonomy for the synchronization layer.
//!
//! Handshake and refresh failures leave prior state untouched, per-tick
//! failures are recovered locally by the session. Nothing here is fatal to
//! the process; callers log and keep drawing.

use std::io;

/// Errors produced by the connection, codec, and snapshot layers.
#[derive(Debug)]
pub enum SyncError {
    /// The server host resolved to no usable address.
    Resolution(String),
    /// Every resolved address refused or failed the connection.
    Connect(String),
    /// The stream closed before the expected number of bytes arrived.
    ShortRead {
        /// Bytes the caller asked for.
        expected: usize,
        /// Bytes received before the stream closed.
        received: usize,
    },
    /// A handshake or refresh line lacks a required field or marker.
    MalformedHeader(String),
    /// The inflater did not finish exactly at the end of the output buffer.
    Decompression(String),
    /// A size field is out of bounds or disagrees with the installed canvas.
    Protocol(String),
    /// A binary stroke packet failed length or field validation.
    InvalidPacket(String),
    /// A write failed (broken pipe, not connected, reset).
    SendFailure(io::Error),
    /// An operation needed a live transport and there was none.
    NotConnected,
    /// Any other transport-level I/O failure.
    Io(io::Error),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolution(host) => write!(f, "Could not resolve {host}"),
            Self::Connect(msg) => write!(f, "Connect failed: {msg}"),
            Self::ShortRead { expected, received } => {
                write!(f, "Stream closed after {received} of {expected} bytes")
            }
            Self::MalformedHeader(msg) => write!(f, "Malformed header: {msg}"),
            Self::Decompression(msg) => write!(f, "Decompression failed: {msg}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::InvalidPacket(msg) => write!(f, "Invalid packet: {msg}"),
            Self::SendFailure(e) => write!(f, "Send failed: {e}"),
            Self::NotConnected => write!(f, "Not connected"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SendFailure(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SyncError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Result alias for the synchronization layer.
pub type SyncResult<T> = Result<T, SyncError>;

/// Whether an I/O error means the peer is gone rather than a transient hiccup.
pub fn is_connection_lost(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_short_read() {
        let err = SyncError::ShortRead { expected: 50, received: 12 };
        assert_eq!(err.to_string(), "Stream closed after 12 of 50 bytes");
    }

    #[test]
    fn test_connection_lost_kinds() {
        assert!(is_connection_lost(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_connection_lost(&io::Error::from(io::ErrorKind::NotConnected)));
        assert!(!is_connection_lost(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_connection_lost(&io::Error::from(io::ErrorKind::Interrupted)));
    }

    #[test]
    fn test_send_failure_exposes_source() {
        use std::error::Error;
        let err = SyncError::SendFailure(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.source().is_some());
        assert!(SyncError::NotConnected.source().is_none());
    }
}
