//! Line-mode reads for the handshake and refresh exchanges.
//!
//! Both readers pass [`ReadMode::Blocking`] on every call, so the transport
//! only leaves its resting mode for the duration of each read and is back
//! in it whether the read succeeds, fails, or the line is truncated.

use crate::error::{SyncError, SyncResult};
use crate::transport::{ReadMode, Recv, Transport};

/// Read one `\n`-terminated line, byte by byte.
///
/// Stops after `max_len - 1` bytes if no terminator shows up; the truncated
/// line is returned and the rest stays in the stream. The terminator is not
/// included in the result.
pub fn read_line(transport: &mut dyn Transport, max_len: usize) -> SyncResult<Vec<u8>> {
    let limit = max_len.saturating_sub(1);
    let mut line = Vec::with_capacity(limit.min(256));

    while line.len() < limit {
        match transport.recv_available(1, ReadMode::Blocking)? {
            Recv::Data(byte) => {
                if byte[0] == b'\n' {
                    return Ok(line);
                }
                line.push(byte[0]);
            }
            Recv::WouldBlock => {}
            Recv::Closed => {
                return Err(SyncError::ShortRead {
                    expected: line.len() + 1,
                    received: line.len(),
                });
            }
        }
    }

    log::warn!("[Framing] Line exceeded {limit} bytes, truncating");
    Ok(line)
}

/// Read exactly `length` bytes, looping over partial reads.
pub fn read_exact(transport: &mut dyn Transport, length: usize) -> SyncResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(length);

    while buf.len() < length {
        match transport.recv_available(length - buf.len(), ReadMode::Blocking)? {
            Recv::Data(chunk) => buf.extend_from_slice(&chunk),
            Recv::WouldBlock => {}
            Recv::Closed => {
                return Err(SyncError::ShortRead {
                    expected: length,
                    received: buf.len(),
                });
            }
        }
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    #[test]
    fn test_read_line_strips_terminator() {
        let (mut transport, handle) = MemoryTransport::pair();
        handle.push_bytes(b"{\"width\":4}\nrest");
        let line = read_line(&mut transport, 64).unwrap();
        assert_eq!(line, b"{\"width\":4}");
        assert_eq!(handle.pending_inbound(), 4);
    }

    #[test]
    fn test_read_line_across_fragments() {
        let (mut transport, handle) = MemoryTransport::pair();
        handle.push_bytes(b"ab");
        handle.push_would_block();
        handle.push_bytes(b"c\n");
        assert_eq!(read_line(&mut transport, 64).unwrap(), b"abc");
    }

    #[test]
    fn test_read_line_truncates_at_max_len() {
        let (mut transport, handle) = MemoryTransport::pair();
        handle.push_bytes(b"abcdefgh\n");
        let line = read_line(&mut transport, 5).unwrap();
        assert_eq!(line, b"abcd");
        assert_eq!(handle.pending_inbound(), 5);
    }

    #[test]
    fn test_read_line_closed_midway() {
        let (mut transport, handle) = MemoryTransport::pair();
        handle.push_bytes(b"abc");
        handle.push_closed();
        assert!(matches!(
            read_line(&mut transport, 64),
            Err(SyncError::ShortRead { received: 3, .. })
        ));
    }

    #[test]
    fn test_reads_are_all_blocking() {
        let (mut transport, handle) = MemoryTransport::pair();
        handle.push_bytes(b"x\n12345");
        read_line(&mut transport, 64).unwrap();
        read_exact(&mut transport, 5).unwrap();
        assert!(handle.read_modes().iter().all(|m| *m == ReadMode::Blocking));
    }

    #[test]
    fn test_read_exact_loops_over_partial_reads() {
        let (mut transport, handle) = MemoryTransport::pair();
        handle.push_bytes(b"12");
        handle.push_bytes(b"345");
        handle.push_bytes(b"67");
        assert_eq!(read_exact(&mut transport, 6).unwrap(), b"123456");
        assert_eq!(handle.pending_inbound(), 1);
    }

    #[test]
    fn test_read_exact_short_read() {
        let (mut transport, handle) = MemoryTransport::pair();
        handle.push_bytes(b"1234");
        handle.push_closed();
        match read_exact(&mut transport, 10) {
            Err(SyncError::ShortRead { expected, received }) => {
                assert_eq!(expected, 10);
                assert_eq!(received, 4);
            }
            other => panic!("expected ShortRead, got {other:?}"),
        }
    }

    #[test]
    fn test_read_exact_zero_length() {
        let (mut transport, handle) = MemoryTransport::pair();
        assert!(read_exact(&mut transport, 0).unwrap().is_empty());
        assert!(handle.read_modes().is_empty());
    }
}
