//! Session scenarios over the scripted in-memory transport.

use std::io::Write;

use drawlink::transport::{MemoryHandle, ScriptedConnector};
use drawlink::{
    Brush, ConnectionManager, ConnectionState, SessionOptions, StrokeBatch, SyncError,
    SyncSession,
};
use flate2::write::ZlibEncoder;
use flate2::Compression;

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn header(width: u32, height: u32, compressed: usize) -> Vec<u8> {
    format!("{{\"width\":{width},\"height\":{height},\"compressedSize\":{compressed}}}\n")
        .into_bytes()
}

fn connected_session(options: SessionOptions) -> (SyncSession, MemoryHandle, ScriptedConnector) {
    let connector = ScriptedConnector::loopback();
    let handle = connector.accept_next();
    let conn = ConnectionManager::new("canvas.test", 3030, Box::new(connector.clone()));
    (SyncSession::new(conn, options), handle, connector)
}

#[test]
fn test_small_payload_inflates_to_full_canvas() {
    let (mut session, handle, _connector) = connected_session(SessionOptions::default());
    let payload = zlib(&[0u8; 100 * 100 * 3]);
    assert!(payload.len() < 100);
    handle.push_bytes(&header(100, 100, payload.len()));
    handle.push_bytes(&payload);

    session.start().unwrap();
    assert_eq!(session.canvas().unwrap().pixels().len(), 30_000);
}

#[test]
fn test_truncated_payload_installs_nothing() {
    let (mut session, handle, _connector) = connected_session(SessionOptions::default());
    let pixels: Vec<u8> = (0..100 * 100 * 3).map(|i| (i * 7 % 253) as u8).collect();
    let payload = zlib(&pixels);
    // Header is honest about the size but the stream itself was cut short
    // before it was sent.
    let cut = &payload[..payload.len() / 2];
    handle.push_bytes(&header(100, 100, cut.len()));
    handle.push_bytes(cut);

    assert!(matches!(session.start(), Err(SyncError::Decompression(_))));
    assert!(session.canvas().is_none());
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn test_server_closing_mid_payload_is_short_read() {
    let (mut session, handle, _connector) = connected_session(SessionOptions::default());
    let payload = zlib(&[0u8; 300]);
    handle.push_bytes(&header(10, 10, payload.len()));
    handle.push_bytes(&payload[..payload.len() - 1]);
    handle.push_closed();

    assert!(matches!(
        session.start(),
        Err(SyncError::ShortRead { received, expected }) if received + 1 == expected
    ));
    assert!(session.canvas().is_none());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.is_peer_closed());
}

#[test]
fn test_compressed_size_over_limit_rejected_before_read() {
    let options = SessionOptions {
        max_refresh_bytes: 64,
        ..SessionOptions::default()
    };
    let (mut session, handle, _connector) = connected_session(options);
    handle.push_bytes(&header(10, 10, 65));
    handle.push_bytes(&[0u8; 65]);

    assert!(matches!(session.start(), Err(SyncError::Protocol(_))));
    assert_eq!(handle.pending_inbound(), 65);
    assert_eq!(session.state(), ConnectionState::Faulted);
}

#[test]
fn test_huge_dimensions_rejected_without_allocating() {
    let (mut session, handle, _connector) = connected_session(SessionOptions::default());
    let payload = zlib(&[0u8; 3]);
    handle.push_bytes(&header(4_000_000, 4_000_000, payload.len()));
    handle.push_bytes(&payload);

    assert!(matches!(session.start(), Err(SyncError::Protocol(_))));
    assert!(session.canvas().is_none());
}

#[test]
fn test_rejected_header_reconnects_for_next_stroke() {
    let (mut session, handle, connector) = connected_session(SessionOptions::default());
    handle.push_bytes(b"{\"width\":2,\"height\":2,\"canvasSize\":5}\n");
    handle.push_bytes(&[0u8; 5]);
    assert!(session.start().is_err());
    assert_eq!(session.state(), ConnectionState::Faulted);

    let second = connector.accept_next();
    let payload = zlib(&[4u8; 12]);
    second.push_bytes(&header(2, 2, payload.len()));
    second.push_bytes(&payload);

    session.begin_stroke(Brush::default());
    session.add_point(1, 1);
    assert!(session.end_stroke());
    assert!(handle.sent().is_empty());
    assert_eq!(second.sent().len(), 1);
    assert_eq!(session.canvas().unwrap().pixels()[0], 4);
}

#[test]
fn test_ten_points_make_one_batch() {
    let (mut session, handle, _connector) = connected_session(SessionOptions::default());
    let payload = zlib(&[0u8; 12]);
    handle.push_bytes(&header(2, 2, payload.len()));
    handle.push_bytes(&payload);
    session.start().unwrap();

    session.begin_stroke(Brush::default());
    let flushed: Vec<bool> = (0..10).map(|i| session.add_point(i, 0)).collect();
    assert_eq!(flushed.iter().filter(|&&f| f).count(), 1);
    assert!(flushed[9]);

    let sent = handle.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].len(), 47);
    assert_eq!(StrokeBatch::decode(&sent[0]).unwrap().points.len(), 10);
    assert!(!session.end_stroke());
}

#[test]
fn test_custom_flush_threshold() {
    let options = SessionOptions {
        flush_threshold: 3,
        ..SessionOptions::default()
    };
    let (mut session, handle, _connector) = connected_session(options);
    let payload = zlib(&[0u8; 12]);
    handle.push_bytes(&header(2, 2, payload.len()));
    handle.push_bytes(&payload);
    session.start().unwrap();

    session.begin_stroke(Brush::default());
    for i in 0..7 {
        session.add_point(i, i);
    }
    session.end_stroke();
    let sizes: Vec<usize> = handle
        .sent()
        .iter()
        .map(|b| StrokeBatch::decode(b).unwrap().points.len())
        .collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[test]
fn test_strokes_flow_without_canvas() {
    let (mut session, handle, _connector) = connected_session(SessionOptions::default());
    // Well-formed header, undecodable payload: the stream stays in step.
    handle.push_bytes(&header(2, 2, 4));
    handle.push_bytes(b"junk");
    assert!(matches!(session.start(), Err(SyncError::Decompression(_))));
    assert_eq!(session.state(), ConnectionState::Connected);

    session.begin_stroke(Brush::default());
    session.add_point(1, 1);
    assert!(session.end_stroke());
    assert_eq!(handle.sent().len(), 1);
}

#[test]
fn test_shutdown_flushes_and_closes() {
    let (mut session, handle, _connector) = connected_session(SessionOptions::default());
    let payload = zlib(&[0u8; 12]);
    handle.push_bytes(&header(2, 2, payload.len()));
    handle.push_bytes(&payload);
    session.start().unwrap();

    session.begin_stroke(Brush::default());
    session.add_point(4, 4);
    session.shutdown();

    assert_eq!(handle.sent().len(), 1);
    assert!(handle.is_write_shut());
    assert!(handle.is_closed());
    assert_eq!(session.state(), ConnectionState::Disconnected);

    session.shutdown();
}
