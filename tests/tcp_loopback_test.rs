//! End-to-end sync against a canvas server on a loopback socket.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use drawlink::{
    Brush, BrushShape, ConnectionManager, ConnectionState, Rgb, SessionOptions, StrokeBatch,
    StrokePoint, SyncSession, TickReport,
};
use flate2::write::ZlibEncoder;
use flate2::Compression;

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn send_handshake(stream: &mut TcpStream, width: u32, height: u32, fill: u8) {
    let payload = zlib(&vec![fill; (width * height * 3) as usize]);
    let header = format!(
        "{{\"width\":{width},\"height\":{height},\"compressedSize\":{}}}\n",
        payload.len()
    );
    stream.write_all(header.as_bytes()).unwrap();
    stream.write_all(&payload).unwrap();
}

fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn session_on(port: u16) -> SyncSession {
    SyncSession::new(ConnectionManager::tcp("127.0.0.1", port), SessionOptions::default())
}

/// Tick until `done` accepts a report, failing after a few seconds.
fn tick_until(session: &mut SyncSession, mut done: impl FnMut(&TickReport) -> bool) -> TickReport {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let report = session.tick();
        if done(&report) {
            return report;
        }
        assert!(Instant::now() < deadline, "timed out waiting on the server");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_full_sync_cycle() {
    let (listener, port) = bind();
    let remote = StrokeBatch::new(
        Brush {
            color: Rgb::new(0, 128, 255),
            size: 4,
            shape: BrushShape::Square,
        },
        vec![StrokePoint::new(5, 6), StrokePoint::new(7, 8)],
    );
    let remote_wire = remote.encode();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        send_handshake(&mut stream, 100, 100, 255);

        // Ten points arrive as one 47-byte batch.
        let mut batch = vec![0u8; 47];
        stream.read_exact(&mut batch).unwrap();

        stream.write_all(&remote_wire).unwrap();

        let mut request = [0u8; 10];
        stream.read_exact(&mut request).unwrap();
        assert_eq!(&request, b"getCanvas\n");
        let payload = zlib(&vec![0u8; 100 * 100 * 3]);
        let header = format!(
            "{{\"type\":\"compressedCanvas\",\"compressedSize\":{}}}\n",
            payload.len()
        );
        stream.write_all(header.as_bytes()).unwrap();
        stream.write_all(&payload).unwrap();
        batch
    });

    let mut session = session_on(port);
    session.start().unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
    let canvas = session.canvas().unwrap();
    assert_eq!((canvas.width(), canvas.height()), (100, 100));
    assert_eq!(canvas.pixel(50, 50), Some(Rgb::new(255, 255, 255)));

    session.begin_stroke(Brush::default());
    for i in 0..10 {
        session.add_point(i, i * 2);
    }

    let report = tick_until(&mut session, |r| !r.inbound.is_empty());
    assert_eq!(report.inbound, vec![remote]);

    session.request_refresh();
    let report = session.tick();
    assert!(report.refreshed);
    assert_eq!(session.canvas().unwrap().pixel(50, 50), Some(Rgb::new(0, 0, 0)));

    let sent = StrokeBatch::decode(&server.join().unwrap()).unwrap();
    assert_eq!(sent.points.len(), 10);
    assert_eq!(sent.points[9], StrokePoint::new(9, 18));
    session.shutdown();
}

#[test]
fn test_reconnect_after_server_restart_rehandshakes() {
    let (listener, port) = bind();

    let server = thread::spawn(move || {
        let (mut first, _) = listener.accept().unwrap();
        send_handshake(&mut first, 8, 8, 1);
        drop(first);

        let (mut second, _) = listener.accept().unwrap();
        send_handshake(&mut second, 8, 8, 2);
        let mut batch = vec![0u8; 7 + 4];
        second.read_exact(&mut batch).unwrap();
        batch
    });

    let mut session = session_on(port);
    session.start().unwrap();
    assert_eq!(session.canvas().unwrap().pixels()[0], 1);

    let report = tick_until(&mut session, |r| r.peer_closed);
    assert!(report.inbound.is_empty());
    assert!(session.is_peer_closed());

    assert!(session.reconnect());
    assert_eq!(session.canvas().unwrap().pixels()[0], 2);

    session.begin_stroke(Brush::default());
    session.add_point(3, 4);
    assert!(session.end_stroke());

    let sent = StrokeBatch::decode(&server.join().unwrap()).unwrap();
    assert_eq!(sent.points, vec![StrokePoint::new(3, 4)]);
}

#[test]
fn test_nothing_listening_fails_to_connect() {
    let (listener, port) = bind();
    drop(listener);

    let mut session = session_on(port);
    assert!(session.start().is_err());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.canvas().is_none());
}
