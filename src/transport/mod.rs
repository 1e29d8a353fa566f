//! Byte-stream transport underneath the canvas protocol.
//!
//! A [`Transport`] is a duplex stream whose reads take an explicit
//! [`ReadMode`]. The handshake and refresh paths read in
//! [`ReadMode::Blocking`]; the per-tick stroke poll reads in
//! [`ReadMode::NonBlocking`] and treats [`Recv::WouldBlock`] as "nothing
//! pending". Implementations switch the socket mode for the duration of
//! one call and put it back before returning, on every path.
//!
//! ```text
//! ConnectionManager ──owns──► Box<dyn Transport>
//!        │                          │
//!        │ connect(addr)            ├── TcpTransport     (std::net::TcpStream)
//!        ▼                          └── MemoryTransport  (scripted, tests)
//!   dyn Connector
//! ```

pub mod memory;
pub mod tcp;

use std::fmt;
use std::io;
use std::net::SocketAddr;

pub use memory::{MemoryHandle, MemoryTransport, ScriptedConnector};
pub use tcp::{TcpConnector, TcpTransport};

/// How a single read call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Wait until at least one byte arrives or the peer closes.
    Blocking,
    /// Return [`Recv::WouldBlock`] immediately when nothing is buffered.
    NonBlocking,
}

/// Outcome of [`Transport::recv_available`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recv {
    /// At least one byte, at most the requested maximum.
    Data(Vec<u8>),
    /// Non-blocking read with nothing buffered. Not an error.
    WouldBlock,
    /// The peer closed its side of the stream.
    Closed,
}

/// Duplex byte stream used by the connection manager.
pub trait Transport: fmt::Debug {
    /// Write all of `bytes`.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read up to `max_bytes` that are available, waiting according to `mode`.
    fn recv_available(&mut self, max_bytes: usize, mode: ReadMode) -> io::Result<Recv>;

    /// Zero-length write used as a liveness probe.
    fn probe(&mut self) -> io::Result<()>;

    /// Half-close the write side so the peer sees end-of-stream.
    fn shutdown_write(&mut self) -> io::Result<()>;
}

/// Opens transports to resolved server addresses.
///
/// Split from [`Transport`] so the connection manager's state machine can be
/// driven by scripted connectors in tests.
pub trait Connector: fmt::Debug {
    /// Resolve `host:port` into candidate addresses, in preference order.
    fn resolve(&mut self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;

    /// Open a stream to one address.
    fn connect(&mut self, addr: SocketAddr) -> io::Result<Box<dyn Transport>>;
}
