//! In-memory scripted transport and connector.
//!
//! Lets the connection state machine and the session run without sockets:
//! the test side holds a [`MemoryHandle`] to queue inbound chunks, inject
//! probe/send failures, and inspect what the client wrote.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Connector, ReadMode, Recv, Transport};

#[derive(Debug, Clone)]
enum Chunk {
    Data(Vec<u8>),
    WouldBlock,
    Closed,
}

#[derive(Debug, Default)]
struct Shared {
    inbound: VecDeque<Chunk>,
    sent: Vec<Vec<u8>>,
    probe_error: Option<io::ErrorKind>,
    send_errors: VecDeque<io::ErrorKind>,
    read_modes: Vec<ReadMode>,
    write_shut: bool,
    dropped: bool,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client end of a scripted in-memory stream.
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

/// Test-side control of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransport {
    /// Create a transport and the handle that scripts it.
    pub fn pair() -> (Self, MemoryHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MemoryHandle { shared },
        )
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        lock(&self.shared).dropped = true;
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut shared = lock(&self.shared);
        if let Some(kind) = shared.send_errors.pop_front() {
            return Err(io::Error::from(kind));
        }
        if shared.write_shut {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        shared.sent.push(bytes.to_vec());
        Ok(())
    }

    fn recv_available(&mut self, max_bytes: usize, mode: ReadMode) -> io::Result<Recv> {
        let mut shared = lock(&self.shared);
        shared.read_modes.push(mode);
        loop {
            let Some(chunk) = shared.inbound.pop_front() else {
                // Nothing will ever be queued while a blocking read waits.
                return Ok(match mode {
                    ReadMode::Blocking => Recv::Closed,
                    ReadMode::NonBlocking => Recv::WouldBlock,
                });
            };
            match chunk {
                Chunk::Data(mut data) => {
                    let max = max_bytes.max(1);
                    if data.len() > max {
                        let rest = data.split_off(max);
                        shared.inbound.push_front(Chunk::Data(rest));
                    }
                    return Ok(Recv::Data(data));
                }
                Chunk::WouldBlock => {
                    if mode == ReadMode::NonBlocking {
                        return Ok(Recv::WouldBlock);
                    }
                }
                Chunk::Closed => {
                    shared.inbound.push_front(Chunk::Closed);
                    return Ok(Recv::Closed);
                }
            }
        }
    }

    fn probe(&mut self) -> io::Result<()> {
        match lock(&self.shared).probe_error {
            Some(kind) => Err(io::Error::from(kind)),
            None => Ok(()),
        }
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        lock(&self.shared).write_shut = true;
        Ok(())
    }
}

impl MemoryHandle {
    /// Queue bytes for the client to read.
    pub fn push_bytes(&self, bytes: &[u8]) {
        lock(&self.shared).inbound.push_back(Chunk::Data(bytes.to_vec()));
    }

    /// Queue a point where a non-blocking read finds nothing.
    pub fn push_would_block(&self) {
        lock(&self.shared).inbound.push_back(Chunk::WouldBlock);
    }

    /// Queue the peer closing the stream.
    pub fn push_closed(&self) {
        lock(&self.shared).inbound.push_back(Chunk::Closed);
    }

    /// Make every liveness probe fail with `kind` (or succeed with `None`).
    pub fn set_probe_error(&self, kind: Option<io::ErrorKind>) {
        lock(&self.shared).probe_error = kind;
    }

    /// Fail the next send with `kind`.
    pub fn fail_next_send(&self, kind: io::ErrorKind) {
        lock(&self.shared).send_errors.push_back(kind);
    }

    /// Every successful write, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).sent.clone()
    }

    /// All successful writes concatenated.
    pub fn sent_bytes(&self) -> Vec<u8> {
        lock(&self.shared).sent.concat()
    }

    /// Modes of every read call so far.
    pub fn read_modes(&self) -> Vec<ReadMode> {
        lock(&self.shared).read_modes.clone()
    }

    /// Bytes queued but not yet read.
    pub fn pending_inbound(&self) -> usize {
        lock(&self.shared)
            .inbound
            .iter()
            .map(|c| match c {
                Chunk::Data(d) => d.len(),
                Chunk::WouldBlock | Chunk::Closed => 0,
            })
            .sum()
    }

    /// Whether the client half-closed its write side.
    pub fn is_write_shut(&self) -> bool {
        lock(&self.shared).write_shut
    }

    /// Whether the client dropped (closed) the transport.
    pub fn is_closed(&self) -> bool {
        lock(&self.shared).dropped
    }
}

#[derive(Debug)]
enum Outcome {
    Accept(MemoryTransport),
    Refuse(io::ErrorKind),
}

/// Connector that hands out pre-built memory transports in order.
///
/// Resolves every host to the configured address list. Each `connect`
/// consumes one scripted outcome; once the script is exhausted connections
/// are refused.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    inner: Arc<Mutex<ConnectorScript>>,
}

#[derive(Debug, Default)]
struct ConnectorScript {
    addrs: Vec<SocketAddr>,
    outcomes: VecDeque<Outcome>,
    resolves: usize,
    attempts: Vec<SocketAddr>,
}

impl ScriptedConnector {
    /// Connector whose hosts all resolve to `addrs`.
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConnectorScript {
                addrs,
                ..ConnectorScript::default()
            })),
        }
    }

    /// Connector resolving to a single loopback address.
    pub fn loopback() -> Self {
        Self::new(vec![SocketAddr::from(([127, 0, 0, 1], 3030))])
    }

    /// Queue a successful connection and return its control handle.
    pub fn accept_next(&self) -> MemoryHandle {
        let (transport, handle) = MemoryTransport::pair();
        self.lock().outcomes.push_back(Outcome::Accept(transport));
        handle
    }

    /// Queue a refused connection attempt.
    pub fn refuse_next(&self, kind: io::ErrorKind) {
        self.lock().outcomes.push_back(Outcome::Refuse(kind));
    }

    /// Number of `connect` calls made so far.
    pub fn attempts(&self) -> usize {
        self.lock().attempts.len()
    }

    /// Addresses tried, in order.
    pub fn attempted_addrs(&self) -> Vec<SocketAddr> {
        self.lock().attempts.clone()
    }

    /// Number of `resolve` calls made so far.
    pub fn resolves(&self) -> usize {
        self.lock().resolves
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorScript> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for ScriptedConnector {
    fn resolve(&mut self, _host: &str, _port: u16) -> io::Result<Vec<SocketAddr>> {
        let mut script = self.lock();
        script.resolves += 1;
        Ok(script.addrs.clone())
    }

    fn connect(&mut self, addr: SocketAddr) -> io::Result<Box<dyn Transport>> {
        let mut script = self.lock();
        script.attempts.push(addr);
        match script.outcomes.pop_front() {
            Some(Outcome::Accept(transport)) => Ok(Box::new(transport)),
            Some(Outcome::Refuse(kind)) => Err(io::Error::from(kind)),
            None => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
        }
    }
}
