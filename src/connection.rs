//! Connection lifecycle for the canvas server.
//!
//! # State machine
//!
//! ```text
//!                 initialize / reconnect ok
//!   Disconnected ───────────────────────────► Connected
//!        ▲   ▲            (Connecting while         │
//!        │   │             addresses are tried)     │ probe / read / write
//!        │   │                                      │ reports connection loss
//!        │   └──────────────────────────────────────┘
//!        │
//!        └──── Faulted ◄── other I/O error on a live handle
//!              (handle kept until the next ensure_connected)
//!
//!   any state ──disconnect()──► Disconnected
//! ```
//!
//! The manager never retries on its own. Each caller gets at most one
//! reconnect per action through [`ConnectionManager::ensure_connected`].
//!
//! The transport is owned here and only lent out for the length of one
//! call, so nothing upstream can keep a handle across a reconnect.

use std::fmt;
use std::time::Duration;

use crate::constants::{DEFAULT_CONNECT_TIMEOUT, INBOUND_READ_CHUNK, MAX_INBOUND_READS_PER_TICK};
use crate::error::{is_connection_lost, SyncError, SyncResult};
use crate::protocol::framing;
use crate::transport::{Connector, ReadMode, Recv, TcpConnector, Transport};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Trying resolved addresses.
    Connecting,
    /// Transport open and believed healthy.
    Connected,
    /// An I/O error was seen; the transport is pending close.
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Owns the transport and its lifecycle.
pub struct ConnectionManager {
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    server_host: String,
    server_port: u16,
    connector: Box<dyn Connector>,
    generation: u64,
    reconnect_attempts: u64,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("server", &format_args!("{}:{}", self.server_host, self.server_port))
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Manager for `host:port` using `connector`. Does not connect yet.
    pub fn new(host: impl Into<String>, port: u16, connector: Box<dyn Connector>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            transport: None,
            server_host: host.into(),
            server_port: port,
            connector,
            generation: 0,
            reconnect_attempts: 0,
        }
    }

    /// Manager using plain TCP with the default connect timeout.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::tcp_with_timeout(host, port, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Manager using plain TCP, giving up on each address after `timeout`.
    pub fn tcp_with_timeout(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self::new(host, port, Box::new(TcpConnector::with_timeout(timeout)))
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a transport is open and healthy.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.transport.is_some()
    }

    /// Whether any transport handle is held.
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Server host name or address.
    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    /// Server port.
    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// Incremented on every successful connect.
    ///
    /// A change tells the session that the stream was replaced and the
    /// server will open with a fresh handshake.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of `reconnect` calls so far.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Point the manager at `host:port` and connect.
    ///
    /// Any open transport is shut down first.
    pub fn initialize(&mut self, host: &str, port: u16) -> SyncResult<()> {
        self.server_host = host.to_owned();
        self.server_port = port;
        self.graceful_close();
        self.open()
    }

    /// Connect to the configured server.
    pub fn connect(&mut self) -> SyncResult<()> {
        self.graceful_close();
        self.open()
    }

    /// Liveness probe via a zero-length write.
    ///
    /// A probe can pass on a half-open connection that only fails on the
    /// next real read or write; callers must still handle those failures.
    pub fn check_connection(&mut self) -> bool {
        if self.state == ConnectionState::Faulted {
            log::debug!("[Conn] Faulted connection fails liveness check");
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            self.state = ConnectionState::Disconnected;
            return false;
        };
        match transport.probe() {
            Ok(()) => true,
            Err(e) if is_connection_lost(&e) => {
                log::warn!("[Conn] Probe detected connection loss: {e}");
                self.drop_transport();
                false
            }
            Err(e) => {
                log::debug!("[Conn] Probe error treated as transient: {e}");
                true
            }
        }
    }

    /// Tear down whatever is open and connect again.
    pub fn reconnect(&mut self) -> bool {
        self.reconnect_attempts += 1;
        log::info!(
            "[Conn] Reconnecting to {}:{} (attempt {})",
            self.server_host,
            self.server_port,
            self.reconnect_attempts
        );
        self.graceful_close();
        match self.open() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[Conn] Reconnect failed: {e}");
                false
            }
        }
    }

    /// Probe, and reconnect once if the probe fails.
    ///
    /// `false` means the caller's operation must be abandoned.
    pub fn ensure_connected(&mut self) -> bool {
        self.check_connection() || self.reconnect()
    }

    /// Mark the stream unusable without closing it yet.
    ///
    /// Used when the byte stream is out of step with the protocol. The next
    /// `ensure_connected` fails its check and reconnects.
    pub fn fault(&mut self, reason: &str) {
        if self.transport.is_some() {
            log::warn!("[Conn] Marking connection faulted: {reason}");
            self.state = ConnectionState::Faulted;
        }
    }

    /// Graceful shutdown and close. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.transport.is_some() {
            log::info!("[Conn] Disconnecting from {}:{}", self.server_host, self.server_port);
        }
        self.graceful_close();
    }

    // ── I/O ─────────────────────────────────────────────────────────────────

    /// Send bytes on the live transport.
    ///
    /// Failures come back as [`SyncError::SendFailure`]; a lost connection
    /// also closes the transport.
    pub fn send(&mut self, bytes: &[u8]) -> SyncResult<()> {
        if self.state != ConnectionState::Connected {
            return Err(SyncError::NotConnected);
        }
        let transport = self.transport.as_mut().ok_or(SyncError::NotConnected)?;
        match transport.send(bytes) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.note_io_error(&e);
                Err(SyncError::SendFailure(e))
            }
        }
    }

    /// Read whatever is available, up to `max_bytes`.
    ///
    /// [`Recv::Closed`] closes the transport before it is returned.
    pub fn recv_available(&mut self, max_bytes: usize, mode: ReadMode) -> SyncResult<Recv> {
        let transport = self.transport.as_mut().ok_or(SyncError::NotConnected)?;
        match transport.recv_available(max_bytes, mode) {
            Ok(Recv::Closed) => {
                log::warn!("[Conn] Server closed the connection");
                self.drop_transport();
                Ok(Recv::Closed)
            }
            Ok(recv) => Ok(recv),
            Err(e) => {
                self.note_io_error(&e);
                Err(SyncError::Io(e))
            }
        }
    }

    /// Line-mode read (blocking for its duration).
    pub fn read_line(&mut self, max_len: usize) -> SyncResult<Vec<u8>> {
        let transport = self.transport.as_mut().ok_or(SyncError::NotConnected)?;
        let result = framing::read_line(transport.as_mut(), max_len);
        self.note_read_result(&result);
        result
    }

    /// Exact-length read (blocking for its duration).
    pub fn read_exact(&mut self, length: usize) -> SyncResult<Vec<u8>> {
        let transport = self.transport.as_mut().ok_or(SyncError::NotConnected)?;
        let result = framing::read_exact(transport.as_mut(), length);
        self.note_read_result(&result);
        result
    }

    // ── Internal ────────────────────────────────────────────────────────────

    fn open(&mut self) -> SyncResult<()> {
        self.state = ConnectionState::Connecting;

        let addrs = match self.connector.resolve(&self.server_host, self.server_port) {
            Ok(addrs) if !addrs.is_empty() => addrs,
            Ok(_) => {
                self.state = ConnectionState::Disconnected;
                return Err(SyncError::Resolution(self.server_host.clone()));
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                return Err(SyncError::Resolution(format!("{}: {e}", self.server_host)));
            }
        };

        let mut failures = Vec::with_capacity(addrs.len());
        for addr in addrs {
            match self.connector.connect(addr) {
                Ok(transport) => {
                    self.transport = Some(transport);
                    self.state = ConnectionState::Connected;
                    self.generation += 1;
                    log::info!("[Conn] Connected to {addr}");
                    return Ok(());
                }
                Err(e) => {
                    log::debug!("[Conn] Connect to {addr} failed: {e}");
                    failures.push(format!("{addr}: {e}"));
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        Err(SyncError::Connect(failures.join("; ")))
    }

    /// Half-close, drain what the server already sent, then close.
    fn graceful_close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.shutdown_write() {
                log::debug!("[Conn] shutdown(write) failed: {e}");
            }
            for _ in 0..MAX_INBOUND_READS_PER_TICK {
                match transport.recv_available(INBOUND_READ_CHUNK, ReadMode::NonBlocking) {
                    Ok(Recv::Data(bytes)) => {
                        log::debug!("[Conn] Drained {} bytes before close", bytes.len());
                    }
                    Ok(Recv::WouldBlock | Recv::Closed) | Err(_) => break,
                }
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Close without the graceful handshake (peer is already gone).
    fn drop_transport(&mut self) {
        self.transport = None;
        self.state = ConnectionState::Disconnected;
    }

    fn note_io_error(&mut self, e: &std::io::Error) {
        if is_connection_lost(e) {
            log::warn!("[Conn] Connection lost: {e}");
            self.drop_transport();
        } else {
            log::warn!("[Conn] I/O error, marking connection faulted: {e}");
            self.state = ConnectionState::Faulted;
        }
    }

    fn note_read_result<T>(&mut self, result: &SyncResult<T>) {
        match result {
            Err(SyncError::ShortRead { .. }) => {
                log::warn!("[Conn] Server closed the connection mid-read");
                self.drop_transport();
            }
            Err(SyncError::Io(e)) => self.note_io_error(e),
            _ => {}
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.graceful_close();
    }
}
