//! TCP transport over `std::net::TcpStream`.
//!
//! The socket rests in non-blocking mode so the tick loop never stalls.
//! A blocking read flips it for one call; a scope guard flips it back even
//! when the read errors out.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{Connector, ReadMode, Recv, Transport};

/// Stream socket to the canvas server.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    resting: ReadMode,
}

impl TcpTransport {
    /// Wrap a connected stream and put it in its resting non-blocking mode.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        // Stroke packets are tiny; don't let Nagle hold them back a frame.
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            resting: ReadMode::NonBlocking,
        })
    }

    /// Address of the server end.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                // Resting mode is non-blocking; a full send buffer is waited out.
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn recv_available(&mut self, max_bytes: usize, mode: ReadMode) -> io::Result<Recv> {
        let resting = self.resting;
        if mode != resting {
            self.stream.set_nonblocking(mode == ReadMode::NonBlocking)?;
        }
        let mut stream = scopeguard::guard(&mut self.stream, move |s| {
            if mode != resting {
                if let Err(e) = s.set_nonblocking(resting == ReadMode::NonBlocking) {
                    log::warn!("[Tcp] Failed to restore socket mode: {e}");
                }
            }
        });

        let mut buf = vec![0u8; max_bytes.max(1)];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return Ok(Recv::Closed),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Recv::Data(buf));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Recv::WouldBlock),
                Err(e) => return Err(e),
            }
        }
    }

    fn probe(&mut self) -> io::Result<()> {
        self.stream.write(&[]).map(|_| ())
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Write)
    }
}

/// Resolves with the system resolver and connects with an optional timeout.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    /// Connector that gives up on each address after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            connect_timeout: Some(timeout),
        }
    }
}

impl Connector for TcpConnector {
    fn resolve(&mut self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok((host, port).to_socket_addrs()?.collect())
    }

    fn connect(&mut self, addr: SocketAddr) -> io::Result<Box<dyn Transport>> {
        let stream = match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };
        Ok(Box::new(TcpTransport::new(stream)?))
    }
}
