//! Drawlink - network sync layer for a shared drawing canvas.
//!
//! This crate keeps a local canvas in step with a central canvas server
//! over one TCP stream: it fetches the full canvas on connect and on
//! demand, streams the user's strokes out in small binary batches, and
//! decodes strokes drawn by other clients.
//!
//! # Architecture
//!
//! - **Transport** - byte stream seam (`TcpTransport`, in-memory test double)
//! - **ConnectionManager** - connect, liveness probe, reconnect, state machine
//! - **Protocol** - line framing, handshake headers, zlib snapshot, stroke packets
//! - **StrokeBatcher** - groups pointer samples into packets
//! - **SyncSession** - owns all of the above and is driven by the host loop
//!
//! # Modules
//!
//! - [`connection`] - Connection lifecycle and state
//! - [`protocol`] - Wire formats
//! - [`session`] - Composition root
//! - [`config`] - Configuration loading/saving

pub mod batcher;
pub mod brush;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use batcher::StrokeBatcher;
pub use brush::{Brush, BrushShape, Rgb};
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{SyncError, SyncResult};
pub use protocol::{CanvasSnapshot, StrokeBatch, StrokeDecoder, StrokePoint};
pub use session::{SessionOptions, SessionStats, SyncSession, TickReport};
