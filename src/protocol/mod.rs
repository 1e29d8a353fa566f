//! Canvas wire protocol.
//!
//! Two framing disciplines share one socket:
//!
//! ```text
//! handshake / refresh (line mode, blocking reads)
//!   server → {"width":W,"height":H,"compressedSize":N}\n  + N bytes zlib
//!   client → getCanvas\n
//!   server → {"type":"compressedCanvas","compressedSize":N}\n + N bytes zlib
//!
//! strokes (binary mode, non-blocking reads)
//!   [u8 type=1][u8 r][u8 g][u8 b][u8 size][u8 shape][u8 n][n × (u16 LE x, u16 LE y)]
//! ```
//!
//! - [`framing`]: line and exact-length reads over a [`Transport`](crate::transport::Transport)
//! - [`handshake`]: header and refresh-response field extraction
//! - [`snapshot`]: canvas buffer and zlib inflate
//! - [`packet`]: stroke batch encode/decode and stream reassembly

pub mod framing;
pub mod handshake;
pub mod packet;
pub mod snapshot;

pub use handshake::{SnapshotEncoding, SnapshotHeader};
pub use packet::{StrokeBatch, StrokeDecoder, StrokePoint};
pub use snapshot::CanvasSnapshot;
