//! Application-wide constants for drawlink.
//!
//! Wire-format numbers, protocol limits, and loop timing live here so the
//! codec, the snapshot exchange, and the session agree on them.
//!
//! # Categories
//!
//! - **Server**: default endpoint
//! - **Wire**: stroke packet layout and handshake tokens
//! - **Limits**: allocation ceilings for untrusted sizes
//! - **Timing**: tick loop interval and connect timeout

use std::time::Duration;

// ============================================================================
// Server
// ============================================================================

/// Default canvas server host.
pub const DEFAULT_SERVER_HOST: &str = "38.45.65.90";

/// Default canvas server TCP port.
pub const DEFAULT_SERVER_PORT: u16 = 3030;

// ============================================================================
// Wire
// ============================================================================

/// Packet type byte for a draw batch.
pub const PACKET_TYPE_DRAW: u8 = 1;

/// Fixed header length of a stroke packet (type, RGB, size, shape, count).
pub const PACKET_HEADER_LEN: usize = 7;

/// Encoded size of one stroke point (`u16` x + `u16` y).
pub const POINT_WIRE_LEN: usize = 4;

/// Maximum number of points one packet can carry (the count is a single byte).
pub const MAX_POINTS_PER_BATCH: usize = u8::MAX as usize;

/// Refresh request token sent in line mode.
pub const REFRESH_REQUEST: &[u8] = b"getCanvas\n";

/// Marker the server puts in a refresh response line.
pub const REFRESH_RESPONSE_MARKER: &str = "compressedCanvas";

/// Bytes per canvas pixel (packed RGB).
pub const BYTES_PER_PIXEL: usize = 3;

// ============================================================================
// Limits
// ============================================================================

/// Points accumulated before the batcher flushes on its own.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 10;

/// Upper bound on a refresh payload size announced by the server.
pub const DEFAULT_MAX_REFRESH_BYTES: usize = 10_000_000;

/// Upper bound on a decoded canvas (`width * height * 3`) announced by a
/// handshake header. 8192x8192 RGB.
pub const DEFAULT_MAX_CANVAS_BYTES: usize = 8192 * 8192 * BYTES_PER_PIXEL;

/// Maximum handshake line length, terminator included.
pub const DEFAULT_LINE_MAX_LEN: usize = 1024;

/// Largest single non-blocking read issued while polling for strokes.
pub const INBOUND_READ_CHUNK: usize = 4096;

/// Cap on non-blocking reads per tick so a packet flood cannot stall a frame.
pub const MAX_INBOUND_READS_PER_TICK: usize = 64;

// ============================================================================
// Timing
// ============================================================================

/// Tick interval of the headless loop (approximately 60fps).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Per-address TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
