//! Binary stroke packets.
//!
//! ```text
//! byte 0      packet type (1 = draw batch)
//! byte 1..3   colour R, G, B
//! byte 4      brush size
//! byte 5      brush shape (0 = circle, 1 = square, 2 = soft)
//! byte 6      point count N
//! byte 7..    N × (u16 LE x, u16 LE y)
//! ```
//!
//! There is no checksum. A packet is trusted only once its length equals
//! `7 + 4 * N`.

use crate::brush::{Brush, BrushShape, Rgb};
use crate::constants::{MAX_POINTS_PER_BATCH, PACKET_HEADER_LEN, PACKET_TYPE_DRAW, POINT_WIRE_LEN};
use crate::error::{SyncError, SyncResult};

/// A point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrokePoint {
    /// Column.
    pub x: u16,
    /// Row.
    pub y: u16,
}

impl StrokePoint {
    /// Point at `(x, y)`.
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// One draw batch: up to 255 points sharing a brush.
///
/// Points are kept in arrival order; consecutive points form the segments of
/// a polyline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrokeBatch {
    /// Brush used for every point.
    pub brush: Brush,
    /// Ordered points.
    pub points: Vec<StrokePoint>,
}

impl StrokeBatch {
    /// Batch of `points` drawn with `brush`.
    pub fn new(brush: Brush, points: Vec<StrokePoint>) -> Self {
        Self { brush, points }
    }

    /// Wire length of this batch once encoded.
    pub fn encoded_len(&self) -> usize {
        PACKET_HEADER_LEN + POINT_WIRE_LEN * self.points.len().min(MAX_POINTS_PER_BATCH)
    }

    /// Encode to wire format.
    ///
    /// Points beyond the 255th are dropped from the packet.
    pub fn encode(&self) -> Vec<u8> {
        let count = self.points.len().min(MAX_POINTS_PER_BATCH);
        if count < self.points.len() {
            log::warn!(
                "[Packet] Batch holds {} points, sending first {count}",
                self.points.len()
            );
        }

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(PACKET_TYPE_DRAW);
        buf.extend_from_slice(&[self.brush.color.r, self.brush.color.g, self.brush.color.b]);
        buf.push(self.brush.size);
        buf.push(self.brush.shape.to_wire());
        buf.push(count as u8);
        for point in &self.points[..count] {
            buf.extend_from_slice(&point.x.to_le_bytes());
            buf.extend_from_slice(&point.y.to_le_bytes());
        }
        buf
    }

    /// Decode exactly one packet. The buffer must hold nothing else.
    pub fn decode(buf: &[u8]) -> SyncResult<Self> {
        if buf.len() < PACKET_HEADER_LEN {
            return Err(SyncError::InvalidPacket(format!(
                "{} bytes, header needs {PACKET_HEADER_LEN}",
                buf.len()
            )));
        }
        let count = usize::from(buf[6]);
        let expected = PACKET_HEADER_LEN + POINT_WIRE_LEN * count;
        if buf.len() != expected {
            return Err(SyncError::InvalidPacket(format!(
                "{} bytes for {count} points, expected {expected}",
                buf.len()
            )));
        }
        if buf[0] != PACKET_TYPE_DRAW {
            return Err(SyncError::InvalidPacket(format!(
                "unknown packet type {}",
                buf[0]
            )));
        }
        let shape = BrushShape::from_wire(buf[5])
            .ok_or_else(|| SyncError::InvalidPacket(format!("unknown brush shape {}", buf[5])))?;

        let points = buf[PACKET_HEADER_LEN..]
            .chunks_exact(POINT_WIRE_LEN)
            .map(|p| {
                StrokePoint::new(
                    u16::from_le_bytes([p[0], p[1]]),
                    u16::from_le_bytes([p[2], p[3]]),
                )
            })
            .collect();

        Ok(Self {
            brush: Brush {
                color: Rgb::new(buf[1], buf[2], buf[3]),
                size: buf[4],
                shape,
            },
            points,
        })
    }
}

/// Incremental packet decoder for non-blocking reads.
///
/// A read may end mid-packet or carry several packets; bytes are buffered
/// and cut on `7 + 4 * N` boundaries. Each cut is validated by
/// [`StrokeBatch::decode`]. The stream has no sync marker, so once a cut
/// fails validation the buffered bytes are discarded.
#[derive(Debug, Default)]
pub struct StrokeDecoder {
    buf: Vec<u8>,
}

impl StrokeDecoder {
    /// Empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete packet, if any.
    pub fn next_batch(&mut self) -> SyncResult<Option<StrokeBatch>> {
        if self.buf.len() < PACKET_HEADER_LEN {
            return Ok(None);
        }
        let total = PACKET_HEADER_LEN + POINT_WIRE_LEN * usize::from(self.buf[6]);
        if self.buf.len() < total {
            return Ok(None);
        }
        match StrokeBatch::decode(&self.buf[..total]) {
            Ok(batch) => {
                self.buf.drain(..total);
                Ok(Some(batch))
            }
            Err(e) => {
                let discarded = self.buf.len();
                self.buf.clear();
                log::warn!("[Packet] Discarding {discarded} buffered bytes: {e}");
                Err(e)
            }
        }
    }

    /// Whether a partial packet is buffered.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Drop buffered bytes (used when the stream is replaced).
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
