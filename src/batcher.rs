//! Outgoing stroke batching.
//!
//! Points from the active gesture pile up in a pending buffer. Once
//! `flush_threshold` points are buffered, or the gesture ends, the buffer is
//! handed out as one [`StrokeBatch`] and cleared. What happens to the batch
//! afterwards (sent, or dropped on a failed send) does not put points back.

use crate::brush::Brush;
use crate::constants::{DEFAULT_FLUSH_THRESHOLD, MAX_POINTS_PER_BATCH};
use crate::protocol::packet::{StrokeBatch, StrokePoint};

/// Accumulates points of the current stroke into batches.
#[derive(Debug)]
pub struct StrokeBatcher {
    pending: Vec<StrokePoint>,
    brush: Brush,
    flush_threshold: usize,
}

impl Default for StrokeBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD)
    }
}

impl StrokeBatcher {
    /// Batcher that flushes every `flush_threshold` points.
    ///
    /// The threshold is kept within `1..=255` so one flush fits one packet.
    pub fn new(flush_threshold: usize) -> Self {
        let flush_threshold = flush_threshold.clamp(1, MAX_POINTS_PER_BATCH);
        Self {
            pending: Vec::with_capacity(flush_threshold),
            brush: Brush::default(),
            flush_threshold,
        }
    }

    /// Brush applied to the next flushed batch.
    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    /// Current brush.
    pub fn brush(&self) -> Brush {
        self.brush
    }

    /// Points waiting to be flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush threshold in points.
    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// Buffer a point; returns a batch when the threshold is reached.
    pub fn add_point(&mut self, x: u16, y: u16) -> Option<StrokeBatch> {
        self.pending.push(StrokePoint::new(x, y));
        if self.pending.len() >= self.flush_threshold {
            self.flush()
        } else {
            None
        }
    }

    /// Take everything buffered as one batch. `None` when nothing is pending.
    pub fn flush(&mut self) -> Option<StrokeBatch> {
        if self.pending.is_empty() {
            return None;
        }
        let points = std::mem::replace(&mut self.pending, Vec::with_capacity(self.flush_threshold));
        Some(StrokeBatch::new(self.brush, points))
    }

    /// Discard buffered points without producing a batch.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::{BrushShape, Rgb};

    #[test]
    fn test_tenth_point_flushes() {
        let mut batcher = StrokeBatcher::default();
        for i in 0..9 {
            assert!(batcher.add_point(i, i).is_none());
        }
        let batch = batcher.add_point(9, 9).expect("tenth point should flush");
        assert_eq!(batch.points.len(), 10);
        assert_eq!(batch.points[0], StrokePoint::new(0, 0));
        assert_eq!(batch.points[9], StrokePoint::new(9, 9));
        assert_eq!(batcher.pending_len(), 0);
    }

    #[test]
    fn test_flush_on_empty_buffer_yields_nothing() {
        let mut batcher = StrokeBatcher::default();
        assert!(batcher.flush().is_none());
        for i in 0..10 {
            let _ = batcher.add_point(i, 0);
        }
        assert!(batcher.flush().is_none());
    }

    #[test]
    fn test_gesture_end_flushes_remainder() {
        let mut batcher = StrokeBatcher::default();
        batcher.add_point(1, 2);
        batcher.add_point(3, 4);
        let batch = batcher.flush().unwrap();
        assert_eq!(batch.points, vec![StrokePoint::new(1, 2), StrokePoint::new(3, 4)]);
        assert_eq!(batcher.pending_len(), 0);
    }

    #[test]
    fn test_batch_carries_current_brush() {
        let mut batcher = StrokeBatcher::new(2);
        let brush = Brush {
            color: Rgb::new(1, 2, 3),
            size: 9,
            shape: BrushShape::Square,
        };
        batcher.set_brush(brush);
        batcher.add_point(0, 0);
        assert_eq!(batcher.add_point(1, 1).unwrap().brush, brush);
    }

    #[test]
    fn test_threshold_clamped_to_packet_capacity() {
        assert_eq!(StrokeBatcher::new(0).flush_threshold(), 1);
        assert_eq!(StrokeBatcher::new(1000).flush_threshold(), 255);
    }

    #[test]
    fn test_clear_drops_points() {
        let mut batcher = StrokeBatcher::default();
        batcher.add_point(5, 5);
        batcher.clear();
        assert!(batcher.flush().is_none());
    }
}
