//! Sync session: the per-process composition root.
//!
//! One [`SyncSession`] owns the connection, the installed canvas, the stroke
//! batcher, and the inbound decoder. The host loop drives it:
//!
//! ```text
//! input events ──begin_stroke / add_point / end_stroke──► batches sent
//! every frame  ──tick()──► inbound strokes (arrival order) + refresh
//! user action  ──request_refresh() / reconnect()
//! ```
//!
//! Handshake and refresh failures are logged and leave the installed
//! canvas as it was. Send failures get one reconnect; a batch that still
//! cannot be sent is dropped. After the server closes the stream the session
//! stops sending until [`SyncSession::reconnect`] is called.

use crate::batcher::StrokeBatcher;
use crate::brush::Brush;
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::constants::{
    DEFAULT_FLUSH_THRESHOLD, DEFAULT_LINE_MAX_LEN, DEFAULT_MAX_CANVAS_BYTES,
    DEFAULT_MAX_REFRESH_BYTES, INBOUND_READ_CHUNK, MAX_INBOUND_READS_PER_TICK, REFRESH_REQUEST,
};
use crate::error::{SyncError, SyncResult};
use crate::protocol::handshake::{self, SnapshotEncoding, SnapshotHeader};
use crate::protocol::packet::{StrokeBatch, StrokeDecoder};
use crate::protocol::snapshot::CanvasSnapshot;
use crate::transport::{ReadMode, Recv};

/// Tunables for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Points per automatic batch flush.
    pub flush_threshold: usize,
    /// Handshake line limit, terminator included.
    pub line_max_len: usize,
    /// Largest compressed payload accepted from the server.
    pub max_refresh_bytes: usize,
    /// Largest decoded canvas (`width * height * 3`) accepted from a header.
    pub max_canvas_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            line_max_len: DEFAULT_LINE_MAX_LEN,
            max_refresh_bytes: DEFAULT_MAX_REFRESH_BYTES,
            max_canvas_bytes: DEFAULT_MAX_CANVAS_BYTES,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            flush_threshold: config.flush_threshold,
            line_max_len: config.line_max_len,
            max_refresh_bytes: config.max_refresh_bytes,
            max_canvas_bytes: config.max_canvas_bytes,
        }
    }
}

/// Running counters, mostly for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Batches written to the transport.
    pub batches_sent: u64,
    /// Batches dropped after a failed send or with no connection.
    pub batches_dropped: u64,
    /// Inbound stroke packets decoded.
    pub batches_received: u64,
    /// Inbound byte runs discarded as invalid.
    pub invalid_packets: u64,
    /// Snapshots installed (handshakes and refreshes).
    pub snapshots_installed: u64,
}

/// What one tick produced.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Strokes drawn by other clients, in arrival order.
    pub inbound: Vec<StrokeBatch>,
    /// Whether a refresh replaced the canvas this tick.
    pub refreshed: bool,
    /// Whether the server closed the stream this tick.
    pub peer_closed: bool,
}

/// Client-side synchronization session.
#[derive(Debug)]
pub struct SyncSession {
    conn: ConnectionManager,
    canvas: Option<CanvasSnapshot>,
    batcher: StrokeBatcher,
    decoder: StrokeDecoder,
    options: SessionOptions,
    stroke_active: bool,
    refresh_requested: bool,
    peer_closed: bool,
    handshake_generation: u64,
    stats: SessionStats,
}

impl SyncSession {
    /// Session over `conn`. Nothing is sent until [`SyncSession::start`].
    pub fn new(conn: ConnectionManager, options: SessionOptions) -> Self {
        Self {
            conn,
            canvas: None,
            batcher: StrokeBatcher::new(options.flush_threshold),
            decoder: StrokeDecoder::new(),
            options,
            stroke_active: false,
            refresh_requested: false,
            peer_closed: false,
            handshake_generation: 0,
            stats: SessionStats::default(),
        }
    }

    /// TCP session built from configuration.
    pub fn from_config(config: &Config) -> Self {
        let conn = ConnectionManager::tcp_with_timeout(
            config.server_host.clone(),
            config.server_port,
            config.connect_timeout(),
        );
        Self::new(conn, SessionOptions::from(config))
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// Installed canvas, if a handshake or refresh has succeeded.
    pub fn canvas(&self) -> Option<&CanvasSnapshot> {
        self.canvas.as_ref()
    }

    /// Mutable canvas for the rasterizer to draw strokes into.
    pub fn canvas_mut(&mut self) -> Option<&mut CanvasSnapshot> {
        self.canvas.as_mut()
    }

    /// The connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// Whether the server closed the stream and sending is paused.
    pub fn is_peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Counters.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Points buffered for the active stroke.
    pub fn pending_points(&self) -> usize {
        self.batcher.pending_len()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Connect and perform the initial handshake.
    ///
    /// A handshake failure is returned but the connection stays up: strokes
    /// can still flow without a canvas.
    pub fn start(&mut self) -> SyncResult<()> {
        self.conn.connect()?;
        self.peer_closed = false;
        self.handshake()
    }

    /// User-triggered reconnect; also resumes sending after a peer close.
    pub fn reconnect(&mut self) -> bool {
        self.peer_closed = false;
        if !self.conn.reconnect() {
            return false;
        }
        self.after_new_stream();
        true
    }

    /// Flush the active stroke and close the connection.
    pub fn shutdown(&mut self) {
        if self.stroke_active {
            self.end_stroke();
        }
        self.conn.disconnect();
        log::info!("[Session] Shut down: {:?}", self.stats);
    }

    /// Read the handshake header and snapshot from the current stream.
    ///
    /// The canvas is only replaced once the payload fully decodes.
    pub fn handshake(&mut self) -> SyncResult<()> {
        self.handshake_generation = self.conn.generation();
        self.decoder.clear();

        let result = self.read_handshake();
        match &result {
            Ok(snapshot) => log::info!(
                "[Snapshot] Installed {}x{} canvas",
                snapshot.width(),
                snapshot.height()
            ),
            Err(e) => {
                log::error!("[Snapshot] Handshake failed, keeping previous canvas: {e}");
                self.note_read_failure(e);
            }
        }
        let snapshot = result?;
        self.canvas = Some(snapshot);
        self.stats.snapshots_installed += 1;
        Ok(())
    }

    fn read_handshake(&mut self) -> SyncResult<CanvasSnapshot> {
        let line = self.conn.read_line(self.options.line_max_len)?;
        let header = match self.check_header(&String::from_utf8_lossy(&line)) {
            Ok(header) => header,
            Err(e) => {
                self.stream_out_of_sync(&e);
                return Err(e);
            }
        };

        match header.encoding {
            SnapshotEncoding::Compressed(size) => {
                let payload = self.conn.read_exact(size)?;
                CanvasSnapshot::inflate(header.width, header.height, &payload)
            }
            SnapshotEncoding::Raw(size) => {
                let payload = self.conn.read_exact(size)?;
                CanvasSnapshot::from_raw(header.width, header.height, payload)
            }
        }
    }

    /// Parse a header line and bound every size in it before anything is
    /// read or allocated.
    fn check_header(&self, line: &str) -> SyncResult<SnapshotHeader> {
        let header = handshake::parse_snapshot_header(line)?;
        log::debug!("[Snapshot] Header {header:?}");

        let max_canvas = self.options.max_canvas_bytes;
        let canvas_len = header
            .pixel_len()
            .filter(|&len| len <= max_canvas)
            .ok_or_else(|| {
                SyncError::Protocol(format!(
                    "{}x{} canvas exceeds the {max_canvas}-byte limit",
                    header.width, header.height
                ))
            })?;

        match header.encoding {
            SnapshotEncoding::Compressed(size)
                if size == 0 || size > self.options.max_refresh_bytes =>
            {
                Err(SyncError::Protocol(format!(
                    "compressed size {size} outside 1..={}",
                    self.options.max_refresh_bytes
                )))
            }
            SnapshotEncoding::Raw(size) if size != canvas_len => Err(SyncError::Protocol(format!(
                "canvasSize {size} does not match {}x{}",
                header.width, header.height
            ))),
            _ => Ok(header),
        }
    }

    // ── Refresh ─────────────────────────────────────────────────────────────

    /// Ask for a full canvas refresh on the next tick.
    pub fn request_refresh(&mut self) {
        self.refresh_requested = true;
    }

    /// Fetch a fresh canvas now.
    ///
    /// Returns `Ok(false)` when the refresh was abandoned because no
    /// connection could be established.
    pub fn refresh(&mut self) -> SyncResult<bool> {
        if self.canvas.is_none() {
            return Err(SyncError::Protocol(
                "no canvas installed to refresh; handshake first".to_string(),
            ));
        }
        if !self.ensure_connected() {
            log::warn!("[Snapshot] Refresh abandoned: not connected");
            return Ok(false);
        }

        let result = self.read_refresh();
        if let Err(e) = &result {
            log::error!("[Snapshot] Refresh failed, keeping previous canvas: {e}");
            self.note_read_failure(e);
        }
        let payload = result?;

        let Some(canvas) = self.canvas.as_mut() else {
            return Ok(false);
        };
        if let Err(e) = canvas.refresh_from(&payload) {
            log::error!("[Snapshot] Refresh payload rejected, keeping previous canvas: {e}");
            return Err(e);
        }
        self.stats.snapshots_installed += 1;
        log::info!("[Snapshot] Canvas refreshed ({} compressed bytes)", payload.len());
        Ok(true)
    }

    fn read_refresh(&mut self) -> SyncResult<Vec<u8>> {
        self.conn.send(REFRESH_REQUEST)?;
        let line = self.conn.read_line(self.options.line_max_len)?;
        let line = String::from_utf8_lossy(&line);
        let size = match handshake::parse_refresh_response(&line, self.options.max_refresh_bytes) {
            Ok(size) => size,
            Err(e) => {
                self.stream_out_of_sync(&e);
                return Err(e);
            }
        };
        self.conn.read_exact(size)
    }

    // ── Outbound strokes ────────────────────────────────────────────────────

    /// Start a gesture with `brush`.
    ///
    /// Points left over from an unfinished gesture are flushed first so a
    /// batch never mixes two strokes.
    pub fn begin_stroke(&mut self, brush: Brush) {
        if let Some(batch) = self.batcher.flush() {
            self.send_batch(&batch);
        }
        self.batcher.set_brush(brush);
        self.stroke_active = true;
    }

    /// Add a point to the active gesture; sends a batch at the threshold.
    ///
    /// Returns whether a batch was sent by this call.
    pub fn add_point(&mut self, x: u16, y: u16) -> bool {
        match self.batcher.add_point(x, y) {
            Some(batch) => self.send_batch(&batch),
            None => false,
        }
    }

    /// End the gesture and send whatever is buffered.
    pub fn end_stroke(&mut self) -> bool {
        self.stroke_active = false;
        match self.batcher.flush() {
            Some(batch) => self.send_batch(&batch),
            None => false,
        }
    }

    /// Send one batch with a single retry through reconnect.
    ///
    /// The batch is dropped if it cannot be sent.
    pub fn send_batch(&mut self, batch: &StrokeBatch) -> bool {
        if self.peer_closed {
            log::debug!("[Session] Server closed the stream; dropping batch");
            self.stats.batches_dropped += 1;
            return false;
        }
        if !self.ensure_connected() {
            log::warn!("[Session] No connection; dropping {}-point batch", batch.points.len());
            self.stats.batches_dropped += 1;
            return false;
        }

        let bytes = batch.encode();
        match self.conn.send(&bytes) {
            Ok(()) => {
                self.stats.batches_sent += 1;
                true
            }
            Err(e) => {
                log::warn!("[Session] {e}; retrying once after reconnect");
                if self.reconnect() && self.conn.send(&bytes).is_ok() {
                    self.stats.batches_sent += 1;
                    return true;
                }
                log::warn!("[Session] Dropping {}-point batch", batch.points.len());
                self.stats.batches_dropped += 1;
                false
            }
        }
    }

    // ── Tick ────────────────────────────────────────────────────────────────

    /// One frame of network work: drain inbound strokes, then serve a
    /// pending refresh request.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let was_closed = self.peer_closed;

        if self.conn.generation() != self.handshake_generation && self.conn.is_connected() {
            self.after_new_stream();
        }

        self.drain_inbound(&mut report);

        if std::mem::take(&mut self.refresh_requested) && !self.peer_closed {
            match self.refresh() {
                Ok(refreshed) => report.refreshed = refreshed,
                Err(e) => log::warn!("[Session] Refresh skipped this tick: {e}"),
            }
        }

        report.peer_closed |= self.peer_closed && !was_closed;
        report
    }

    fn drain_inbound(&mut self, report: &mut TickReport) {
        if self.peer_closed || !self.conn.is_connected() {
            return;
        }

        for _ in 0..MAX_INBOUND_READS_PER_TICK {
            match self.conn.recv_available(INBOUND_READ_CHUNK, ReadMode::NonBlocking) {
                Ok(Recv::Data(bytes)) => self.decoder.feed(&bytes),
                Ok(Recv::WouldBlock) => break,
                Ok(Recv::Closed) => {
                    log::warn!("[Session] Server closed the stream; pausing sends until reconnect");
                    self.peer_closed = true;
                    report.peer_closed = true;
                    break;
                }
                Err(e) => {
                    log::warn!("[Session] Inbound read failed: {e}");
                    break;
                }
            }
        }

        loop {
            match self.decoder.next_batch() {
                Ok(Some(batch)) => {
                    self.stats.batches_received += 1;
                    report.inbound.push(batch);
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("[Session] {e}");
                    self.stats.invalid_packets += 1;
                }
            }
        }
    }

    // ── Internal ────────────────────────────────────────────────────────────

    fn ensure_connected(&mut self) -> bool {
        if !self.conn.ensure_connected() {
            return false;
        }
        if self.conn.generation() != self.handshake_generation {
            self.after_new_stream();
        }
        true
    }

    /// The server closed the stream under a blocking read.
    fn note_read_failure(&mut self, e: &SyncError) {
        if matches!(e, SyncError::ShortRead { .. }) {
            log::warn!("[Session] Server closed the stream mid-read; pausing sends until reconnect");
            self.peer_closed = true;
        }
    }

    /// A header was read but its payload cannot be skipped. Whatever follows
    /// on this stream is not stroke data.
    fn stream_out_of_sync(&mut self, e: &SyncError) {
        self.decoder.clear();
        self.conn.fault(&e.to_string());
    }

    /// A new stream always opens with a handshake from the server.
    fn after_new_stream(&mut self) {
        if let Err(e) = self.handshake() {
            log::warn!("[Session] Continuing without a fresh canvas: {e}");
        }
    }
}
