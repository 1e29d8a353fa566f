//! Handshake header and refresh response parsing.
//!
//! The server sends a JSON-like line. Well-formed JSON objects are decoded
//! with `serde_json`; anything else falls back to a substring search for
//! `"name":<int>`. Unknown fields are ignored either way.

use serde_json::Value;

use crate::constants::{BYTES_PER_PIXEL, REFRESH_RESPONSE_MARKER};
use crate::error::{SyncError, SyncResult};

/// How the snapshot payload after the header is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotEncoding {
    /// `compressedSize` bytes of zlib data.
    Compressed(usize),
    /// Legacy: `canvasSize` bytes of raw RGB.
    Raw(usize),
}

impl SnapshotEncoding {
    /// Number of payload bytes following the header line.
    pub fn payload_len(self) -> usize {
        match self {
            Self::Compressed(n) | Self::Raw(n) => n,
        }
    }
}

/// Parsed initial handshake header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Payload encoding and size.
    pub encoding: SnapshotEncoding,
}

impl SnapshotHeader {
    /// Decoded canvas size in bytes (`width * height * 3`).
    pub fn pixel_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(BYTES_PER_PIXEL)
    }
}

/// Parse the handshake header line.
///
/// `width`, `height`, and one of `compressedSize` / `canvasSize` are
/// required; `compressedSize` wins when both are present.
pub fn parse_snapshot_header(line: &str) -> SyncResult<SnapshotHeader> {
    let fields = Fields::new(line);

    let width = fields.require("width")?;
    let height = fields.require("height")?;
    let width = dimension("width", width)?;
    let height = dimension("height", height)?;

    let encoding = if let Some(size) = fields.get("compressedSize") {
        SnapshotEncoding::Compressed(payload_size("compressedSize", size)?)
    } else if let Some(size) = fields.get("canvasSize") {
        SnapshotEncoding::Raw(payload_size("canvasSize", size)?)
    } else {
        return Err(SyncError::MalformedHeader(
            "missing \"compressedSize\" or \"canvasSize\"".to_string(),
        ));
    };

    Ok(SnapshotHeader {
        width,
        height,
        encoding,
    })
}

/// Parse a refresh response line and return its bounded compressed size.
///
/// The line must carry the `compressedCanvas` marker and a
/// `compressedSize` in `1..=max_bytes`.
pub fn parse_refresh_response(line: &str, max_bytes: usize) -> SyncResult<usize> {
    if !line.contains(REFRESH_RESPONSE_MARKER) {
        return Err(SyncError::MalformedHeader(format!(
            "refresh response lacks {REFRESH_RESPONSE_MARKER:?} marker"
        )));
    }
    let size = Fields::new(line).require("compressedSize")?;
    if size <= 0 || size as u64 > max_bytes as u64 {
        return Err(SyncError::Protocol(format!(
            "refresh size {size} outside 1..={max_bytes}"
        )));
    }
    Ok(size as usize)
}

fn dimension(name: &str, value: i64) -> SyncResult<u32> {
    match u32::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(SyncError::Protocol(format!("{name} {value} out of range"))),
    }
}

fn payload_size(name: &str, value: i64) -> SyncResult<usize> {
    usize::try_from(value)
        .map_err(|e| SyncError::Protocol(format!("{name} {value} out of range: {e}")))
}

/// Integer field lookup over either a JSON object or raw text.
struct Fields<'a> {
    line: &'a str,
    json: Option<serde_json::Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str) -> Self {
        let json = match serde_json::from_str::<Value>(line.trim()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        };
        Self { line, json }
    }

    fn get(&self, name: &str) -> Option<i64> {
        match &self.json {
            Some(map) => map.get(name).and_then(Value::as_i64),
            None => scan_int_field(self.line, name),
        }
    }

    fn require(&self, name: &str) -> SyncResult<i64> {
        self.get(name)
            .ok_or_else(|| SyncError::MalformedHeader(format!("missing \"{name}\"")))
    }
}

/// Find `"name"` followed by `:` and a (possibly signed) decimal integer.
fn scan_int_field(line: &str, name: &str) -> Option<i64> {
    let key = format!("\"{name}\"");
    let mut search = line;
    while let Some(pos) = search.find(&key) {
        let rest = search[pos + key.len()..].trim_start();
        if let Some(after_colon) = rest.strip_prefix(':') {
            let value = after_colon.trim_start();
            let end = value
                .char_indices()
                .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
                .map_or(value.len(), |(i, _)| i);
            if let Ok(n) = value[..end].parse() {
                return Some(n);
            }
        }
        search = &search[pos + key.len()..];
    }
    None
}
