//! Full-canvas pixel snapshot.
//!
//! The server ships the canvas as zlib-compressed packed RGB. Inflation
//! always targets a freshly allocated buffer of the exact expected size;
//! the installed canvas is only swapped once that buffer is complete, so a
//! truncated or corrupt payload never leaves a half-written canvas behind.

use std::io::{self, Write};

use flate2::{Decompress, FlushDecompress, Status};

use crate::brush::Rgb;
use crate::constants::BYTES_PER_PIXEL;
use crate::error::{SyncError, SyncResult};

/// Canvas pixels, row-major RGB.
///
/// `pixels.len() == width * height * 3` holds for every constructed value.
#[derive(Clone, PartialEq, Eq)]
pub struct CanvasSnapshot {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl std::fmt::Debug for CanvasSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasSnapshot")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl CanvasSnapshot {
    /// Wrap already-decoded pixels, checking the length invariant.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> SyncResult<Self> {
        let expected = pixel_len(width, height)?;
        if pixels.len() != expected {
            return Err(SyncError::Protocol(format!(
                "raw canvas is {} bytes, {width}x{height} needs {expected}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Inflate a zlib payload into a new `width x height` snapshot.
    pub fn inflate(width: u32, height: u32, compressed: &[u8]) -> SyncResult<Self> {
        let expected = pixel_len(width, height)?;
        let pixels = inflate_exact(compressed, expected)?;
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Replace the pixels with a refresh payload of the same dimensions.
    ///
    /// On any error the current pixels are left untouched.
    pub fn refresh_from(&mut self, compressed: &[u8]) -> SyncResult<()> {
        let pixels = inflate_exact(compressed, self.pixels.len())?;
        self.pixels = pixels;
        Ok(())
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable pixel access for the rasterizer. The length cannot change.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Colour at `(x, y)`, or `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some(Rgb::new(
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
        ))
    }

    /// Write the canvas as a binary PPM (P6) image.
    pub fn write_ppm<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "P6\n{} {}\n255\n", self.width, self.height)?;
        out.write_all(&self.pixels)?;
        out.flush()
    }
}

fn pixel_len(width: u32, height: u32) -> SyncResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| SyncError::Protocol(format!("canvas {width}x{height} too large")))
}

/// Inflate a zlib stream that must decode to exactly `expected` bytes.
///
/// - stream ends before filling the buffer → `Protocol` (smaller canvas)
/// - buffer full while the stream keeps producing → `Protocol` (larger canvas)
/// - input exhausted before the stream end → `Decompression` (truncated)
/// - invalid data → `Decompression`
pub fn inflate_exact(compressed: &[u8], expected: usize) -> SyncResult<Vec<u8>> {
    let mut out = vec![0u8; expected];
    let mut inflater = Decompress::new(true);

    let status = loop {
        let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
        let status = inflater
            .decompress(
                &compressed[in_before as usize..],
                &mut out[out_before as usize..],
                FlushDecompress::None,
            )
            .map_err(|e| SyncError::Decompression(format!("inflate failed: {e}")))?;
        if status == Status::StreamEnd
            || (inflater.total_in() == in_before && inflater.total_out() == out_before)
        {
            break status;
        }
    };

    let produced = inflater.total_out() as usize;
    if status == Status::StreamEnd {
        if produced == expected {
            return Ok(out);
        }
        return Err(SyncError::Protocol(format!(
            "payload inflated to {produced} bytes, canvas needs {expected}"
        )));
    }

    if produced == expected {
        // Canvas is full but the stream has not ended: either more pixels
        // follow or the trailer was cut off.
        let consumed = inflater.total_in() as usize;
        let mut spill = [0u8; 64];
        let overflows = matches!(
            inflater.decompress(&compressed[consumed..], &mut spill, FlushDecompress::None),
            Ok(_) if inflater.total_out() as usize > produced
        );
        if overflows {
            return Err(SyncError::Protocol(format!(
                "payload inflates past the {expected}-byte canvas"
            )));
        }
    }

    Err(SyncError::Decompression(format!(
        "stream incomplete: {} input bytes gave {produced} of {expected}",
        compressed.len()
    )))
}
