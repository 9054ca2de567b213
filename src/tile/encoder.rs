//! JPEG encoding of decoded tiles.
//!
//! Output tiles leave the engine as raw pixel buffers. The command-line tool
//! writes them to disk as baseline JPEG, which only carries 8-bit gray or RGB
//! samples, so the encoder narrows whatever the level decoded to:
//!
//! - alpha channels are dropped
//! - 16-bit samples keep their high byte

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::error::TileError;

use super::buffer::DecodedTile;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// JPEG Encoder
// =============================================================================

/// Encodes decoded tiles as JPEG.
#[derive(Debug, Clone, Default)]
pub struct JpegTileEncoder {}

impl JpegTileEncoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Encode `tile` at `quality` (clamped to 1-100).
    ///
    /// # Errors
    ///
    /// `EncodeError` if the buffer is inconsistent with its declared size or
    /// the JPEG encoder rejects it.
    pub fn encode(&self, tile: &DecodedTile, quality: u8) -> Result<Bytes, TileError> {
        let quality = clamp_quality(quality);

        let expected = tile.width as usize * tile.height as usize * tile.format.bytes_per_pixel();
        if tile.data.len() != expected {
            return Err(TileError::EncodeError {
                message: format!(
                    "{}x{} tile holds {} bytes, expected {expected}",
                    tile.width,
                    tile.height,
                    tile.data.len()
                ),
            });
        }

        let (samples, color_type) = narrow_samples(tile);

        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
        encoder
            .encode(&samples, tile.width, tile.height, color_type)
            .map_err(|e| TileError::EncodeError {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }

    pub fn encode_default(&self, tile: &DecodedTile) -> Result<Bytes, TileError> {
        self.encode(tile, DEFAULT_JPEG_QUALITY)
    }
}

/// 8-bit gray or RGB samples for `tile`.
fn narrow_samples(tile: &DecodedTile) -> (Vec<u8>, ExtendedColorType) {
    let channels = tile.format.channels as usize;
    let bytes_per_sample = tile.format.bytes_per_sample();
    let (kept, color_type) = if channels >= 3 {
        (3, ExtendedColorType::Rgb8)
    } else {
        (1, ExtendedColorType::L8)
    };

    let mut samples = Vec::with_capacity(tile.width as usize * tile.height as usize * kept);
    for pixel in tile.data.chunks_exact(tile.format.bytes_per_pixel()) {
        for channel in 0..kept {
            // Little-endian samples: the high byte comes last
            let at = channel * bytes_per_sample + bytes_per_sample - 1;
            samples.push(pixel[at]);
        }
    }
    (samples, color_type)
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
///
/// Values below 1 become 1, values above 100 become 100.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}
