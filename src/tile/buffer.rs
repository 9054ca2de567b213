//! Decoded pixel buffers.

use serde::Serialize;

/// Channel count and sample width of a decoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PixelFormat {
    pub channels: u8,
    /// 8 or 16
    pub bit_depth: u8,
}

impl PixelFormat {
    pub const GRAY8: PixelFormat = PixelFormat::new(1, 8);
    pub const RGB8: PixelFormat = PixelFormat::new(3, 8);
    pub const RGBA8: PixelFormat = PixelFormat::new(4, 8);

    pub const fn new(channels: u8, bit_depth: u8) -> Self {
        Self {
            channels,
            bit_depth,
        }
    }

    #[inline]
    pub const fn bytes_per_sample(self) -> usize {
        if self.bit_depth > 8 {
            2
        } else {
            1
        }
    }

    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        self.channels as usize * self.bytes_per_sample()
    }
}

/// A tile of decoded pixels.
///
/// Samples are interleaved and rows are tightly packed; 16-bit samples are
/// little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTile {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl DecodedTile {
    /// A tile with every byte set to `value`.
    ///
    /// For 16-bit formats both bytes of each sample take the value, so 255
    /// is still full white.
    pub fn filled(width: u32, height: u32, format: PixelFormat, value: u8) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: vec![value; len],
        }
    }

    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Bytes held by the pixel data.
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    /// Bytes the pixel data should hold for this size and format.
    pub fn expected_len(&self) -> usize {
        self.height as usize * self.row_bytes()
    }

    /// Samples of the pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.row_bytes() + x as usize * bpp;
        &self.data[start..start + bpp]
    }

    /// Copy a `width × height` block from `src` at (`src_x`, `src_y`) to
    /// (`dst_x`, `dst_y`) in this tile.
    ///
    /// Both tiles must share a pixel format and the block must fit in both.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_region(
        &mut self,
        src: &DecodedTile,
        src_x: u32,
        src_y: u32,
        dst_x: u32,
        dst_y: u32,
        width: u32,
        height: u32,
    ) {
        debug_assert_eq!(self.format, src.format);
        debug_assert!(src_x + width <= src.width && src_y + height <= src.height);
        debug_assert!(dst_x + width <= self.width && dst_y + height <= self.height);

        let bpp = self.format.bytes_per_pixel();
        let span = width as usize * bpp;
        let src_stride = src.row_bytes();
        let dst_stride = self.row_bytes();

        for row in 0..height as usize {
            let s = (src_y as usize + row) * src_stride + src_x as usize * bpp;
            let d = (dst_y as usize + row) * dst_stride + dst_x as usize * bpp;
            self.data[d..d + span].copy_from_slice(&src.data[s..s + span]);
        }
    }
}
