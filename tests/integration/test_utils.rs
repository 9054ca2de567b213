//! Test utilities for integration tests.
//!
//! This module provides a writer for synthetic TIFF containers, JPEG helpers
//! and decoders that count or fail on purpose.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Luma};

use wsi_tiler::{
    ByteSource, CodecDispatcher, CodecId, DecodedTile, MemorySource, SideTable, TileContext,
    TileDecoder, TileError,
};

// =============================================================================
// Sources
// =============================================================================

pub fn memory_source(data: Vec<u8>, identifier: &str) -> Arc<dyn ByteSource> {
    Arc::new(MemorySource::new(data, identifier))
}

// =============================================================================
// Test JPEG Creation
// =============================================================================

/// A complete grayscale JPEG with a gradient offset by `seed`.
pub fn gray_jpeg(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |x, y| Luma([((x * 3 + y + seed) % 256) as u8]));

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 90);
    encoder.encode_image(&img).unwrap();
    buf
}

/// Split a complete JPEG into a tables-only stream and an abbreviated stream.
///
/// Every DQT and DHT segment before the scan moves into the tables stream,
/// the way scanners write the `JPEGTables` tag.
pub fn split_jpeg_tables(full: &[u8]) -> (Vec<u8>, Vec<u8>) {
    assert_eq!(&full[..2], &[0xFF, 0xD8]);
    let mut tables = vec![0xFF, 0xD8];
    let mut tile = vec![0xFF, 0xD8];

    let mut pos = 2;
    loop {
        assert_eq!(full[pos], 0xFF, "expected marker at {pos}");
        let code = full[pos + 1];
        if code == 0xDA {
            tile.extend_from_slice(&full[pos..]);
            break;
        }
        let length = u16::from_be_bytes([full[pos + 2], full[pos + 3]]) as usize;
        let segment = &full[pos..pos + 2 + length];
        if code == 0xDB || code == 0xC4 {
            tables.extend_from_slice(segment);
        } else {
            tile.extend_from_slice(segment);
        }
        pos += 2 + length;
    }

    tables.extend_from_slice(&[0xFF, 0xD9]);
    (tables, tile)
}

// =============================================================================
// Raw tile data
// =============================================================================

/// Uncompressed 8-bit gray tiles in row-major order, each filled with
/// `value(col, row)`.
pub fn gray_tiles(
    cols: u32,
    rows: u32,
    tile_width: u32,
    tile_height: u32,
    value: impl Fn(u32, u32) -> u8,
) -> Vec<Option<Vec<u8>>> {
    let mut tiles = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            tiles.push(Some(vec![
                value(col, row);
                (tile_width * tile_height) as usize
            ]));
        }
    }
    tiles
}

// =============================================================================
// Decoders
// =============================================================================

/// Wraps a decoder, counting calls and holding each one for `delay`.
pub struct CountingDecoder {
    inner: Arc<dyn TileDecoder>,
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingDecoder {
    pub fn new(inner: Arc<dyn TileDecoder>, delay: Duration) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let decoder = Self {
            inner,
            calls: Arc::clone(&calls),
            delay,
        };
        (decoder, calls)
    }
}

impl TileDecoder for CountingDecoder {
    fn decode(
        &self,
        data: &[u8],
        side_table: &SideTable,
        ctx: &TileContext,
    ) -> Result<DecodedTile, TileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.decode(data, side_table, ctx)
    }
}

/// Fails for the listed native tiles and defers to `inner` otherwise.
pub struct FailingDecoder {
    inner: Arc<dyn TileDecoder>,
    codec: CodecId,
    fail_at: Vec<(u32, u32)>,
}

impl FailingDecoder {
    pub fn new(inner: Arc<dyn TileDecoder>, codec: CodecId, fail_at: Vec<(u32, u32)>) -> Self {
        Self {
            inner,
            codec,
            fail_at,
        }
    }
}

impl TileDecoder for FailingDecoder {
    fn decode(
        &self,
        data: &[u8],
        side_table: &SideTable,
        ctx: &TileContext,
    ) -> Result<DecodedTile, TileError> {
        if self.fail_at.contains(&(ctx.col, ctx.row)) {
            return Err(ctx.decode_error(self.codec, "injected failure"));
        }
        self.inner.decode(data, side_table, ctx)
    }
}

/// Drops the second half of the pixel data `inner` returns for the listed
/// native tiles, leaving size and format untouched.
pub struct TruncatingDecoder {
    inner: Arc<dyn TileDecoder>,
    truncate_at: Vec<(u32, u32)>,
}

impl TruncatingDecoder {
    pub fn new(inner: Arc<dyn TileDecoder>, truncate_at: Vec<(u32, u32)>) -> Self {
        Self { inner, truncate_at }
    }
}

impl TileDecoder for TruncatingDecoder {
    fn decode(
        &self,
        data: &[u8],
        side_table: &SideTable,
        ctx: &TileContext,
    ) -> Result<DecodedTile, TileError> {
        let mut tile = self.inner.decode(data, side_table, ctx)?;
        if self.truncate_at.contains(&(ctx.col, ctx.row)) {
            tile.data.truncate(tile.data.len() / 2);
        }
        Ok(tile)
    }
}

/// Default decoders with `decoder` installed for `codec`.
pub fn dispatcher_with(codec: CodecId, decoder: Arc<dyn TileDecoder>) -> CodecDispatcher {
    let mut dispatcher = CodecDispatcher::with_defaults();
    dispatcher.register(codec, decoder);
    dispatcher
}

// =============================================================================
// TIFF File Builders
// =============================================================================

/// How an IFD's image data is cut up.
#[derive(Debug, Clone, Copy)]
pub enum Layout {
    Tiled { tile_width: u32, tile_height: u32 },
    Striped { rows_per_strip: u32 },
}

/// One image file directory to write.
#[derive(Debug, Clone)]
pub struct IfdSpec {
    pub width: u32,
    pub height: u32,
    pub layout: Layout,
    pub compression: u16,
    pub photometric: u16,
    pub samples_per_pixel: u16,
    pub bits_per_sample: u16,
    pub planar_configuration: Option<u16>,
    pub jpeg_tables: Option<Vec<u8>>,
    /// Stored units in row-major order; `None` writes a sparse entry
    pub tiles: Vec<Option<Vec<u8>>>,
    /// Written verbatim as (offset, byte count) instead of `tiles`
    pub locations: Option<Vec<(u64, u64)>>,
}

impl IfdSpec {
    pub fn tiled(width: u32, height: u32, tile_width: u32, tile_height: u32, compression: u16) -> Self {
        Self::new(
            width,
            height,
            Layout::Tiled {
                tile_width,
                tile_height,
            },
            compression,
        )
    }

    pub fn striped(width: u32, height: u32, rows_per_strip: u32, compression: u16) -> Self {
        Self::new(width, height, Layout::Striped { rows_per_strip }, compression)
    }

    fn new(width: u32, height: u32, layout: Layout, compression: u16) -> Self {
        Self {
            width,
            height,
            layout,
            compression,
            photometric: 1,
            samples_per_pixel: 1,
            bits_per_sample: 8,
            planar_configuration: None,
            jpeg_tables: None,
            tiles: Vec::new(),
            locations: None,
        }
    }

    pub fn with_tiles(mut self, tiles: Vec<Option<Vec<u8>>>) -> Self {
        self.tiles = tiles;
        self
    }

    pub fn with_locations(mut self, locations: Vec<(u64, u64)>) -> Self {
        self.locations = Some(locations);
        self
    }

    pub fn with_jpeg_tables(mut self, tables: Vec<u8>) -> Self {
        self.jpeg_tables = Some(tables);
        self
    }

    pub fn with_samples(mut self, samples_per_pixel: u16, bits_per_sample: u16) -> Self {
        self.samples_per_pixel = samples_per_pixel;
        self.bits_per_sample = bits_per_sample;
        self
    }

    pub fn with_photometric(mut self, photometric: u16) -> Self {
        self.photometric = photometric;
        self
    }

    pub fn with_planar_configuration(mut self, planar: u16) -> Self {
        self.planar_configuration = Some(planar);
        self
    }
}

enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Long8(Vec<u64>),
    Undefined(Vec<u8>),
}

impl Value {
    fn field_type(&self) -> u16 {
        match self {
            Value::Short(_) => 3,
            Value::Long(_) => 4,
            Value::Long8(_) => 16,
            Value::Undefined(_) => 7,
        }
    }

    fn count(&self) -> u64 {
        match self {
            Value::Short(v) => v.len() as u64,
            Value::Long(v) => v.len() as u64,
            Value::Long8(v) => v.len() as u64,
            Value::Undefined(v) => v.len() as u64,
        }
    }
}

/// Writes classic or BigTIFF containers in either byte order.
///
/// Layout per IFD: stored tiles, then out-of-line tag values, then the IFD
/// itself, each starting on a word boundary.
pub struct TiffBuilder {
    big_endian: bool,
    bigtiff: bool,
    ifds: Vec<IfdSpec>,
    loop_back: bool,
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self {
            big_endian: false,
            bigtiff: false,
            ifds: Vec::new(),
            loop_back: false,
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn bigtiff(mut self) -> Self {
        self.bigtiff = true;
        self
    }

    /// Point the last IFD back at the first.
    pub fn with_ifd_loop(mut self) -> Self {
        self.loop_back = true;
        self
    }

    pub fn add_ifd(mut self, ifd: IfdSpec) -> Self {
        self.ifds.push(ifd);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut w = Writer {
            buf: Vec::new(),
            big_endian: self.big_endian,
        };

        w.bytes(if self.big_endian { b"MM" } else { b"II" });
        let mut next_pointer = if self.bigtiff {
            w.u16(43);
            w.u16(8);
            w.u16(0);
            let pos = w.buf.len();
            w.u64(0);
            pos
        } else {
            w.u16(42);
            let pos = w.buf.len();
            w.u32(0);
            pos
        };

        let inline_size = if self.bigtiff { 8 } else { 4 };
        let mut first_ifd = None;

        for spec in &self.ifds {
            let locations = match &spec.locations {
                Some(locations) => locations.clone(),
                None => spec
                    .tiles
                    .iter()
                    .map(|tile| match tile {
                        Some(bytes) => {
                            w.align();
                            let offset = w.buf.len() as u64;
                            w.bytes(bytes);
                            (offset, bytes.len() as u64)
                        }
                        None => (0, 0),
                    })
                    .collect(),
            };

            let entries = self.entries(spec, &locations);

            // Out-of-line values first, so the IFD can point at them
            let mut fields = Vec::with_capacity(entries.len());
            for (tag, value) in &entries {
                let encoded = w.encode(value);
                let field = if encoded.len() <= inline_size {
                    let mut inline = encoded;
                    inline.resize(inline_size, 0);
                    inline
                } else {
                    w.align();
                    let offset = w.buf.len() as u64;
                    w.bytes(&encoded);
                    w.encode_offset(offset, self.bigtiff)
                };
                fields.push((*tag, value.field_type(), value.count(), field));
            }

            w.align();
            let ifd_offset = w.buf.len() as u64;
            first_ifd.get_or_insert(ifd_offset);
            w.patch_offset(next_pointer, ifd_offset, self.bigtiff);

            if self.bigtiff {
                w.u64(fields.len() as u64);
            } else {
                w.u16(fields.len() as u16);
            }
            for (tag, field_type, count, field) in fields {
                w.u16(tag);
                w.u16(field_type);
                if self.bigtiff {
                    w.u64(count);
                } else {
                    w.u32(count as u32);
                }
                w.bytes(&field);
            }
            next_pointer = w.buf.len();
            if self.bigtiff {
                w.u64(0);
            } else {
                w.u32(0);
            }
        }

        if self.loop_back {
            if let Some(first) = first_ifd {
                w.patch_offset(next_pointer, first, self.bigtiff);
            }
        }

        w.buf
    }

    fn entries(&self, spec: &IfdSpec, locations: &[(u64, u64)]) -> Vec<(u16, Value)> {
        let offsets: Vec<u64> = locations.iter().map(|l| l.0).collect();
        let counts: Vec<u64> = locations.iter().map(|l| l.1).collect();
        let array = |values: Vec<u64>| {
            if self.bigtiff {
                Value::Long8(values)
            } else {
                Value::Long(values.into_iter().map(|v| v as u32).collect())
            }
        };

        let mut entries = vec![
            (256, Value::Long(vec![spec.width])),
            (257, Value::Long(vec![spec.height])),
            (
                258,
                Value::Short(vec![spec.bits_per_sample; spec.samples_per_pixel as usize]),
            ),
            (259, Value::Short(vec![spec.compression])),
            (262, Value::Short(vec![spec.photometric])),
            (277, Value::Short(vec![spec.samples_per_pixel])),
        ];
        if let Some(planar) = spec.planar_configuration {
            entries.push((284, Value::Short(vec![planar])));
        }
        match spec.layout {
            Layout::Tiled {
                tile_width,
                tile_height,
            } => {
                entries.push((322, Value::Long(vec![tile_width])));
                entries.push((323, Value::Long(vec![tile_height])));
                entries.push((324, array(offsets)));
                entries.push((325, array(counts)));
            }
            Layout::Striped { rows_per_strip } => {
                entries.push((273, array(offsets)));
                entries.push((278, Value::Long(vec![rows_per_strip])));
                entries.push((279, array(counts)));
            }
        }
        if let Some(tables) = &spec.jpeg_tables {
            entries.push((347, Value::Undefined(tables.clone())));
        }

        entries.sort_by_key(|(tag, _)| *tag);
        entries
    }
}

impl Default for TiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Writer {
    buf: Vec<u8>,
    big_endian: bool,
}

impl Writer {
    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn align(&mut self) {
        if self.buf.len() % 2 == 1 {
            self.buf.push(0);
        }
    }

    fn u16(&mut self, v: u16) {
        let bytes = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.bytes(&bytes);
    }

    fn u32(&mut self, v: u32) {
        let bytes = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.bytes(&bytes);
    }

    fn u64(&mut self, v: u64) {
        let bytes = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.bytes(&bytes);
    }

    fn encode(&self, value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        match value {
            Value::Short(values) => {
                for v in values {
                    out.extend(if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() });
                }
            }
            Value::Long(values) => {
                for v in values {
                    out.extend(if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() });
                }
            }
            Value::Long8(values) => {
                for v in values {
                    out.extend(if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() });
                }
            }
            Value::Undefined(bytes) => out.extend_from_slice(bytes),
        }
        out
    }

    fn encode_offset(&self, offset: u64, bigtiff: bool) -> Vec<u8> {
        match (bigtiff, self.big_endian) {
            (true, true) => offset.to_be_bytes().to_vec(),
            (true, false) => offset.to_le_bytes().to_vec(),
            (false, true) => (offset as u32).to_be_bytes().to_vec(),
            (false, false) => (offset as u32).to_le_bytes().to_vec(),
        }
    }

    fn patch_offset(&mut self, pos: usize, offset: u64, bigtiff: bool) {
        let encoded = self.encode_offset(offset, bigtiff);
        self.buf[pos..pos + encoded.len()].copy_from_slice(&encoded);
    }
}
