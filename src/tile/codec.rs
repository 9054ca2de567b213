//! Codec dispatch for stored tiles.
//!
//! Each level names one [`CodecId`] and carries one [`SideTable`] shaped for
//! it. The [`CodecDispatcher`] maps codec ids to [`TileDecoder`]s; the
//! default registry covers baseline JPEG, JPEG 2000 and uncompressed data,
//! and callers may replace or add decoders with
//! [`register`](CodecDispatcher::register).
//!
//! # Reentrancy
//!
//! Decoders are called from the blocking thread pool, many at a time. The
//! JPEG path uses the pure-Rust decoder in `image`, which keeps no global
//! state. The JPEG 2000 path goes through OpenJPEG via `jpeg2k`; every call
//! creates and frees its own codec and stream handles, so no OpenJPEG state
//! outlives or is shared between decodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use image::ImageFormat;
use serde::Serialize;
use tracing::trace;

use crate::error::TileError;
use crate::format::jpeg::prepare_tile_jpeg;
use crate::format::tiff::{ByteOrder, Compression, LevelMetadata, PHOTOMETRIC_RGB};

use super::buffer::{DecodedTile, PixelFormat};

/// JPEG 2000 start-of-codestream marker
const J2K_SOC: [u8; 2] = [0xFF, 0x4F];

// =============================================================================
// Codec ids and side tables
// =============================================================================

/// The codecs a level can be stored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecId {
    Jpeg,
    Jpeg2000,
    Raw,
}

impl CodecId {
    /// Map a TIFF compression value onto a codec, if one applies.
    pub fn from_compression(compression: Compression) -> Option<Self> {
        match compression {
            Compression::Jpeg => Some(CodecId::Jpeg),
            Compression::Jpeg2000(_) => Some(CodecId::Jpeg2000),
            Compression::None => Some(CodecId::Raw),
            _ => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecId::Jpeg => "JPEG",
            CodecId::Jpeg2000 => "JPEG 2000",
            CodecId::Raw => "raw",
        };
        f.write_str(name)
    }
}

/// Codec data stored once per level and shared by all of its tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideTable {
    Jpeg {
        /// Quantization and Huffman tables for abbreviated tile streams
        tables: Option<Bytes>,
        /// Samples are RGB rather than YCbCr
        adobe_rgb: bool,
    },
    Jpeg2000 {
        /// Main header prepended to tiles that start without SOC
        main_header: Option<Bytes>,
    },
    Raw {
        /// Order of 16-bit samples in the file
        byte_order: ByteOrder,
    },
}

impl SideTable {
    pub fn for_level(codec: CodecId, level: &LevelMetadata) -> Self {
        match codec {
            CodecId::Jpeg => SideTable::Jpeg {
                tables: level.jpeg_tables.clone(),
                adobe_rgb: level.photometric == Some(PHOTOMETRIC_RGB),
            },
            CodecId::Jpeg2000 => SideTable::Jpeg2000 {
                main_header: level.jpeg_tables.clone(),
            },
            CodecId::Raw => SideTable::Raw {
                byte_order: level.byte_order,
            },
        }
    }
}

/// The stored tile a decode call works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileContext {
    pub level: usize,
    pub col: u32,
    pub row: u32,
    /// Declared native tile size
    pub width: u32,
    pub height: u32,
    /// Format the decoded buffer must have
    pub format: PixelFormat,
}

impl TileContext {
    /// A `DecodeError` for this tile.
    pub fn decode_error(&self, codec: CodecId, cause: impl fmt::Display) -> TileError {
        TileError::DecodeError {
            codec,
            level: self.level,
            col: self.col,
            row: self.row,
            cause: cause.to_string(),
        }
    }
}

// =============================================================================
// Decoders
// =============================================================================

/// Decodes the bytes of one stored tile.
///
/// Implementations are called concurrently from blocking worker threads and
/// must return a buffer in `ctx.format`.
pub trait TileDecoder: Send + Sync {
    fn decode(
        &self,
        data: &[u8],
        side_table: &SideTable,
        ctx: &TileContext,
    ) -> Result<DecodedTile, TileError>;
}

/// Baseline JPEG, with shared tables spliced into abbreviated streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegDecoder;

impl TileDecoder for JpegDecoder {
    fn decode(
        &self,
        data: &[u8],
        side_table: &SideTable,
        ctx: &TileContext,
    ) -> Result<DecodedTile, TileError> {
        let (tables, rgb) = match side_table {
            SideTable::Jpeg { tables, adobe_rgb } => (tables.as_deref(), *adobe_rgb),
            _ => (None, false),
        };
        let stream = prepare_tile_jpeg(tables, data, rgb);

        let image = image::load_from_memory_with_format(&stream, ImageFormat::Jpeg)
            .map_err(|e| ctx.decode_error(CodecId::Jpeg, e))?;

        let (width, height) = (image.width(), image.height());
        let data = match ctx.format.channels {
            1 => image.into_luma8().into_raw(),
            3 => image.into_rgb8().into_raw(),
            4 => image.into_rgba8().into_raw(),
            n => {
                return Err(ctx.decode_error(CodecId::Jpeg, format!("cannot produce {n} channels")))
            }
        };

        Ok(DecodedTile {
            width,
            height,
            format: PixelFormat::new(ctx.format.channels, 8),
            data,
        })
    }
}

/// JPEG 2000 codestreams through OpenJPEG.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jpeg2000Decoder;

impl TileDecoder for Jpeg2000Decoder {
    fn decode(
        &self,
        data: &[u8],
        side_table: &SideTable,
        ctx: &TileContext,
    ) -> Result<DecodedTile, TileError> {
        let err = |cause: String| ctx.decode_error(CodecId::Jpeg2000, cause);

        let stream = match side_table {
            SideTable::Jpeg2000 {
                main_header: Some(header),
            } if !data.starts_with(&J2K_SOC) => {
                let mut joined = BytesMut::with_capacity(header.len() + data.len());
                joined.extend_from_slice(header);
                joined.extend_from_slice(data);
                joined.freeze()
            }
            _ => Bytes::copy_from_slice(data),
        };

        let image = jpeg2k::Image::from_bytes(&stream).map_err(|e| err(e.to_string()))?;
        let (width, height) = (image.width(), image.height());
        let components = image.components();
        let channels = ctx.format.channels as usize;

        if components.len() < channels {
            return Err(err(format!(
                "codestream has {} components, level needs {channels}",
                components.len()
            )));
        }
        let components = &components[..channels];
        let pixel_count = width as usize * height as usize;
        if components
            .iter()
            .any(|c| c.width() != width || c.height() != height || c.data().len() < pixel_count)
        {
            return Err(err("subsampled components are not supported".to_string()));
        }

        let wide = ctx.format.bit_depth > 8;
        let mut out = Vec::with_capacity(pixel_count * ctx.format.bytes_per_pixel());
        for i in 0..pixel_count {
            for component in components {
                let precision = component.precision().clamp(1, 16);
                let max = (1i64 << precision) - 1;
                let value = (component.data()[i] as i64).clamp(0, max) as u32;
                if wide {
                    out.extend_from_slice(&(value as u16).to_le_bytes());
                } else if precision > 8 {
                    out.push((value >> (precision - 8)) as u8);
                } else {
                    out.push(value as u8);
                }
            }
        }

        Ok(DecodedTile {
            width,
            height,
            format: ctx.format,
            data: out,
        })
    }
}

/// Uncompressed chunky samples.
///
/// A stored unit shorter than the declared tile (typically the last strip)
/// yields only the rows it holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl TileDecoder for RawDecoder {
    fn decode(
        &self,
        data: &[u8],
        side_table: &SideTable,
        ctx: &TileContext,
    ) -> Result<DecodedTile, TileError> {
        let row_bytes = ctx.width as usize * ctx.format.bytes_per_pixel();
        if row_bytes == 0 {
            return Err(ctx.decode_error(CodecId::Raw, "zero-width tile"));
        }
        let rows = (data.len() / row_bytes).min(ctx.height as usize);
        if rows == 0 {
            return Err(ctx.decode_error(
                CodecId::Raw,
                format!("{} bytes is less than one row of {row_bytes}", data.len()),
            ));
        }

        let mut pixels = data[..rows * row_bytes].to_vec();
        let big_endian = matches!(
            side_table,
            SideTable::Raw {
                byte_order: ByteOrder::BigEndian
            }
        );
        if ctx.format.bytes_per_sample() == 2 && big_endian {
            for sample in pixels.chunks_exact_mut(2) {
                sample.swap(0, 1);
            }
        }

        Ok(DecodedTile {
            width: ctx.width,
            height: rows as u32,
            format: ctx.format,
            data: pixels,
        })
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Registry of decoders keyed by codec.
#[derive(Clone, Default)]
pub struct CodecDispatcher {
    decoders: HashMap<CodecId, Arc<dyn TileDecoder>>,
}

impl CodecDispatcher {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// JPEG, JPEG 2000 and raw decoders.
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(CodecId::Jpeg, Arc::new(JpegDecoder));
        dispatcher.register(CodecId::Jpeg2000, Arc::new(Jpeg2000Decoder));
        dispatcher.register(CodecId::Raw, Arc::new(RawDecoder));
        dispatcher
    }

    /// Install `decoder` for `codec`, replacing any previous one.
    pub fn register(&mut self, codec: CodecId, decoder: Arc<dyn TileDecoder>) -> &mut Self {
        self.decoders.insert(codec, decoder);
        self
    }

    pub fn supports(&self, codec: CodecId) -> bool {
        self.decoders.contains_key(&codec)
    }

    /// Decode one stored tile with the decoder registered for `codec`.
    pub fn decode(
        &self,
        codec: CodecId,
        data: &[u8],
        side_table: &SideTable,
        ctx: &TileContext,
    ) -> Result<DecodedTile, TileError> {
        let decoder = self
            .decoders
            .get(&codec)
            .ok_or_else(|| TileError::UnsupportedCodec {
                level: ctx.level,
                compression: codec.to_string(),
            })?;

        trace!(%codec, level = ctx.level, col = ctx.col, row = ctx.row, bytes = data.len(), "decode");
        decoder.decode(data, side_table, ctx)
    }
}

impl fmt::Debug for CodecDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codecs: Vec<_> = self.decoders.keys().map(|c| c.to_string()).collect();
        codecs.sort();
        f.debug_struct("CodecDispatcher")
            .field("codecs", &codecs)
            .finish()
    }
}
