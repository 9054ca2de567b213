use thiserror::Error;

use crate::tile::CodecId;

/// I/O errors raised by a byte source
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Requested range exceeds the container bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Failure opening or mapping the backing file
    #[error("I/O error on {path}: {message}")]
    Open { path: String, message: String },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain the structure being read
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// IFD offset points outside the file
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors surfaced by the tiling engine.
///
/// `CorruptDirectory` and `UnsupportedCodec` are structural and raised while a
/// level is being built. `DecodeError` and `OutOfRange` belong to a single
/// tile request and leave every other tile usable.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Byte source failure
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Container structure failure
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// Tile offsets or lengths disagree with the container
    #[error("Corrupt tile directory on level {level}: {reason}")]
    CorruptDirectory { level: usize, reason: String },

    /// No decoder is registered for the level's compression
    #[error("Unsupported codec on level {level}: {compression}")]
    UnsupportedCodec { level: usize, compression: String },

    /// A native tile could not be decoded
    #[error("{codec} decode failed for tile ({col}, {row}) on level {level}: {cause}")]
    DecodeError {
        codec: CodecId,
        level: usize,
        col: u32,
        row: u32,
        cause: String,
    },

    /// Requested tile lies outside the level grid
    #[error("Tile ({col}, {row}) out of range for level {level} (grid is {cols}x{rows})")]
    OutOfRange {
        level: usize,
        col: u32,
        row: u32,
        cols: u32,
        rows: u32,
    },

    /// Requested level does not exist
    #[error("Invalid level {level}: slide has {count} levels")]
    InvalidLevel { level: usize, count: usize },

    /// Configuration rejected before opening
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Re-encoding a decoded tile failed
    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },
}
