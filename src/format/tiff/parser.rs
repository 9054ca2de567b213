//! TIFF header and IFD parsing.
//!
//! ```text
//! Classic TIFF header (8 bytes)      BigTIFF header (16 bytes)
//!   0..2  byte order (II / MM)         0..2   byte order
//!   2..4  42                           2..4   43
//!   4..8  first IFD offset (u32)       4..6   offset size (8)
//!                                      6..8   reserved
//!                                      8..16  first IFD offset (u64)
//! ```
//!
//! An IFD is an entry count, a run of fixed-size entries and the offset of
//! the next IFD. Entries are 12 bytes in classic TIFF and 20 in BigTIFF.

use crate::error::TiffError;
use crate::io::{read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le};

use super::tags::{FieldType, TiffTag};

/// "II"
const MAGIC_LITTLE_ENDIAN: u16 = 0x4949;

/// "MM"
const MAGIC_BIG_ENDIAN: u16 = 0x4D4D;

const VERSION_CLASSIC: u16 = 42;
const VERSION_BIG: u16 = 43;

pub const TIFF_HEADER_SIZE: usize = 8;
pub const BIGTIFF_HEADER_SIZE: usize = 16;

// =============================================================================
// ByteOrder
// =============================================================================

/// Endianness declared by the first two header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => read_u16_le(bytes),
            ByteOrder::BigEndian => read_u16_be(bytes),
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => read_u32_le(bytes),
            ByteOrder::BigEndian => read_u32_be(bytes),
        }
    }

    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => read_u64_le(bytes),
            ByteOrder::BigEndian => read_u64_be(bytes),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Byte order, flavour and first IFD location of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub is_bigtiff: bool,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse the header from the first bytes of a file of `file_size` bytes.
    ///
    /// Pass at least [`BIGTIFF_HEADER_SIZE`] bytes when available; classic
    /// TIFF only needs the first eight.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        require_len(bytes, TIFF_HEADER_SIZE)?;

        let byte_order = match u16::from_le_bytes([bytes[0], bytes[1]]) {
            MAGIC_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            MAGIC_BIG_ENDIAN => ByteOrder::BigEndian,
            other => return Err(TiffError::InvalidMagic(other)),
        };

        let (is_bigtiff, first_ifd_offset) = match byte_order.read_u16(&bytes[2..4]) {
            VERSION_CLASSIC => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIG => {
                require_len(bytes, BIGTIFF_HEADER_SIZE)?;
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            other => return Err(TiffError::InvalidVersion(other)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// 12 bytes classic, 20 BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Width of the entry count that opens an IFD.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Width of the next-IFD offset that closes an IFD, and of every
    /// entry's value/offset field.
    #[inline]
    pub const fn offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    fn read_offset(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            self.byte_order.read_u32(bytes) as u64
        }
    }
}

fn require_len(bytes: &[u8], required: usize) -> Result<(), TiffError> {
    if bytes.len() < required {
        return Err(TiffError::FileTooSmall {
            required: required as u64,
            actual: bytes.len() as u64,
        });
    }
    Ok(())
}

// =============================================================================
// IfdEntry
// =============================================================================

/// One raw IFD entry.
///
/// The value/offset field is kept verbatim; whether it holds the value
/// itself or points at it depends on the field type and count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    /// `None` for field types the parser does not understand
    pub field_type: Option<FieldType>,
    pub field_type_raw: u16,
    pub count: u64,
    /// 4 bytes for classic TIFF, 8 for BigTIFF
    pub value_offset_bytes: [u8; 8],
    pub is_inline: bool,
}

impl IfdEntry {
    /// Total size of the entry's values, if the type is known.
    pub fn value_byte_size(&self) -> Option<u64> {
        let size = self.field_type?.size_in_bytes() as u64;
        self.count.checked_mul(size)
    }

    /// The value/offset field read as an offset.
    pub fn value_offset(&self, header: &TiffHeader) -> u64 {
        header.read_offset(&self.value_offset_bytes)
    }

    /// A single inline integer, widened to u64.
    ///
    /// Returns `None` unless the entry holds exactly one inline
    /// Short, Long or Long8.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        let bytes = &self.value_offset_bytes;
        match self.field_type? {
            FieldType::Short => Some(byte_order.read_u16(bytes) as u64),
            FieldType::Long => Some(byte_order.read_u32(bytes) as u64),
            FieldType::Long8 | FieldType::Ifd8 => Some(byte_order.read_u64(bytes)),
            _ => None,
        }
    }

    /// Like [`inline_u64`](Self::inline_u64), rejecting values above u32.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        self.inline_u64(byte_order)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// First inline Short; BitsPerSample stores one per sample but they agree
    /// in every container we read.
    pub fn first_inline_u16(&self, byte_order: ByteOrder) -> Option<u16> {
        if !self.is_inline || self.count == 0 {
            return None;
        }
        match self.field_type? {
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes)),
            _ => self.inline_u32(byte_order).and_then(|v| u16::try_from(v).ok()),
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed image file directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    /// Where this IFD starts in the file
    pub offset: u64,
    pub entries: Vec<IfdEntry>,
    /// Zero terminates the chain
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Bytes occupied by an IFD with `entry_count` entries.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> u64 {
        header.ifd_count_size() as u64
            + entry_count.saturating_mul(header.ifd_entry_size() as u64)
            + header.offset_size() as u64
    }

    /// Read the entry count from the first bytes of an IFD.
    pub fn entry_count(bytes: &[u8], header: &TiffHeader) -> Result<u64, TiffError> {
        require_len(bytes, header.ifd_count_size())?;
        Ok(if header.is_bigtiff {
            header.byte_order.read_u64(bytes)
        } else {
            header.byte_order.read_u16(bytes) as u64
        })
    }

    /// Parse a complete IFD that starts at `offset`.
    ///
    /// `bytes` must hold the whole directory, see
    /// [`calculate_size`](Self::calculate_size).
    pub fn parse(bytes: &[u8], offset: u64, header: &TiffHeader) -> Result<Self, TiffError> {
        let count = Self::entry_count(bytes, header)?;
        let total = Self::calculate_size(count, header);
        require_len(bytes, total as usize)?;

        let byte_order = header.byte_order;
        let entry_size = header.ifd_entry_size();
        let value_size = header.offset_size();
        let mut entries = Vec::with_capacity(count as usize);

        for i in 0..count as usize {
            let start = header.ifd_count_size() + i * entry_size;
            let raw = &bytes[start..start + entry_size];

            let tag = byte_order.read_u16(&raw[0..2]);
            let field_type_raw = byte_order.read_u16(&raw[2..4]);
            let field_type = FieldType::from_u16(field_type_raw);
            let (count, value_at) = if header.is_bigtiff {
                (byte_order.read_u64(&raw[4..12]), 12)
            } else {
                (byte_order.read_u32(&raw[4..8]) as u64, 8)
            };

            let mut value_offset_bytes = [0u8; 8];
            value_offset_bytes[..value_size].copy_from_slice(&raw[value_at..value_at + value_size]);

            let is_inline = field_type
                .map(|ft| ft.fits_inline(count, header.is_bigtiff))
                .unwrap_or(false);

            entries.push(IfdEntry {
                tag,
                field_type,
                field_type_raw,
                count,
                value_offset_bytes,
                is_inline,
            });
        }

        let next_at = total as usize - value_size;
        let next_ifd_offset = header.read_offset(&bytes[next_at..next_at + value_size]);

        Ok(Ifd {
            offset,
            entries,
            next_ifd_offset,
        })
    }

    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag.as_u16())
    }

    /// Inline scalar value of `tag`.
    pub fn get_u32(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(tag)?.inline_u32(byte_order)
    }

    pub fn image_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::ImageWidth, byte_order)
    }

    pub fn image_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::ImageLength, byte_order)
    }

    pub fn tile_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::TileWidth, byte_order)
    }

    pub fn tile_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::TileLength, byte_order)
    }

    pub fn compression(&self, byte_order: ByteOrder) -> Option<u16> {
        self.get_entry_by_tag(TiffTag::Compression)?
            .first_inline_u16(byte_order)
    }

    pub fn is_tiled(&self) -> bool {
        self.get_entry_by_tag(TiffTag::TileOffsets).is_some()
    }
}
