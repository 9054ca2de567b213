//! Reading tag values that may be inline or stored elsewhere in the file.
//!
//! Array tags such as TileOffsets are fetched with a single read of the
//! whole array.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::ByteSource;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::{FieldType, TiffTag};

/// Reads entry values through a byte source, honouring the header's byte
/// order and offset width.
pub struct ValueReader<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    header: &'a TiffHeader,
}

impl<'a, S: ByteSource + ?Sized> ValueReader<'a, S> {
    pub fn new(source: &'a S, header: &'a TiffHeader) -> Self {
        Self { source, header }
    }

    /// Raw value bytes of an entry, whether inline or at an offset.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        let len = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
            tag: tag_name(entry.tag),
            message: format!("value of {size} bytes does not fit in memory"),
        })?;
        let offset = entry.value_offset(self.header);
        Ok(self.source.read_exact_at(offset, len).await?)
    }

    /// Integer array (Short, Long, Long8 or Ifd8) widened to u64.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }

        match field_type {
            FieldType::Short | FieldType::Long | FieldType::Long8 | FieldType::Ifd8 => {}
            other => {
                return Err(TiffError::InvalidTagValue {
                    tag: tag_name(entry.tag),
                    message: format!("expected an integer array, got {other:?}"),
                })
            }
        }

        let bytes = self.read_bytes(entry).await?;
        Ok(parse_u64_array(
            &bytes,
            entry.count as usize,
            field_type,
            self.header.byte_order,
        ))
    }

    /// A scalar integer, inline or not.
    pub async fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        self.read_u64_array(entry)
            .await?
            .first()
            .copied()
            .ok_or(TiffError::InvalidTagValue {
                tag: tag_name(entry.tag),
                message: "empty value".to_string(),
            })
    }

    /// Opaque byte payload, such as JPEGTables.
    pub async fn read_raw_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        self.read_bytes(entry).await
    }
}

fn tag_name(tag: u16) -> &'static str {
    TiffTag::from_u16(tag).map(TiffTag::name).unwrap_or("unknown")
}

/// Decode `count` integers of `field_type` from `bytes`.
///
/// Stops early if `bytes` is shorter than the declared count.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let width = field_type.size_in_bytes();
    bytes
        .chunks_exact(width)
        .take(count)
        .filter_map(|chunk| match field_type {
            FieldType::Short => Some(byte_order.read_u16(chunk) as u64),
            FieldType::Long => Some(byte_order.read_u32(chunk) as u64),
            FieldType::Long8 | FieldType::Ifd8 => Some(byte_order.read_u64(chunk)),
            _ => None,
        })
        .collect()
}
