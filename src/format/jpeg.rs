//! JPEG stream assembly for tiles stored with shared tables.
//!
//! Pathology containers usually store each JPEG tile as an abbreviated
//! stream: SOI, frame and scan headers, entropy-coded data and EOI, with the
//! quantization (DQT) and Huffman (DHT) tables written once in the IFD's
//! `JPEGTables` tag. A decodable stream is the tables without their EOI
//! followed by the tile without its SOI:
//!
//! ```text
//! tables: SOI DQT.. DHT.. EOI      tile: SOI SOF SOS <data> EOI
//! merged: SOI DQT.. DHT.. SOF SOS <data> EOI
//! ```

use bytes::{BufMut, Bytes, BytesMut};

pub const SOI: [u8; 2] = [0xFF, 0xD8];
pub const EOI: [u8; 2] = [0xFF, 0xD9];
pub const DQT: [u8; 2] = [0xFF, 0xDB];
pub const DHT: [u8; 2] = [0xFF, 0xC4];
pub const SOS: [u8; 2] = [0xFF, 0xDA];
pub const APP14: [u8; 2] = [0xFF, 0xEE];

/// APP14 "Adobe" segment with transform 0: components are stored as-is,
/// not as YCbCr.
const ADOBE_RGB_SEGMENT: [u8; 16] = [
    0xFF, 0xEE, 0x00, 0x0E, b'A', b'd', b'o', b'b', b'e', 0x00, 0x64, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

/// Marker codes (second byte) of the header segments before the first SOS.
///
/// Walking stops at SOS, EOI or the first byte that is not a marker.
fn header_markers(data: &[u8]) -> Vec<u8> {
    let mut markers = Vec::new();
    if data.len() < 2 || data[..2] != SOI {
        return markers;
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let code = data[pos + 1];
        if code == 0xFF {
            // Fill byte
            pos += 1;
            continue;
        }
        markers.push(code);
        if code == SOS[1] || code == EOI[1] {
            break;
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 2 + length;
    }
    markers
}

/// Whether the stream defines its own quantization tables before its scan.
///
/// Tiles that do can be decoded without the level's shared tables.
pub fn has_tables(data: &[u8]) -> bool {
    header_markers(data).contains(&DQT[1])
}

/// Whether the stream starts with SOI and reaches a scan without defining
/// any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    let markers = header_markers(data);
    markers.last() == Some(&SOS[1]) && !markers.contains(&DQT[1]) && !markers.contains(&DHT[1])
}

/// Splice the shared `tables` stream in front of an abbreviated tile.
pub fn merge_jpeg_tables(tables: &[u8], tile: &[u8]) -> Bytes {
    if tables.is_empty() || tile.is_empty() {
        return Bytes::copy_from_slice(tile);
    }

    let tables = tables.strip_suffix(&EOI[..]).unwrap_or(tables);
    let tile = tile.strip_prefix(&SOI[..]).unwrap_or(tile);

    let mut merged = BytesMut::with_capacity(tables.len() + tile.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(tile);
    merged.freeze()
}

/// Insert an Adobe APP14 segment right after SOI unless one is present.
pub fn insert_adobe_rgb_marker(stream: &[u8]) -> Bytes {
    if stream.len() < 2 || stream[..2] != SOI || header_markers(stream).contains(&APP14[1]) {
        return Bytes::copy_from_slice(stream);
    }

    let mut out = BytesMut::with_capacity(stream.len() + ADOBE_RGB_SEGMENT.len());
    out.put_slice(&SOI);
    out.put_slice(&ADOBE_RGB_SEGMENT);
    out.put_slice(&stream[2..]);
    out.freeze()
}

/// Build a self-contained JPEG for one stored tile.
///
/// Shared tables are only spliced in when the tile lacks its own.
/// `rgb` marks tiles whose photometric interpretation is RGB.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile: &[u8], rgb: bool) -> Bytes {
    let stream = match tables {
        Some(tables) if !has_tables(tile) => merge_jpeg_tables(tables, tile),
        _ => Bytes::copy_from_slice(tile),
    };

    if rgb {
        insert_adobe_rgb_marker(&stream)
    } else {
        stream
    }
}
