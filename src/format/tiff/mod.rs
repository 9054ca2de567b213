//! TIFF and BigTIFF container parsing.
//!
//! Only the structure needed to locate pyramid levels and their stored
//! tiles is decoded: the header, the IFD chain, and a handful of layout
//! and codec tags. Values are read in the byte order the header declares,
//! with inline values taken straight from the entry.

mod parser;
mod pyramid;
mod tags;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{LevelMetadata, TiffPyramid, TileLayout, TileLocation};
pub use tags::{Compression, FieldType, TiffTag, PHOTOMETRIC_RGB};
pub use values::{parse_u64_array, ValueReader};
