//! Per-level tile directories.
//!
//! A [`TileDirectory`] turns container metadata for one level into a
//! validated, addressable grid of stored tiles. Validation happens once,
//! when the level is built; after that the directory is immutable.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::TileError;
use crate::format::tiff::{Compression, LevelMetadata, TileLayout};

use super::buffer::PixelFormat;
use super::codec::{CodecDispatcher, CodecId, SideTable};
use super::geometry::{Point, Region, Size};

/// One stored, compressed tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeTile {
    pub col: u32,
    pub row: u32,
    pub offset: u64,
    pub length: u64,
}

/// Geometry and codec of one resolution level.
#[derive(Debug, Clone)]
pub struct Level {
    /// 0 = highest resolution
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub layout: TileLayout,
    pub codec: CodecId,
    pub compression: Compression,
    pub format: PixelFormat,
    /// Shared by every tile of the level
    pub side_table: Arc<SideTable>,
}

impl Level {
    pub fn image_region(&self) -> Region {
        Region::new(0, 0, self.width as u64, self.height as u64)
    }

    pub fn native_tile_size(&self) -> Size {
        Size::new(self.tile_width as u64, self.tile_height as u64)
    }

    /// Native grid dimensions as (columns, rows).
    pub fn native_grid(&self) -> (u32, u32) {
        let grid = Size::new(self.width as u64, self.height as u64).ceil_div(self.native_tile_size());
        (grid.width as u32, grid.height as u32)
    }

    /// Declared footprint of native tile (`col`, `row`), before clipping to
    /// the image.
    pub fn native_region(&self, col: u32, row: u32) -> Region {
        Region::from_tile(Point::new(col as u64, row as u64), self.native_tile_size())
    }
}

/// Validated index of a level's stored tiles.
#[derive(Debug, Clone)]
pub struct TileDirectory {
    level: Level,
    tiles: Vec<NativeTile>,
    index: HashMap<(u32, u32), usize>,
}

impl TileDirectory {
    /// Build the directory for one level of a container of `container_len`
    /// bytes.
    ///
    /// # Errors
    ///
    /// - `UnsupportedCodec` if the compression has no registered decoder, or
    ///   the sample layout is one the decoders cannot produce
    /// - `CorruptDirectory` if the geometry is degenerate, a tile lies
    ///   outside the grid or is listed twice, or a tile's byte range runs
    ///   past the end of the container
    pub fn parse(
        metadata: &LevelMetadata,
        container_len: u64,
        dispatcher: &CodecDispatcher,
    ) -> Result<Self, TileError> {
        let level_index = metadata.index;
        let unsupported = |what: String| TileError::UnsupportedCodec {
            level: level_index,
            compression: what,
        };
        let corrupt = |reason: String| TileError::CorruptDirectory {
            level: level_index,
            reason,
        };

        let codec = CodecId::from_compression(metadata.compression)
            .filter(|codec| dispatcher.supports(*codec))
            .ok_or_else(|| unsupported(metadata.compression.name()))?;
        let format = pixel_format(codec, metadata).map_err(unsupported)?;

        if metadata.width == 0 || metadata.height == 0 {
            return Err(corrupt(format!(
                "image size {}x{}",
                metadata.width, metadata.height
            )));
        }
        if metadata.tile_width == 0 || metadata.tile_height == 0 {
            return Err(corrupt(format!(
                "tile size {}x{}",
                metadata.tile_width, metadata.tile_height
            )));
        }

        let level = Level {
            index: level_index,
            width: metadata.width,
            height: metadata.height,
            tile_width: metadata.tile_width,
            tile_height: metadata.tile_height,
            layout: metadata.layout,
            codec,
            compression: metadata.compression,
            format,
            side_table: Arc::new(SideTable::for_level(codec, metadata)),
        };

        let (cols, rows) = level.native_grid();
        let mut tiles = Vec::with_capacity(metadata.tiles.len());
        let mut index = HashMap::with_capacity(metadata.tiles.len());

        for location in &metadata.tiles {
            if location.col >= cols || location.row >= rows {
                return Err(corrupt(format!(
                    "tile ({}, {}) outside {cols}x{rows} grid",
                    location.col, location.row
                )));
            }
            // Never written; offset 0 alone is a valid position
            if location.length == 0 {
                continue;
            }

            let in_bounds = location
                .offset
                .checked_add(location.length)
                .is_some_and(|end| end <= container_len)
                && usize::try_from(location.length).is_ok();
            if !in_bounds {
                return Err(corrupt(format!(
                    "tile ({}, {}) spans {}+{} bytes, container holds {container_len}",
                    location.col, location.row, location.offset, location.length
                )));
            }

            let key = (location.col, location.row);
            if index.insert(key, tiles.len()).is_some() {
                return Err(corrupt(format!(
                    "tile ({}, {}) listed twice",
                    location.col, location.row
                )));
            }
            tiles.push(NativeTile {
                col: location.col,
                row: location.row,
                offset: location.offset,
                length: location.length,
            });
        }

        Ok(Self {
            level,
            tiles,
            index,
        })
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Stored tile at (`col`, `row`); `None` for sparse cells and
    /// coordinates outside the grid.
    pub fn lookup(&self, col: u32, row: u32) -> Option<NativeTile> {
        self.index.get(&(col, row)).map(|&i| self.tiles[i])
    }

    /// Stored tiles in container order.
    pub fn tiles(&self) -> &[NativeTile] {
        &self.tiles
    }
}

/// Decoded format for a level, or a description of why none exists.
fn pixel_format(codec: CodecId, metadata: &LevelMetadata) -> Result<PixelFormat, String> {
    let name = metadata.compression.name();
    let samples = metadata.samples_per_pixel;
    let bits = metadata.bits_per_sample;

    if metadata.planar_configuration == 2 && samples > 1 {
        return Err(format!("{name} with planar sample layout"));
    }
    if !(1..=4).contains(&samples) {
        return Err(format!("{name} with {samples} samples per pixel"));
    }

    let bit_depth = match (codec, bits) {
        (CodecId::Jpeg, 8) => 8,
        (CodecId::Raw, 8) => 8,
        (CodecId::Raw, 16) => 16,
        (CodecId::Jpeg2000, 1..=8) => 8,
        (CodecId::Jpeg2000, 9..=16) => 16,
        _ => return Err(format!("{name} with {bits} bits per sample")),
    };

    Ok(PixelFormat::new(samples as u8, bit_depth))
}
