//! Per-level tiled view.
//!
//! A [`TiledPage`] presents one level as a grid of equally sized output
//! tiles, independent of how the level stores its pixels.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{TilerConfig, DEFAULT_STRIPED_TILE_SIZE};
use crate::error::TileError;
use crate::format::tiff::TileLayout;
use crate::io::ByteSource;

use super::buffer::DecodedTile;
use super::cache::TileCache;
use super::codec::{CodecDispatcher, CodecId};
use super::directory::{Level, TileDirectory};
use super::geometry::Size;
use super::stitcher::TileStitcher;

// =============================================================================
// Level Information
// =============================================================================

/// Snapshot of a level's geometry, as served to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelInfo {
    pub index: usize,

    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Output tile width
    pub tile_width: u32,

    /// Output tile height
    pub tile_height: u32,

    pub native_tile_width: u32,
    pub native_tile_height: u32,

    /// Number of output tiles in X direction
    pub tiles_x: u32,

    /// Number of output tiles in Y direction
    pub tiles_y: u32,

    pub codec: CodecId,

    /// TIFF compression tag value
    pub compression: u16,

    pub layout: TileLayout,
    pub channels: u8,
    pub bit_depth: u8,

    /// Downsample factor relative to level 0
    pub downsample: f64,

    /// Native tiles with stored data
    pub stored_tiles: usize,
}

// =============================================================================
// TiledPage
// =============================================================================

/// One level of a slide, cut into output tiles.
pub struct TiledPage {
    directory: Arc<TileDirectory>,
    stitcher: TileStitcher,
    grid: (u32, u32),
}

impl TiledPage {
    pub fn new(
        directory: TileDirectory,
        source: Arc<dyn ByteSource>,
        cache: Arc<TileCache>,
        dispatcher: Arc<CodecDispatcher>,
        config: &TilerConfig,
    ) -> Self {
        let (tile_width, tile_height) = output_tile_size(directory.level(), config.tile_size);
        let level = directory.level();
        let grid = Size::new(level.width as u64, level.height as u64)
            .ceil_div(Size::new(tile_width as u64, tile_height as u64));

        let directory = Arc::new(directory);
        let stitcher = TileStitcher::new(
            source,
            Arc::clone(&directory),
            cache,
            dispatcher,
            tile_width,
            tile_height,
            config.background,
            config.on_decode_error,
        );

        Self {
            directory,
            stitcher,
            grid: (grid.width as u32, grid.height as u32),
        }
    }

    pub fn level(&self) -> &Level {
        self.directory.level()
    }

    pub fn directory(&self) -> &TileDirectory {
        &self.directory
    }

    /// Output tile size as (width, height).
    pub fn tile_size(&self) -> (u32, u32) {
        self.stitcher.tile_size()
    }

    /// Output grid as (columns, rows).
    pub fn grid_size(&self) -> (u32, u32) {
        self.grid
    }

    /// Output tile (`col`, `row`).
    ///
    /// # Errors
    ///
    /// - `OutOfRange` if the coordinate is outside the output grid
    /// - `DecodeError` if a constituent native tile fails to decode and the
    ///   decode-failure policy is `Fail`
    /// - `Io` if a native tile cannot be read
    pub async fn get_tile(&self, col: u32, row: u32) -> Result<DecodedTile, TileError> {
        let (cols, rows) = self.grid;
        if col >= cols || row >= rows {
            return Err(TileError::OutOfRange {
                level: self.level().index,
                col,
                row,
                cols,
                rows,
            });
        }

        self.stitcher.get_output_tile(col, row).await
    }

    /// Geometry of this level, with the downsample factor left at 1.0.
    pub fn info(&self) -> LevelInfo {
        let level = self.level();
        let (tile_width, tile_height) = self.tile_size();
        let (tiles_x, tiles_y) = self.grid;

        LevelInfo {
            index: level.index,
            width: level.width,
            height: level.height,
            tile_width,
            tile_height,
            native_tile_width: level.tile_width,
            native_tile_height: level.tile_height,
            tiles_x,
            tiles_y,
            codec: level.codec,
            compression: level.compression.as_u16(),
            layout: level.layout,
            channels: level.format.channels,
            bit_depth: level.format.bit_depth,
            downsample: 1.0,
            stored_tiles: self.directory.tiles().len(),
        }
    }
}

/// Output tile size for `level` given an optional configured edge.
fn output_tile_size(level: &Level, configured: Option<u32>) -> (u32, u32) {
    match (configured, level.layout) {
        (Some(size), _) => (size, size),
        (None, TileLayout::Tiled) => (level.tile_width, level.tile_height),
        (None, TileLayout::Striped) => (DEFAULT_STRIPED_TILE_SIZE, DEFAULT_STRIPED_TILE_SIZE),
    }
}
