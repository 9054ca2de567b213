//! # wsi-tiler
//!
//! Fixed-size tiles from pyramidal TIFF and BigTIFF whole slide images.
//!
//! Each pyramid level of a slide is presented as a grid of equally sized
//! output tiles, whatever the level's native tiling. Output tiles are stitched
//! from the stored tiles they overlap, decoded with the level's codec (JPEG
//! with shared tables, JPEG 2000, or uncompressed) and padded with a
//! background value past the image edge and over missing tiles.
//!
//! ## Architecture
//!
//! - [`io`] - Byte sources (memory, memory-mapped files)
//! - [`mod@format`] - TIFF parsing and JPEG stream handling
//! - [`tile`] - Tile directories, decoders, cache and stitching
//! - [`slide`] - The [`Tiler`] entry point
//! - [`config`] - Library configuration and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_tiler::{Tiler, TilerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wsi_tiler::TileError> {
//!     let config = TilerConfig::default().with_tile_size(512);
//!     let tiler = Tiler::open_path("slide.tif", config).await?;
//!
//!     for info in tiler.levels_info() {
//!         println!("level {}: {}x{}", info.index, info.width, info.height);
//!     }
//!
//!     let tile = tiler.get_tile(0, 0, 0).await?;
//!     assert_eq!((tile.width, tile.height), (512, 512));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, DecodeFailurePolicy, InfoConfig, TileConfig, TilerConfig};
pub use error::{IoError, TiffError, TileError};
pub use format::tiff::{
    ByteOrder, Compression, LevelMetadata, TiffPyramid, TileLayout, TileLocation,
};
pub use io::{ByteSource, MemorySource, MmapSource};
pub use slide::Tiler;
pub use tile::{
    CacheStats, CodecDispatcher, CodecId, DecodedTile, JpegTileEncoder, LevelInfo, PixelFormat,
    SideTable, TileCache, TileContext, TileDecoder, TileDirectory, TiledPage,
};
