//! Tiling engine.
//!
//! This module turns a level's stored tiles into fixed-size output tiles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               TiledPage                 │
//! │   (output grid, bounds checks, info)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileStitcher               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │ CodecDispatcher │  │
//! │  │  (decoded    │  │ (JPEG, J2K,     │  │
//! │  │   tiles)     │  │  raw)           │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     TileDirectory  +  ByteSource        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TiledPage`]: one level as a grid of output tiles
//! - [`TileStitcher`]: assembles an output tile from overlapping native tiles
//! - [`TileDirectory`]: validated index of a level's stored tiles
//! - [`CodecDispatcher`]: decoders keyed by [`CodecId`]
//! - [`TileCache`]: LRU of decoded native tiles with single-flight decoding
//! - [`JpegTileEncoder`]: writes decoded tiles as JPEG

mod buffer;
mod cache;
mod codec;
mod directory;
mod encoder;
mod geometry;
mod page;
mod stitcher;

pub use buffer::{DecodedTile, PixelFormat};
pub use cache::{CacheStats, TileCache, TileKey, DEFAULT_CACHE_BYTES, DEFAULT_CACHE_ENTRIES};
pub use codec::{
    CodecDispatcher, CodecId, Jpeg2000Decoder, JpegDecoder, RawDecoder, SideTable, TileContext,
    TileDecoder,
};
pub use directory::{Level, NativeTile, TileDirectory};
pub use encoder::{
    clamp_quality, is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use geometry::{Point, Region, Size};
pub use page::{LevelInfo, TiledPage};
pub use stitcher::TileStitcher;
