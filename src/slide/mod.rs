//! Opened slides.
//!
//! A [`Tiler`] ties a byte source, the pyramid parsed from it and the tiling
//! engine together:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Tiler                   │
//! │   (levels, shared decoded-tile cache)   │
//! └────────────────────┬────────────────────┘
//!                      │ one per level
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TiledPage                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wsi_tiler::{Tiler, TilerConfig};
//!
//! let tiler = Tiler::open_path("slide.tif", TilerConfig::default()).await?;
//! let info = tiler.get_level_info(0)?;
//! let tile = tiler.get_tile(0, info.tiles_x - 1, 0).await?;
//! ```

mod tiler;

pub use tiler::Tiler;
