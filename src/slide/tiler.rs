//! Slide-level entry point.
//!
//! A [`Tiler`] owns one opened container: a byte source, one [`TiledPage`]
//! per pyramid level, and a decoded-tile cache shared by all of them.
//! Everything is validated in [`Tiler::open`]; afterwards tile requests only
//! fail for the tile concerned.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::TilerConfig;
use crate::error::TileError;
use crate::format::tiff::{LevelMetadata, TiffPyramid};
use crate::io::{ByteSource, MmapSource};
use crate::tile::{
    CacheStats, CodecDispatcher, DecodedTile, LevelInfo, TileCache, TileDirectory, TiledPage,
};

/// An opened slide, ready to serve output tiles.
///
/// `Tiler` is `Send + Sync`; share it through an `Arc` to serve requests from
/// many tasks.
pub struct Tiler {
    source: Arc<dyn ByteSource>,
    pages: Vec<TiledPage>,
    cache: Arc<TileCache>,
    config: TilerConfig,
}

impl Tiler {
    /// Open a TIFF or BigTIFF container with the default decoders.
    pub async fn open(source: Arc<dyn ByteSource>, config: TilerConfig) -> Result<Self, TileError> {
        Self::open_with_dispatcher(source, config, CodecDispatcher::with_defaults()).await
    }

    /// Memory-map `path` and open it.
    pub async fn open_path(path: impl AsRef<Path>, config: TilerConfig) -> Result<Self, TileError> {
        let source = MmapSource::open(path)?;
        Self::open(Arc::new(source), config).await
    }

    /// Open a TIFF or BigTIFF container with a caller-supplied decoder set.
    pub async fn open_with_dispatcher(
        source: Arc<dyn ByteSource>,
        config: TilerConfig,
        dispatcher: CodecDispatcher,
    ) -> Result<Self, TileError> {
        config.validate().map_err(TileError::InvalidConfig)?;

        let pyramid = TiffPyramid::parse(source.as_ref()).await?;
        debug!(
            source = source.identifier(),
            ifds = pyramid.ifd_count,
            levels = pyramid.level_count(),
            bigtiff = pyramid.header.is_bigtiff,
            "parsed container"
        );

        Self::from_levels(source, pyramid.levels, config, dispatcher)
    }

    /// Build a tiler from level metadata obtained elsewhere.
    ///
    /// Levels are indexed in the order given, 0 first, and must not grow in
    /// either dimension from one level to the next.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if `config` does not validate
    /// - `CorruptDirectory` for a level wider or taller than its predecessor
    /// - `CorruptDirectory` or `UnsupportedCodec` for the first level that
    ///   cannot be served
    pub fn from_levels(
        source: Arc<dyn ByteSource>,
        levels: Vec<LevelMetadata>,
        config: TilerConfig,
        dispatcher: CodecDispatcher,
    ) -> Result<Self, TileError> {
        config.validate().map_err(TileError::InvalidConfig)?;

        let cache = Arc::new(TileCache::with_limits(
            config.cache_bytes,
            config.cache_entries,
        ));
        let dispatcher = Arc::new(dispatcher);
        let container_len = source.size();

        let mut pages: Vec<TiledPage> = Vec::with_capacity(levels.len());
        for (index, mut metadata) in levels.into_iter().enumerate() {
            metadata.index = index;
            if let Some(previous) = pages.last().map(TiledPage::level) {
                if metadata.width > previous.width || metadata.height > previous.height {
                    return Err(TileError::CorruptDirectory {
                        level: index,
                        reason: format!(
                            "{}x{} is larger than level {} at {}x{}",
                            metadata.width,
                            metadata.height,
                            previous.index,
                            previous.width,
                            previous.height
                        ),
                    });
                }
            }
            let directory = TileDirectory::parse(&metadata, container_len, &dispatcher)?;
            pages.push(TiledPage::new(
                directory,
                Arc::clone(&source),
                Arc::clone(&cache),
                Arc::clone(&dispatcher),
                &config,
            ));
        }

        let tiler = Self {
            source,
            pages,
            cache,
            config,
        };

        info!(source = tiler.identifier(), levels = tiler.level_count(), "opened slide");
        for page in &tiler.pages {
            let level = page.level();
            let (cols, rows) = page.grid_size();
            debug!(
                level = level.index,
                width = level.width,
                height = level.height,
                codec = %level.codec,
                layout = ?level.layout,
                cols,
                rows,
                "level ready"
            );
        }

        Ok(tiler)
    }

    pub fn identifier(&self) -> &str {
        self.source.identifier()
    }

    pub fn config(&self) -> &TilerConfig {
        &self.config
    }

    pub fn level_count(&self) -> usize {
        self.pages.len()
    }

    /// Full-resolution dimensions, or `None` for a slide without levels.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.pages
            .first()
            .map(|page| (page.level().width, page.level().height))
    }

    pub fn page(&self, level: usize) -> Result<&TiledPage, TileError> {
        self.pages.get(level).ok_or(TileError::InvalidLevel {
            level,
            count: self.pages.len(),
        })
    }

    /// Output tile (`col`, `row`) of `level`.
    ///
    /// # Errors
    ///
    /// - `InvalidLevel` for an unknown level
    /// - `OutOfRange` for a coordinate outside the level's output grid
    /// - `DecodeError` or `Io` when a constituent native tile fails
    pub async fn get_tile(&self, level: usize, col: u32, row: u32) -> Result<DecodedTile, TileError> {
        self.page(level)?.get_tile(col, row).await
    }

    pub fn get_level_info(&self, level: usize) -> Result<LevelInfo, TileError> {
        let mut info = self.page(level)?.info();
        if let Some((base_width, _)) = self.dimensions() {
            info.downsample = base_width as f64 / info.width as f64;
        }
        Ok(info)
    }

    pub fn levels_info(&self) -> Vec<LevelInfo> {
        (0..self.pages.len())
            .filter_map(|level| self.get_level_info(level).ok())
            .collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached decoded tile.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
