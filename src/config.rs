//! Configuration for the tiler and the `wsi-tiler` command-line tool.
//!
//! [`TilerConfig`] is the library-facing configuration. The CLI builds one from
//! its arguments, each of which can also come from the environment:
//!
//! - `WSI_TILER_TILE_SIZE` - Output tile edge in pixels (default: native size)
//! - `WSI_TILER_CACHE_BYTES` - Decoded tile cache budget (default: 256 MiB)
//! - `WSI_TILER_CACHE_ENTRIES` - Decoded tile cache entry cap (default: 4096)
//! - `WSI_TILER_BACKGROUND` - Fill value for pixels without data (default: 255)
//! - `WSI_TILER_ON_DECODE_ERROR` - `fail` or `fill-background` (default: fail)
//! - `WSI_TILER_QUALITY` - JPEG quality for `tile` output (default: 80)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::tile::{
    is_valid_quality, DEFAULT_CACHE_BYTES, DEFAULT_CACHE_ENTRIES, DEFAULT_JPEG_QUALITY,
};

// =============================================================================
// Default Values
// =============================================================================

/// Fill value for pixels outside the image or without stored data.
pub const DEFAULT_BACKGROUND: u8 = 255;

/// Output tile edge for striped levels when no size is configured.
pub const DEFAULT_STRIPED_TILE_SIZE: u32 = 512;

/// Largest accepted output tile edge.
pub const MAX_TILE_SIZE: u32 = 16384;

// =============================================================================
// Library Configuration
// =============================================================================

/// What to do when a native tile inside an output tile fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecodeFailurePolicy {
    /// Fail the whole output tile
    #[default]
    Fail,
    /// Leave the failed region as background and log a warning
    FillBackground,
}

/// Settings applied to every level of an opened container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TilerConfig {
    /// Square output tile edge. `None` uses each level's native tile size,
    /// or [`DEFAULT_STRIPED_TILE_SIZE`] for striped levels.
    pub tile_size: Option<u32>,
    pub cache_bytes: usize,
    pub cache_entries: usize,
    pub background: u8,
    pub on_decode_error: DecodeFailurePolicy,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            tile_size: None,
            cache_bytes: DEFAULT_CACHE_BYTES,
            cache_entries: DEFAULT_CACHE_ENTRIES,
            background: DEFAULT_BACKGROUND,
            on_decode_error: DecodeFailurePolicy::default(),
        }
    }
}

impl TilerConfig {
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = Some(tile_size);
        self
    }

    pub fn with_cache_limits(mut self, cache_bytes: usize, cache_entries: usize) -> Self {
        self.cache_bytes = cache_bytes;
        self.cache_entries = cache_entries;
        self
    }

    pub fn with_background(mut self, background: u8) -> Self {
        self.background = background;
        self
    }

    pub fn with_decode_failure_policy(mut self, policy: DecodeFailurePolicy) -> Self {
        self.on_decode_error = policy;
        self
    }

    /// Validate the configuration.
    ///
    /// Returns an error message if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(size) = self.tile_size {
            if size == 0 {
                return Err("tile_size must be greater than 0".to_string());
            }
            if size > MAX_TILE_SIZE {
                return Err(format!(
                    "tile_size must be at most {MAX_TILE_SIZE}, got {size}"
                ));
            }
        }

        if self.cache_bytes == 0 {
            return Err("cache_bytes must be greater than 0".to_string());
        }

        if self.cache_entries == 0 {
            return Err("cache_entries must be greater than 0".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// CLI
// =============================================================================

/// wsi-tiler - Fixed-size tiles from pyramidal TIFF slides.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the levels of a slide as JSON
    Info(InfoConfig),

    /// Decode one output tile and write it as JPEG
    Tile(TileConfig),

    /// Decode every tile of a level and report failures
    Check(CheckConfig),
}

/// Tiling options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct TilerArgs {
    /// Output tile edge in pixels. Defaults to each level's native tile size.
    #[arg(long, env = "WSI_TILER_TILE_SIZE")]
    pub tile_size: Option<u32>,

    /// Decoded tile cache budget in bytes.
    #[arg(long, default_value_t = DEFAULT_CACHE_BYTES, env = "WSI_TILER_CACHE_BYTES")]
    pub cache_bytes: usize,

    /// Maximum number of decoded tiles to cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_ENTRIES, env = "WSI_TILER_CACHE_ENTRIES")]
    pub cache_entries: usize,

    /// Sample value for pixels without image data.
    #[arg(long, default_value_t = DEFAULT_BACKGROUND, env = "WSI_TILER_BACKGROUND")]
    pub background: u8,

    /// Behavior when a native tile fails to decode.
    #[arg(
        long,
        value_enum,
        default_value_t = DecodeFailurePolicy::Fail,
        env = "WSI_TILER_ON_DECODE_ERROR"
    )]
    pub on_decode_error: DecodeFailurePolicy,

    /// Enable debug logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl TilerArgs {
    pub fn to_config(&self) -> TilerConfig {
        TilerConfig {
            tile_size: self.tile_size,
            cache_bytes: self.cache_bytes,
            cache_entries: self.cache_entries,
            background: self.background,
            on_decode_error: self.on_decode_error,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Path to the slide file.
    pub file: PathBuf,

    #[command(flatten)]
    pub tiler: TilerArgs,
}

#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    /// Path to the slide file.
    pub file: PathBuf,

    /// Pyramid level (0 = highest resolution).
    #[arg(long, default_value_t = 0)]
    pub level: usize,

    /// Output tile column.
    #[arg(long)]
    pub col: u32,

    /// Output tile row.
    #[arg(long)]
    pub row: u32,

    /// Where to write the JPEG.
    #[arg(short, long)]
    pub output: PathBuf,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_TILER_QUALITY")]
    pub quality: u8,

    #[command(flatten)]
    pub tiler: TilerArgs,
}

impl TileConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_quality(self.quality) {
            return Err(format!(
                "quality must be between 1 and 100, got {}",
                self.quality
            ));
        }
        self.tiler.to_config().validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Path to the slide file.
    pub file: PathBuf,

    /// Level to check. Checks every level when omitted.
    #[arg(long)]
    pub level: Option<usize>,

    #[command(flatten)]
    pub tiler: TilerArgs,
}
