//! Assembling output tiles from native tiles.
//!
//! An output tile is a fixed-size window onto a level. It may coincide
//! with one native tile, straddle several, or hang past the image edge.
//! The stitcher starts from a background-filled buffer, decodes every
//! stored native tile that overlaps the part of the window inside the
//! image, and copies each overlap into place using exact rectangle
//! intersection. Pixels outside the image, in sparse cells, or beyond what
//! a native tile actually decoded to stay background.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::DecodeFailurePolicy;
use crate::error::TileError;
use crate::io::ByteSource;

use super::buffer::{DecodedTile, PixelFormat};
use super::cache::{TileCache, TileKey};
use super::codec::{CodecDispatcher, TileContext};
use super::directory::{NativeTile, TileDirectory};
use super::geometry::{Point, Region, Size};

/// Why a decoder's output cannot be placed, if it cannot.
fn malformed(tile: &DecodedTile, format: PixelFormat) -> Option<String> {
    if tile.format != format {
        return Some(format!(
            "decoder produced {:?}, level stores {:?}",
            tile.format, format
        ));
    }
    if tile.data.len() != tile.expected_len() {
        return Some(format!(
            "decoder produced {} bytes for a {}x{} tile, expected {}",
            tile.data.len(),
            tile.width,
            tile.height,
            tile.expected_len()
        ));
    }
    None
}

/// Produces output tiles for one level.
///
/// Cloning is cheap; clones share the source, directory, cache and
/// decoders.
#[derive(Clone)]
pub struct TileStitcher {
    source: Arc<dyn ByteSource>,
    directory: Arc<TileDirectory>,
    cache: Arc<TileCache>,
    dispatcher: Arc<CodecDispatcher>,
    tile_width: u32,
    tile_height: u32,
    background: u8,
    policy: DecodeFailurePolicy,
}

impl TileStitcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn ByteSource>,
        directory: Arc<TileDirectory>,
        cache: Arc<TileCache>,
        dispatcher: Arc<CodecDispatcher>,
        tile_width: u32,
        tile_height: u32,
        background: u8,
        policy: DecodeFailurePolicy,
    ) -> Self {
        Self {
            source,
            directory,
            cache,
            dispatcher,
            tile_width,
            tile_height,
            background,
            policy,
        }
    }

    /// Output tile size as (width, height).
    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    /// Assemble output tile (`out_col`, `out_row`).
    ///
    /// The result is always `tile_width × tile_height`. Callers check the
    /// coordinate against the grid; windows entirely outside the image come
    /// back as background.
    pub async fn get_output_tile(
        &self,
        out_col: u32,
        out_row: u32,
    ) -> Result<DecodedTile, TileError> {
        let level = self.directory.level();
        let mut output = DecodedTile::filled(
            self.tile_width,
            self.tile_height,
            level.format,
            self.background,
        );

        let window = Region::from_tile(
            Point::new(out_col as u64, out_row as u64),
            Size::new(self.tile_width as u64, self.tile_height as u64),
        );
        let Some(visible) = window.intersection(&level.image_region()) else {
            return Ok(output);
        };
        let Some((first, last)) = visible.covered_tiles(level.native_tile_size()) else {
            return Ok(output);
        };

        let mut pending = JoinSet::new();
        for row in first.y..last.y {
            for col in first.x..last.x {
                // Sparse cells contribute background only
                let Some(native) = self.directory.lookup(col as u32, row as u32) else {
                    continue;
                };
                let this = self.clone();
                pending.spawn(async move {
                    let result = this.load_native(native).await;
                    (native, result)
                });
            }
        }

        // Every constituent runs to completion before the policy applies.
        let mut decoded = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok((native, Ok(tile))) => decoded.push((native, tile)),
                Ok((native, Err(err))) => failures.push((native.row, native.col, err)),
                Err(join_err) => failures.push((
                    u32::MAX,
                    u32::MAX,
                    TileError::DecodeError {
                        codec: level.codec,
                        level: level.index,
                        col: out_col,
                        row: out_row,
                        cause: format!("stitch task failed: {join_err}"),
                    },
                )),
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|(row, col, _)| (*row, *col));
            match self.policy {
                DecodeFailurePolicy::Fail => {
                    let (_, _, err) = failures.swap_remove(0);
                    return Err(err);
                }
                DecodeFailurePolicy::FillBackground => {
                    for (_, _, err) in &failures {
                        warn!(
                            level = level.index,
                            out_col,
                            out_row,
                            error = %err,
                            "filling undecodable native tile with background"
                        );
                    }
                }
            }
        }

        for (native, tile) in &decoded {
            self.place(&mut output, window, visible, native, tile);
        }

        Ok(output)
    }

    /// Copy the part of `tile` that falls inside `visible` into `output`.
    fn place(
        &self,
        output: &mut DecodedTile,
        window: Region,
        visible: Region,
        native: &NativeTile,
        tile: &DecodedTile,
    ) {
        // The declared footprint, the image and the decoded extent may all
        // disagree at the edges; only their common part is real data.
        let declared = self.directory.level().native_region(native.col, native.row);
        let decoded = Region {
            origin: declared.origin,
            size: Size::new(
                (tile.width as u64).min(declared.size.width),
                (tile.height as u64).min(declared.size.height),
            ),
        };
        let Some(overlap) = decoded.intersection(&visible) else {
            return;
        };

        output.copy_region(
            tile,
            (overlap.origin.x - declared.origin.x) as u32,
            (overlap.origin.y - declared.origin.y) as u32,
            (overlap.origin.x - window.origin.x) as u32,
            (overlap.origin.y - window.origin.y) as u32,
            overlap.size.width as u32,
            overlap.size.height as u32,
        );
    }

    /// Decoded native tile, from the cache or from the source.
    async fn load_native(&self, native: NativeTile) -> Result<DecodedTile, TileError> {
        let level = self.directory.level();
        let key = TileKey::new(level.index, native.col, native.row);

        self.cache
            .get_or_compute(key, || async {
                let data = self
                    .source
                    .read_exact_at(native.offset, native.length as usize)
                    .await?;

                let ctx = TileContext {
                    level: level.index,
                    col: native.col,
                    row: native.row,
                    width: level.tile_width,
                    height: level.tile_height,
                    format: level.format,
                };
                let codec = level.codec;
                let side_table = Arc::clone(&level.side_table);
                let dispatcher = Arc::clone(&self.dispatcher);

                debug!(
                    %codec,
                    level = level.index,
                    col = native.col,
                    row = native.row,
                    bytes = data.len(),
                    "decoding native tile"
                );

                let tile = tokio::task::spawn_blocking(move || {
                    dispatcher.decode(codec, &data, &side_table, &ctx)
                })
                .await
                .map_err(|e| ctx.decode_error(codec, format!("decode task failed: {e}")))??;

                // Output of caller-registered decoders is checked before caching
                match malformed(&tile, ctx.format) {
                    Some(cause) => Err(ctx.decode_error(codec, cause)),
                    None => Ok(tile),
                }
            })
            .await
    }
}
