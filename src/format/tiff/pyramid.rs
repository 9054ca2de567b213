//! Pyramid level discovery.
//!
//! A slide file holds the resolution levels alongside label, macro and
//! thumbnail images. Levels are the IFDs that carry tiled or striped image
//! data and shrink consistently from the largest one while keeping its
//! aspect ratio; everything else is ignored.
//!
//! Striped IFDs (one strip per `RowsPerStrip` rows) are exposed as levels
//! whose native tile spans the full image width. Thumbnails are striped
//! too, so a striped IFD only counts as a level when it does not sit inside
//! a run of tiled IFDs and its downsample is close to a power of two.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::TiffError;
use crate::io::ByteSource;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{Compression, TiffTag};
use super::values::ValueReader;

/// Safety limit on the IFD chain
const MAX_IFDS: usize = 100;

/// Relative aspect ratio drift tolerated between a level and the base
const ASPECT_TOLERANCE: f64 = 0.05;

// =============================================================================
// Level metadata
// =============================================================================

/// How a level's image data is cut into stored units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TileLayout {
    Tiled,
    Striped,
}

/// Location of one stored unit within a level.
///
/// Length zero marks a unit that was never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLocation {
    pub col: u32,
    pub row: u32,
    pub offset: u64,
    pub length: u64,
}

/// Everything the tiling engine needs to know about one level.
///
/// Produced by [`TiffPyramid::parse`], or assembled directly by callers that
/// read their container some other way.
#[derive(Debug, Clone)]
pub struct LevelMetadata {
    /// 0 = highest resolution
    pub index: usize,
    /// Position of the source IFD in the file's chain
    pub ifd_index: usize,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub layout: TileLayout,
    pub compression: Compression,
    pub photometric: Option<u16>,
    pub samples_per_pixel: u16,
    pub bits_per_sample: u16,
    /// 1 = chunky, 2 = planar
    pub planar_configuration: u16,
    pub byte_order: ByteOrder,
    /// Raw JPEGTables payload
    pub jpeg_tables: Option<Bytes>,
    /// Stored units in file order
    pub tiles: Vec<TileLocation>,
}

impl LevelMetadata {
    /// Metadata for an 8-bit RGB tiled level with no stored tiles yet.
    pub fn new(
        index: usize,
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
        compression: Compression,
    ) -> Self {
        Self {
            index,
            ifd_index: index,
            width,
            height,
            tile_width,
            tile_height,
            layout: TileLayout::Tiled,
            compression,
            photometric: None,
            samples_per_pixel: 3,
            bits_per_sample: 8,
            planar_configuration: 1,
            byte_order: ByteOrder::LittleEndian,
            jpeg_tables: None,
            tiles: Vec::new(),
        }
    }

    pub fn with_tiles(mut self, tiles: Vec<TileLocation>) -> Self {
        self.tiles = tiles;
        self
    }

    /// Columns in the native grid.
    pub fn tiles_across(&self) -> u32 {
        self.width.div_ceil(self.tile_width.max(1))
    }

    /// Rows in the native grid.
    pub fn tiles_down(&self) -> u32 {
        self.height.div_ceil(self.tile_height.max(1))
    }
}

// =============================================================================
// Candidate IFDs
// =============================================================================

/// An IFD that carries image data, before levels are chosen.
#[derive(Debug, Clone)]
struct Candidate {
    ifd_index: usize,
    ifd: Ifd,
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    layout: TileLayout,
    offsets_entry: IfdEntry,
    counts_entry: IfdEntry,
}

impl Candidate {
    /// `None` when the IFD has no usable image data layout.
    fn from_ifd(ifd: Ifd, ifd_index: usize, rows_per_strip: Option<u64>, order: ByteOrder) -> Option<Self> {
        let width = ifd.image_width(order)?;
        let height = ifd.image_height(order)?;
        if width == 0 || height == 0 {
            return None;
        }

        let (layout, tile_width, tile_height, offsets_tag, counts_tag) = if ifd.is_tiled() {
            (
                TileLayout::Tiled,
                ifd.tile_width(order)?,
                ifd.tile_height(order)?,
                TiffTag::TileOffsets,
                TiffTag::TileByteCounts,
            )
        } else {
            let rows = rows_per_strip
                .map(|r| r.min(height as u64) as u32)
                .unwrap_or(height);
            (
                TileLayout::Striped,
                width,
                rows,
                TiffTag::StripOffsets,
                TiffTag::StripByteCounts,
            )
        };

        let offsets_entry = ifd.get_entry_by_tag(offsets_tag)?.clone();
        let counts_entry = ifd.get_entry_by_tag(counts_tag)?.clone();

        Some(Candidate {
            ifd_index,
            ifd,
            width,
            height,
            tile_width,
            tile_height,
            layout,
            offsets_entry,
            counts_entry,
        })
    }

    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Check if a downsample factor from the base is close to a power of two.
fn is_valid_downsample(downsample: f64) -> bool {
    let rounded = downsample.log2().round();
    if rounded < 1.0 {
        return false;
    }
    let ratio = downsample / 2.0_f64.powf(rounded);
    ratio > 0.8 && ratio < 1.2
}

/// Largest image first, then every image that is no larger than its
/// predecessor and keeps the base aspect ratio.
fn select_levels(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    let tiled_ifds = candidates
        .iter()
        .filter(|c| c.layout == TileLayout::Tiled)
        .map(|c| c.ifd_index);
    let tiled_span = tiled_ifds.clone().min().zip(tiled_ifds.max());

    candidates.sort_by_key(|c| std::cmp::Reverse(c.area()));

    let mut levels: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let Some(base) = levels.first() else {
            levels.push(candidate);
            continue;
        };
        let previous = &levels[levels.len() - 1];

        if candidate.layout == TileLayout::Striped {
            let inside_tiled_run = tiled_span.is_some_and(|(first, last)| {
                first < candidate.ifd_index && candidate.ifd_index < last
            });
            let downsample = base.width as f64 / candidate.width as f64;
            if inside_tiled_run || !is_valid_downsample(downsample) {
                debug!(
                    ifd = candidate.ifd_index,
                    width = candidate.width,
                    height = candidate.height,
                    "skipping striped IFD that is not a pyramid level"
                );
                continue;
            }
        }

        if candidate.width > previous.width || candidate.height > previous.height {
            debug!(ifd = candidate.ifd_index, "skipping IFD larger than previous level");
            continue;
        }

        let expected_height = candidate.width as f64 * base.height as f64 / base.width as f64;
        let drift = (candidate.height as f64 - expected_height).abs();
        if drift > (expected_height * ASPECT_TOLERANCE).max(1.0) {
            debug!(
                ifd = candidate.ifd_index,
                width = candidate.width,
                height = candidate.height,
                "skipping IFD with foreign aspect ratio"
            );
            continue;
        }

        levels.push(candidate);
    }
    levels
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// The resolution levels of a TIFF container.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    /// Sorted by resolution, 0 = highest
    pub levels: Vec<LevelMetadata>,
    /// Number of IFDs in the file
    pub ifd_count: usize,
}

impl TiffPyramid {
    /// Parse the header, walk the IFD chain and load the tile layout of every
    /// pyramid level.
    pub async fn parse<S: ByteSource + ?Sized>(source: &S) -> Result<Self, TiffError> {
        let size = source.size();
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let header_bytes = source.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, size)?;

        let ifds = read_ifd_chain(source, &header).await?;
        let ifd_count = ifds.len();
        let reader = ValueReader::new(source, &header);
        let order = header.byte_order;

        let mut candidates = Vec::new();
        for (ifd_index, ifd) in ifds.into_iter().enumerate() {
            let rows_per_strip = match ifd.get_entry_by_tag(TiffTag::RowsPerStrip) {
                Some(entry) => Some(reader.read_u64(entry).await?),
                None => None,
            };
            match Candidate::from_ifd(ifd, ifd_index, rows_per_strip, order) {
                Some(candidate) => candidates.push(candidate),
                None => debug!(ifd = ifd_index, "IFD has no image data layout"),
            }
        }

        let mut levels = Vec::new();
        for (index, candidate) in select_levels(candidates).into_iter().enumerate() {
            levels.push(load_level(&reader, &header, index, candidate).await?);
        }

        if levels.is_empty() {
            warn!(source = source.identifier(), "no pyramid levels found");
        }

        Ok(TiffPyramid {
            header,
            levels,
            ifd_count,
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, index: usize) -> Option<&LevelMetadata> {
        self.levels.get(index)
    }
}

async fn read_ifd_chain<S: ByteSource + ?Sized>(
    source: &S,
    header: &TiffHeader,
) -> Result<Vec<Ifd>, TiffError> {
    let mut ifds = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = header.first_ifd_offset;

    while offset != 0 && ifds.len() < MAX_IFDS {
        if offset >= source.size() {
            return Err(TiffError::InvalidIfdOffset(offset));
        }
        if !seen.insert(offset) {
            warn!(offset, "IFD chain loops back on itself");
            break;
        }

        let count_bytes = source.read_exact_at(offset, header.ifd_count_size()).await?;
        let entry_count = Ifd::entry_count(&count_bytes, header)?;
        let ifd_size = Ifd::calculate_size(entry_count, header);
        if offset.saturating_add(ifd_size) > source.size() {
            return Err(TiffError::FileTooSmall {
                required: offset.saturating_add(ifd_size),
                actual: source.size(),
            });
        }

        let ifd_bytes = source.read_exact_at(offset, ifd_size as usize).await?;
        let ifd = Ifd::parse(&ifd_bytes, offset, header)?;
        offset = ifd.next_ifd_offset;
        ifds.push(ifd);
    }

    Ok(ifds)
}

async fn load_level<S: ByteSource + ?Sized>(
    reader: &ValueReader<'_, S>,
    header: &TiffHeader,
    index: usize,
    candidate: Candidate,
) -> Result<LevelMetadata, TiffError> {
    let order = header.byte_order;
    let ifd = &candidate.ifd;

    let offsets = reader.read_u64_array(&candidate.offsets_entry).await?;
    let lengths = reader.read_u64_array(&candidate.counts_entry).await?;
    if offsets.len() != lengths.len() {
        return Err(TiffError::InvalidTagValue {
            tag: TiffTag::TileByteCounts.name(),
            message: format!(
                "{} offsets but {} byte counts on IFD {}",
                offsets.len(),
                lengths.len(),
                candidate.ifd_index
            ),
        });
    }

    let jpeg_tables = match ifd.get_entry_by_tag(TiffTag::JpegTables) {
        Some(entry) => Some(reader.read_raw_bytes(entry).await?),
        None => None,
    };

    let bits_per_sample = match ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
        Some(entry) => reader.read_u64_array(entry).await?.first().copied().unwrap_or(8) as u16,
        None => 8,
    };

    let scalar_u16 = |tag: TiffTag| {
        ifd.get_entry_by_tag(tag)
            .and_then(|e| e.first_inline_u16(order))
    };

    let columns = candidate.width.div_ceil(candidate.tile_width.max(1)).max(1);
    let tiles = offsets
        .iter()
        .zip(&lengths)
        .enumerate()
        .map(|(i, (&offset, &length))| TileLocation {
            col: (i as u64 % columns as u64) as u32,
            row: (i as u64 / columns as u64) as u32,
            offset,
            length,
        })
        .collect();

    let compression = Compression::from_u16(scalar_u16(TiffTag::Compression).unwrap_or(1));

    debug!(
        level = index,
        ifd = candidate.ifd_index,
        width = candidate.width,
        height = candidate.height,
        tile_width = candidate.tile_width,
        tile_height = candidate.tile_height,
        compression = %compression.name(),
        "loaded pyramid level"
    );

    Ok(LevelMetadata {
        index,
        ifd_index: candidate.ifd_index,
        width: candidate.width,
        height: candidate.height,
        tile_width: candidate.tile_width,
        tile_height: candidate.tile_height,
        layout: candidate.layout,
        compression,
        photometric: scalar_u16(TiffTag::PhotometricInterpretation),
        samples_per_pixel: scalar_u16(TiffTag::SamplesPerPixel).unwrap_or(1),
        bits_per_sample,
        planar_configuration: scalar_u16(TiffTag::PlanarConfiguration).unwrap_or(1),
        byte_order: order,
        jpeg_tables,
        tiles,
    })
}
