//! Container parsing tests.
//!
//! Covers pyramid discovery, byte orders, BigTIFF, and the structural errors
//! raised while a slide is opened.

use std::io::Write;

use wsi_tiler::{
    CodecId, Compression, TiffError, TiffPyramid, TileError, TileLayout, Tiler, TilerConfig,
};

use super::test_utils::{gray_tiles, memory_source, IfdSpec, TiffBuilder};

const RAW: u16 = 1;
const LZW: u16 = 5;

fn raw_level(width: u32, height: u32, tile: u32, value: u8) -> IfdSpec {
    let cols = width.div_ceil(tile);
    let rows = height.div_ceil(tile);
    IfdSpec::tiled(width, height, tile, tile, RAW)
        .with_tiles(gray_tiles(cols, rows, tile, tile, |_, _| value))
}

fn pyramid_with_label() -> Vec<u8> {
    let label = IfdSpec::striped(300, 300, 300, RAW).with_tiles(vec![Some(vec![7; 300 * 300])]);
    TiffBuilder::new()
        .add_ifd(raw_level(1024, 512, 256, 1))
        .add_ifd(label)
        .add_ifd(raw_level(512, 256, 256, 2))
        .add_ifd(raw_level(256, 128, 128, 3))
        .build()
}

// =============================================================================
// Pyramid discovery
// =============================================================================

#[tokio::test]
async fn test_pyramid_skips_foreign_images() {
    let source = memory_source(pyramid_with_label(), "pyramid.tif");
    let pyramid = TiffPyramid::parse(source.as_ref()).await.unwrap();

    assert_eq!(pyramid.ifd_count, 4);
    assert_eq!(pyramid.level_count(), 3);

    let dims: Vec<_> = pyramid.levels.iter().map(|l| (l.width, l.height)).collect();
    assert_eq!(dims, vec![(1024, 512), (512, 256), (256, 128)]);

    let ifds: Vec<_> = pyramid.levels.iter().map(|l| l.ifd_index).collect();
    assert_eq!(ifds, vec![0, 2, 3]);

    let base = pyramid.get_level(0).unwrap();
    assert_eq!(base.layout, TileLayout::Tiled);
    assert_eq!(base.compression, Compression::None);
    assert_eq!(base.tiles.len(), 8);
    assert_eq!((base.tiles[5].col, base.tiles[5].row), (1, 1));
}

#[tokio::test]
async fn test_level_info_across_pyramid() {
    let tiler = Tiler::open(
        memory_source(pyramid_with_label(), "pyramid.tif"),
        TilerConfig::default(),
    )
    .await
    .unwrap();

    let infos = tiler.levels_info();
    assert_eq!(infos.len(), 3);
    assert_eq!(infos[1].downsample, 2.0);
    assert_eq!(infos[2].downsample, 4.0);
    assert_eq!((infos[2].tile_width, infos[2].tiles_x), (128, 2));

    let json = serde_json::to_value(&infos).unwrap();
    assert_eq!(json[0]["codec"], "raw");
    assert_eq!(json[0]["compression"], 1);
    assert_eq!(json[2]["tiles_y"], 1);

    let tile = tiler.get_tile(2, 1, 0).await.unwrap();
    assert!(tile.data.iter().all(|&v| v == 3));
}

#[tokio::test]
async fn test_striped_thumbnails_are_not_levels() {
    // Aperio-style layout: base, striped thumbnail, lower level, then a
    // striped image at a 5.12x downsample. Both keep the base aspect ratio.
    let strips = |width: u32, height: u32, rows: u32| -> Vec<Option<Vec<u8>>> {
        (0..height.div_ceil(rows))
            .map(|_| Some(vec![5; (width * rows) as usize]))
            .collect()
    };
    let data = TiffBuilder::new()
        .add_ifd(raw_level(1024, 512, 256, 1))
        .add_ifd(IfdSpec::striped(128, 64, 16, RAW).with_tiles(strips(128, 64, 16)))
        .add_ifd(raw_level(256, 128, 128, 2))
        .add_ifd(IfdSpec::striped(200, 100, 20, RAW).with_tiles(strips(200, 100, 20)))
        .build();
    let source = memory_source(data, "thumbnails.tif");

    let pyramid = TiffPyramid::parse(source.as_ref()).await.unwrap();
    assert_eq!(pyramid.ifd_count, 4);
    let ifds: Vec<_> = pyramid.levels.iter().map(|l| l.ifd_index).collect();
    assert_eq!(ifds, vec![0, 2]);

    let tiler = Tiler::open(source, TilerConfig::default()).await.unwrap();
    assert_eq!(tiler.level_count(), 2);
    let downsamples: Vec<_> = tiler.levels_info().iter().map(|i| i.downsample).collect();
    assert_eq!(downsamples, vec![1.0, 4.0]);
}

#[tokio::test]
async fn test_bigtiff_big_endian() {
    let data = TiffBuilder::new()
        .bigtiff()
        .big_endian()
        .add_ifd(raw_level(100, 100, 64, 9))
        .build();
    let source = memory_source(data, "big.tif");

    let pyramid = TiffPyramid::parse(source.as_ref()).await.unwrap();
    assert!(pyramid.header.is_bigtiff);
    assert_eq!(pyramid.levels[0].tiles.len(), 4);

    let tiler = Tiler::open(source, TilerConfig::default()).await.unwrap();
    let tile = tiler.get_tile(0, 1, 1).await.unwrap();
    assert_eq!(tile.pixel(35, 35), &[9]);
    assert_eq!(tile.pixel(36, 0), &[255]);
}

#[tokio::test]
async fn test_ifd_loop_terminates() {
    let data = TiffBuilder::new()
        .add_ifd(raw_level(64, 64, 64, 1))
        .with_ifd_loop()
        .build();
    let source = memory_source(data, "loop.tif");

    let pyramid = TiffPyramid::parse(source.as_ref()).await.unwrap();
    assert_eq!(pyramid.ifd_count, 1);
    assert_eq!(pyramid.level_count(), 1);
}

// =============================================================================
// Structural errors
// =============================================================================

#[tokio::test]
async fn test_not_a_tiff() {
    let source = memory_source(b"this is not a tiff file".to_vec(), "junk");
    let result = Tiler::open(source, TilerConfig::default()).await;
    assert!(matches!(
        result,
        Err(TileError::Tiff(TiffError::InvalidMagic(_)))
    ));
}

#[tokio::test]
async fn test_tile_past_end_is_corrupt_directory() {
    let data = TiffBuilder::new()
        .add_ifd(IfdSpec::tiled(64, 64, 64, 64, RAW).with_locations(vec![(1_000_000, 4096)]))
        .build();
    let result = Tiler::open(memory_source(data, "corrupt.tif"), TilerConfig::default()).await;
    assert!(matches!(
        result,
        Err(TileError::CorruptDirectory { level: 0, .. })
    ));
}

#[tokio::test]
async fn test_unsupported_compression() {
    let data = TiffBuilder::new()
        .add_ifd(IfdSpec::tiled(64, 64, 64, 64, LZW).with_tiles(vec![Some(vec![0; 64])]))
        .build();
    let result = Tiler::open(memory_source(data, "lzw.tif"), TilerConfig::default()).await;
    match result {
        Err(TileError::UnsupportedCodec { level, compression }) => {
            assert_eq!(level, 0);
            assert!(compression.contains("LZW"), "{compression}");
        }
        Err(other) => panic!("expected UnsupportedCodec, got {other}"),
        Ok(_) => panic!("expected UnsupportedCodec"),
    }
}

#[tokio::test]
async fn test_planar_samples_unsupported() {
    let data = TiffBuilder::new()
        .add_ifd(
            IfdSpec::tiled(16, 16, 16, 16, RAW)
                .with_samples(3, 8)
                .with_planar_configuration(2)
                .with_tiles(vec![Some(vec![0; 16 * 16 * 3])]),
        )
        .build();
    let result = Tiler::open(memory_source(data, "planar.tif"), TilerConfig::default()).await;
    assert!(matches!(result, Err(TileError::UnsupportedCodec { .. })));
}

#[tokio::test]
async fn test_invalid_config_rejected_before_parsing() {
    let result = Tiler::open(
        memory_source(pyramid_with_label(), "pyramid.tif"),
        TilerConfig::default().with_cache_limits(0, 0),
    )
    .await;
    assert!(matches!(result, Err(TileError::InvalidConfig(_))));
}

// =============================================================================
// Files
// =============================================================================

#[tokio::test]
async fn test_open_memory_mapped_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&pyramid_with_label()).unwrap();
    file.flush().unwrap();

    let tiler = Tiler::open_path(file.path(), TilerConfig::default())
        .await
        .unwrap();
    assert_eq!(tiler.level_count(), 3);
    assert_eq!(tiler.get_level_info(0).unwrap().codec, CodecId::Raw);

    let tile = tiler.get_tile(1, 0, 0).await.unwrap();
    assert!(tile.data.iter().all(|&v| v == 2));
}

#[tokio::test]
async fn test_missing_file() {
    let result = Tiler::open_path("/nonexistent/slide.tif", TilerConfig::default()).await;
    assert!(matches!(result, Err(TileError::Io(_))));
}
