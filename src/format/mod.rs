//! Container and codec stream formats.
//!
//! - [`tiff`]: TIFF/BigTIFF structure and pyramid level discovery
//! - [`jpeg`]: reassembly of abbreviated JPEG tile streams

pub mod jpeg;
pub mod tiff;

pub use jpeg::{
    has_tables, insert_adobe_rgb_marker, is_abbreviated_stream, merge_jpeg_tables,
    prepare_tile_jpeg,
};
