//! Pixel-space rectangles.
//!
//! Coordinates are u64 so that `col * tile_width + tile_width` cannot
//! overflow for any u32 grid.

/// A position in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: u64,
    pub y: u64,
}

impl Point {
    pub const fn new(x: u64, y: u64) -> Self {
        Self { x, y }
    }
}

/// A width and height in pixels or tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u64,
    pub height: u64,
}

impl Size {
    pub const fn new(width: u64, height: u64) -> Self {
        Self { width, height }
    }

    /// How many `tile`-sized cells cover this size, counting partial cells.
    pub fn ceil_div(self, tile: Size) -> Size {
        Size {
            width: self.width.div_ceil(tile.width.max(1)),
            height: self.height.div_ceil(tile.height.max(1)),
        }
    }

    pub fn area(self) -> u64 {
        self.width * self.height
    }
}

/// Half-open rectangle `[x, x + width) × [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Region {
    pub origin: Point,
    pub size: Size,
}

impl Region {
    pub const fn new(x: u64, y: u64, width: u64, height: u64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// Footprint of grid cell `tile` in a grid of `tile_size` cells.
    pub fn from_tile(tile: Point, tile_size: Size) -> Self {
        Self {
            origin: Point::new(tile.x * tile_size.width, tile.y * tile_size.height),
            size: tile_size,
        }
    }

    /// Exclusive bottom-right corner.
    pub fn end(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width,
            self.origin.y + self.size.height,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.size.width == 0 || self.size.height == 0
    }

    /// Overlap of two regions, `None` when they do not share a pixel.
    pub fn intersection(&self, other: &Region) -> Option<Region> {
        let start_x = self.origin.x.max(other.origin.x);
        let start_y = self.origin.y.max(other.origin.y);
        let end_x = self.end().x.min(other.end().x);
        let end_y = self.end().y.min(other.end().y);

        if start_x >= end_x || start_y >= end_y {
            return None;
        }
        Some(Region::new(start_x, start_y, end_x - start_x, end_y - start_y))
    }

    /// Whether this region lies entirely within `other`.
    pub fn is_inside(&self, other: &Region) -> bool {
        self.origin.x >= other.origin.x
            && self.origin.y >= other.origin.y
            && self.end().x <= other.end().x
            && self.end().y <= other.end().y
    }

    /// Grid cells of size `tile_size` touched by this region, as an
    /// inclusive-exclusive range of cell coordinates.
    pub fn covered_tiles(&self, tile_size: Size) -> Option<(Point, Point)> {
        if self.is_empty() || tile_size.width == 0 || tile_size.height == 0 {
            return None;
        }
        let first = Point::new(
            self.origin.x / tile_size.width,
            self.origin.y / tile_size.height,
        );
        let last = Point::new(
            (self.end().x - 1) / tile_size.width + 1,
            (self.end().y - 1) / tile_size.height + 1,
        );
        Some((first, last))
    }
}
