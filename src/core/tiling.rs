use crate::core::projection::Point;
use crate::core::rectangle::Rectangle;
use serde::{Deserialize, Serialize};

/// Address of one cell of the quadtree.
///
/// `y` counts rows from the south edge of the tiling scheme, the way the
/// scheme lays tiles out. Use [`QuadtreeTileID::reverse_y`] for north-origin
/// (WMTS / slippy map) row numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuadtreeTileID {
    pub level: u32,
    pub x: u32,
    pub y: u32,
}

impl QuadtreeTileID {
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    /// Gets the parent tile one level up, `None` at level zero
    pub fn parent(&self) -> Option<QuadtreeTileID> {
        if self.level == 0 {
            None
        } else {
            Some(QuadtreeTileID::new(self.level - 1, self.x >> 1, self.y >> 1))
        }
    }

    /// The four tiles one level down, south-west first, or `None` when the
    /// child addresses do not fit in a `u32`
    pub fn children(&self) -> Option<[QuadtreeTileID; 4]> {
        let level = self.level.checked_add(1)?;
        let (x, y) = (self.x.checked_mul(2)?, self.y.checked_mul(2)?);
        Some([
            QuadtreeTileID::new(level, x, y),
            QuadtreeTileID::new(level, x + 1, y),
            QuadtreeTileID::new(level, x, y + 1),
            QuadtreeTileID::new(level, x + 1, y + 1),
        ])
    }

    /// Row counted from the north edge: `2^level - 1 - y`
    pub fn reverse_y(&self) -> u32 {
        let rows = 1u64 << self.level.min(63);
        (rows - 1).saturating_sub(u64::from(self.y)) as u32
    }
}

/// A quadtree laid over a projected rectangle with `root_tiles_x` by
/// `root_tiles_y` tiles at level zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadtreeTilingScheme {
    rectangle: Rectangle,
    root_tiles_x: u32,
    root_tiles_y: u32,
}

impl QuadtreeTilingScheme {
    pub fn new(rectangle: Rectangle, root_tiles_x: u32, root_tiles_y: u32) -> Self {
        Self {
            rectangle,
            root_tiles_x: root_tiles_x.max(1),
            root_tiles_y: root_tiles_y.max(1),
        }
    }

    pub fn rectangle(&self) -> &Rectangle {
        &self.rectangle
    }

    pub fn root_tiles_x(&self) -> u32 {
        self.root_tiles_x
    }

    pub fn root_tiles_y(&self) -> u32 {
        self.root_tiles_y
    }

    /// Tile columns at `level`, `None` once the count overflows a `u64`
    pub fn number_of_x_tiles_at_level(&self, level: u32) -> Option<u64> {
        tiles_at_level(self.root_tiles_x, level)
    }

    /// Tile rows at `level`, `None` once the count overflows a `u64`
    pub fn number_of_y_tiles_at_level(&self, level: u32) -> Option<u64> {
        tiles_at_level(self.root_tiles_y, level)
    }

    /// Projected rectangle covered by `tile`
    pub fn tile_to_rectangle(&self, tile: QuadtreeTileID) -> Rectangle {
        let split = f64::from(tile.level).exp2();
        let tile_width = self.rectangle.width() / (f64::from(self.root_tiles_x) * split);
        let tile_height = self.rectangle.height() / (f64::from(self.root_tiles_y) * split);

        let min_x = self.rectangle.min_x + f64::from(tile.x) * tile_width;
        let min_y = self.rectangle.min_y + f64::from(tile.y) * tile_height;
        Rectangle::new(min_x, min_y, min_x + tile_width, min_y + tile_height)
    }

    /// Tile at `level` containing `position`, or `None` when the position lies
    /// outside the scheme. Positions on the far edges map to the last tile.
    pub fn position_to_tile(&self, position: Point, level: u32) -> Option<QuadtreeTileID> {
        if !self.rectangle.contains(&position) {
            return None;
        }

        let x_tiles = self.number_of_x_tiles_at_level(level)?;
        let y_tiles = self.number_of_y_tiles_at_level(level)?;
        let tile_width = self.rectangle.width() / x_tiles as f64;
        let tile_height = self.rectangle.height() / y_tiles as f64;

        let to_index = |distance: f64, size: f64, count: u64| -> u32 {
            if size <= 0.0 {
                return 0;
            }
            let index = (distance / size).floor().max(0.0) as u64;
            index.min(count - 1) as u32
        };

        Some(QuadtreeTileID::new(
            level,
            to_index(position.x - self.rectangle.min_x, tile_width, x_tiles),
            to_index(position.y - self.rectangle.min_y, tile_height, y_tiles),
        ))
    }
}

fn tiles_at_level(root_tiles: u32, level: u32) -> Option<u64> {
    1u64.checked_shl(level)?.checked_mul(u64::from(root_tiles))
}
