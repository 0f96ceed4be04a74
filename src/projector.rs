//! Tile-pixel to longitude/latitude conversion
//!
//! Decoded geometry lives in a tile-local integer grid (4096 units by
//! default, row 0 at the north edge). The projector turns that back into
//! geographic coordinates using the per-level tile matrices published by the
//! tile service.

use crate::core::constants::{TILE_EXTENT, WMTS_PIXEL_SIZE_METERS};
use crate::core::projection::{LatLng, Point, Projection, EARTH_RADIUS};
use crate::mvt::model::{FeatureType, VectorGeometry, VectorModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Geographic extent of one tile, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoxExtent {
    pub lower_lon: f64,
    pub lower_lat: f64,
    pub upper_lon: f64,
    pub upper_lat: f64,
}

impl BoxExtent {
    pub fn new(lower_lon: f64, lower_lat: f64, upper_lon: f64, upper_lat: f64) -> Self {
        Self {
            lower_lon,
            lower_lat,
            upper_lon,
            upper_lat,
        }
    }

    pub fn width(&self) -> f64 {
        self.upper_lon - self.lower_lon
    }

    pub fn height(&self) -> f64 {
        self.upper_lat - self.lower_lat
    }

    pub fn contains(&self, position: &LatLng) -> bool {
        position.lng >= self.lower_lon
            && position.lng <= self.upper_lon
            && position.lat >= self.lower_lat
            && position.lat <= self.upper_lat
    }
}

/// One level of a WMTS tile matrix set, as read from a capabilities document.
/// The top-left corner is in the matrix set's CRS units (degrees or meters).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TileMatrix {
    pub identifier: String,
    pub scale_denominator: f64,
    pub top_left_x: f64,
    pub top_left_y: f64,
    pub tile_width: u32,
    pub tile_height: u32,
    pub matrix_width: u32,
    pub matrix_height: u32,
}

/// Valid row and column range of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TileMatrixSet {
    pub min_tile_row: u32,
    pub max_tile_row: u32,
    pub min_tile_col: u32,
    pub max_tile_col: u32,
}

impl TileMatrixSet {
    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.min_tile_row..=self.max_tile_row).contains(&row)
            && (self.min_tile_col..=self.max_tile_col).contains(&col)
    }
}

/// Geometry of one feature in longitude/latitude.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedFeature {
    pub layer: String,
    pub feature_type: FeatureType,
    pub parts: Vec<Vec<LatLng>>,
}

#[derive(Debug, Clone)]
pub struct CoordinateProjector {
    projection: Projection,
    levels: BTreeMap<u32, (TileMatrix, Option<TileMatrixSet>)>,
}

impl CoordinateProjector {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            levels: BTreeMap::new(),
        }
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn register_level(&mut self, level: u32, matrix: TileMatrix, limits: Option<TileMatrixSet>) {
        self.levels.insert(level, (matrix, limits));
    }

    pub fn tile_matrix(&self, level: u32) -> Option<&TileMatrix> {
        self.levels.get(&level).map(|(matrix, _)| matrix)
    }

    /// Meters spanned by one CRS unit: a degree of arc on the equator for
    /// geographic, one meter for web mercator
    fn meters_per_unit(&self) -> f64 {
        match self.projection {
            Projection::Geographic => 2.0 * std::f64::consts::PI * EARTH_RADIUS / 360.0,
            Projection::WebMercator => 1.0,
        }
    }

    /// Geographic extent of the tile at `row` (north origin) and `col`, or
    /// `None` when the level is unknown or the tile is outside its limits
    pub fn tile_extent(&self, level: u32, row: u32, col: u32) -> Option<BoxExtent> {
        let (matrix, limits) = self.levels.get(&level)?;
        if row >= matrix.matrix_height || col >= matrix.matrix_width {
            return None;
        }
        if let Some(limits) = limits {
            if !limits.contains(row, col) {
                return None;
            }
        }

        let resolution = matrix.scale_denominator * WMTS_PIXEL_SIZE_METERS / self.meters_per_unit();
        let span_x = f64::from(matrix.tile_width) * resolution;
        let span_y = f64::from(matrix.tile_height) * resolution;

        let min_x = matrix.top_left_x + f64::from(col) * span_x;
        let max_y = matrix.top_left_y - f64::from(row) * span_y;
        let (lower, upper) = (
            Point::new(min_x, max_y - span_y),
            Point::new(min_x + span_x, max_y),
        );

        let (lower, upper) = match self.projection {
            Projection::Geographic => (LatLng::new(lower.y, lower.x), LatLng::new(upper.y, upper.x)),
            Projection::WebMercator => (
                Projection::WebMercator.unproject(lower),
                Projection::WebMercator.unproject(upper),
            ),
        };
        Some(BoxExtent::new(lower.lng, lower.lat, upper.lng, upper.lat))
    }

    /// Convert a tile-grid pixel to longitude/latitude. Row 0 of the grid is
    /// the tile's northern edge.
    pub fn pixel_to_geographic(px: f64, py: f64, extent: &BoxExtent, grid_size: f64) -> Option<LatLng> {
        if !(grid_size > 0.0) || extent.width() == 0.0 || extent.height() == 0.0 {
            return None;
        }
        let lng = extent.lower_lon + (px / grid_size) * extent.width();
        let lat = extent.lower_lat + (1.0 - py / grid_size) * extent.height();
        Some(LatLng::new(lat, lng))
    }

    pub fn project_pixel(&self, level: u32, row: u32, col: u32, px: f64, py: f64) -> Option<LatLng> {
        let extent = self.tile_extent(level, row, col)?;
        Self::pixel_to_geographic(px, py, &extent, f64::from(TILE_EXTENT))
    }

    pub fn project_geometry(geometry: &VectorGeometry, extent: &BoxExtent, grid_size: f64) -> Vec<LatLng> {
        geometry
            .points
            .iter()
            .filter_map(|p| Self::pixel_to_geographic(f64::from(p.x), f64::from(p.y), extent, grid_size))
            .collect()
    }

    /// Project every feature of `model`, using each layer's own grid size
    pub fn project_model(&self, model: &VectorModel) -> Option<Vec<ProjectedFeature>> {
        let extent = self.tile_extent(model.level, model.row, model.col)?;
        let mut projected = Vec::with_capacity(model.feature_count());
        for layer in &model.layers {
            for feature in &layer.features {
                projected.push(ProjectedFeature {
                    layer: layer.name.clone(),
                    feature_type: feature.feature_type,
                    parts: feature
                        .geometry
                        .iter()
                        .map(|g| Self::project_geometry(g, &extent, f64::from(layer.extent)))
                        .collect(),
                });
            }
        }
        Some(projected)
    }
}
