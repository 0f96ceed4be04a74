//! Decoded vector tile content.

use crate::core::rectangle::Rectangle;
use crate::mesh::TriangleMesh;
use crate::prelude::HashMap;
use serde::{Deserialize, Serialize};
use std::mem::size_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureType {
    Point,
    LineString,
    Polygon,
}

/// Winding class of a polygon ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RingType {
    /// Positive signed area
    Outer,
    /// Negative signed area; belongs to the closest preceding outer ring
    Inner,
    /// Zero area
    Invalid,
}

/// Integer position in the tile grid. `z` carries the tile level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TilePoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl TilePoint {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// One point run, linestring or ring of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorGeometry {
    pub points: Vec<TilePoint>,
    /// Set for polygon rings only
    pub ring_type: Option<RingType>,
}

impl VectorGeometry {
    pub fn new(points: Vec<TilePoint>) -> Self {
        Self {
            points,
            ring_type: None,
        }
    }

    pub fn ring(points: Vec<TilePoint>, ring_type: RingType) -> Self {
        Self {
            points,
            ring_type: Some(ring_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorFeature {
    pub id: Option<u64>,
    pub feature_type: FeatureType,
    pub geometry: Vec<VectorGeometry>,
    pub properties: HashMap<String, serde_json::Value>,
    /// Filled in on the worker when triangulation is enabled
    pub mesh: Option<TriangleMesh>,
}

impl VectorFeature {
    pub fn new(feature_type: FeatureType, geometry: Vec<VectorGeometry>) -> Self {
        Self {
            id: None,
            feature_type,
            geometry,
            properties: HashMap::default(),
            mesh: None,
        }
    }

    pub fn point_count(&self) -> usize {
        self.geometry.iter().map(|g| g.points.len()).sum()
    }

    /// Groups polygon rings into `(outer, holes)` pairs. Holes follow their
    /// outer ring until the next outer ring begins.
    pub fn polygons(&self) -> Vec<(&VectorGeometry, Vec<&VectorGeometry>)> {
        let mut polygons: Vec<(&VectorGeometry, Vec<&VectorGeometry>)> = Vec::new();
        for geometry in &self.geometry {
            match geometry.ring_type {
                Some(RingType::Outer) => polygons.push((geometry, Vec::new())),
                Some(RingType::Inner) => {
                    if let Some((_, holes)) = polygons.last_mut() {
                        holes.push(geometry);
                    }
                }
                _ => {}
            }
        }
        polygons
    }

    fn byte_size(&self) -> usize {
        let geometry: usize = self
            .geometry
            .iter()
            .map(|g| size_of::<VectorGeometry>() + g.points.len() * size_of::<TilePoint>())
            .sum();
        let properties: usize = self
            .properties
            .iter()
            .map(|(k, v)| k.len() + size_of::<serde_json::Value>() + json_size(v))
            .sum();
        let mesh = self.mesh.as_ref().map_or(0, TriangleMesh::byte_size);
        size_of::<Self>() + geometry + properties + mesh
    }
}

fn json_size(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::String(s) => s.len(),
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    pub name: String,
    /// Side of the layer's coordinate grid
    pub extent: u32,
    pub features: Vec<VectorFeature>,
}

/// Drawing hints for a model. Colors are RGBA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStyle {
    pub fill_color: [u8; 4],
    pub line_width: f64,
    pub outline: bool,
    pub outline_color: [u8; 4],
}

impl Default for VectorStyle {
    fn default() -> Self {
        Self {
            fill_color: [255, 255, 255, 255],
            line_width: 1.0,
            outline: false,
            outline_color: [0, 0, 0, 255],
        }
    }
}

/// All layers of one decoded tile plus its `{level, row, col}` identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorModel {
    pub layers: Vec<VectorLayer>,
    pub level: u32,
    /// North-origin row
    pub row: u32,
    pub col: u32,
    pub style: VectorStyle,
    pub source_name: String,
    /// Bounds reported by the server, if any
    pub extent: Option<Rectangle>,
}

impl VectorModel {
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|l| l.features.is_empty())
    }

    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|l| l.features.len()).sum()
    }

    pub fn layer(&self, name: &str) -> Option<&VectorLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Estimated heap footprint, used for the cache byte budget. Only depends
    /// on content, so the same model always reports the same size.
    pub fn byte_size(&self) -> usize {
        size_of::<Self>()
            + self.source_name.len()
            + self
                .layers
                .iter()
                .map(|l| {
                    size_of::<VectorLayer>()
                        + l.name.len()
                        + l.features.iter().map(VectorFeature::byte_size).sum::<usize>()
                })
                .sum::<usize>()
    }
}
