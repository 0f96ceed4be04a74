//! Mapbox Vector Tile payload decoding
//!
//! Turns a (possibly gzip-compressed) protobuf payload into a [`VectorModel`].
//! Geometry command streams are delta-decoded into absolute tile-grid
//! coordinates and polygon rings are classified by their signed area.

use crate::mvt::model::{
    FeatureType, RingType, TilePoint, VectorFeature, VectorGeometry, VectorLayer, VectorModel,
};
use crate::mvt::proto::{self, GeomType};
use crate::prelude::HashMap;
use flate2::read::GzDecoder;
use prost::Message;
use std::io::Read;

pub const MOVE_TO: u32 = 1;
pub const LINE_TO: u32 = 2;
pub const CLOSE_PATH: u32 = 7;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Why a single feature's geometry could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("unknown geometry type {0}")]
    UnknownGeometryType(i32),
    #[error("unknown command {0}")]
    UnknownCommand(u32),
    #[error("command {command} expects {expected} parameters, stream ends after {available}")]
    Truncated {
        command: u32,
        expected: usize,
        available: usize,
    },
    #[error("LineTo without a preceding MoveTo")]
    LineToWithoutMoveTo,
    #[error("coordinate overflow")]
    CoordinateOverflow,
}

/// Outcome of decoding one payload.
///
/// `model` is `None` whenever `errors` is non-empty. Warnings describe data
/// that was skipped without failing the tile.
#[derive(Debug, Clone, Default)]
pub struct DecodeResult {
    pub model: Option<VectorModel>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Stateless vector tile decoder. Cheap to copy into worker tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorTileDecoder;

impl VectorTileDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode `data` for the tile at `level`, `row` (north origin), `col`
    pub fn decode(&self, data: &[u8], level: u32, row: u32, col: u32) -> DecodeResult {
        let mut result = DecodeResult::default();

        let inflated;
        let bytes = if is_gzip(data) {
            match inflate(data) {
                Ok(buffer) => {
                    inflated = buffer;
                    inflated.as_slice()
                }
                Err(e) => {
                    result.errors.push(format!("failed to inflate vector tile: {e}"));
                    return result;
                }
            }
        } else {
            data
        };

        let tile = match proto::Tile::decode(bytes) {
            Ok(tile) => tile,
            Err(e) => {
                result.errors.push(format!("failed to decode vector tile: {e}"));
                return result;
            }
        };

        let mut model = VectorModel {
            level,
            row,
            col,
            ..VectorModel::default()
        };
        for layer in &tile.layers {
            model
                .layers
                .push(self.decode_layer(layer, level, &mut result.errors, &mut result.warnings));
        }

        if result.errors.is_empty() {
            result.model = Some(model);
        }
        result
    }

    fn decode_layer(
        &self,
        layer: &proto::Layer,
        level: u32,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> VectorLayer {
        if !(1..=2).contains(&layer.version) {
            warnings.push(format!(
                "layer {} has unsupported version {}",
                layer.name, layer.version
            ));
        }

        let mut features = Vec::with_capacity(layer.features.len());
        for (index, feature) in layer.features.iter().enumerate() {
            match decode_feature(layer, feature, level, warnings) {
                Ok(Some(decoded)) => features.push(decoded),
                Ok(None) => {}
                Err(e) => errors.push(format!("layer {} feature {index}: {e}", layer.name)),
            }
        }

        VectorLayer {
            name: layer.name.clone(),
            extent: layer.extent.unwrap_or(crate::core::constants::TILE_EXTENT),
            features,
        }
    }
}

fn decode_feature(
    layer: &proto::Layer,
    feature: &proto::Feature,
    level: u32,
    warnings: &mut Vec<String>,
) -> Result<Option<VectorFeature>, GeometryError> {
    let raw_type = feature.r#type.unwrap_or(GeomType::Unknown as i32);
    let feature_type = match GeomType::try_from(raw_type).ok() {
        Some(GeomType::Point) => FeatureType::Point,
        Some(GeomType::Linestring) => FeatureType::LineString,
        Some(GeomType::Polygon) => FeatureType::Polygon,
        _ => return Err(GeometryError::UnknownGeometryType(raw_type)),
    };

    let paths = decode_paths(&feature.geometry, feature_type, level as i32)?;

    let geometry = match feature_type {
        FeatureType::Point => paths.into_iter().map(|p| VectorGeometry::new(p.points)).collect(),
        FeatureType::LineString => paths
            .into_iter()
            .filter(|p| p.points.len() >= 2)
            .map(|p| VectorGeometry::new(p.points))
            .collect(),
        FeatureType::Polygon => classify_rings(&layer.name, paths, warnings),
    };

    let mut decoded = VectorFeature::new(feature_type, geometry);
    decoded.id = feature.id;
    decoded.properties = decode_properties(layer, feature, warnings);

    if decoded.geometry.is_empty() {
        warnings.push(format!("layer {}: dropped feature without geometry", layer.name));
        return Ok(None);
    }
    Ok(Some(decoded))
}

struct Path {
    points: Vec<TilePoint>,
    closed: bool,
}

/// Run a command stream, producing one path per MoveTo (one combined path for
/// points).
fn decode_paths(
    commands: &[u32],
    feature_type: FeatureType,
    z: i32,
) -> Result<Vec<Path>, GeometryError> {
    let mut paths = Vec::new();
    let mut current: Vec<TilePoint> = Vec::new();
    let (mut x, mut y) = (0i32, 0i32);
    let mut i = 0;

    while i < commands.len() {
        let (id, count) = (commands[i] & 0x7, (commands[i] >> 3) as usize);
        i += 1;

        match id {
            MOVE_TO | LINE_TO => {
                let expected = count * 2;
                if commands.len() - i < expected {
                    return Err(GeometryError::Truncated {
                        command: id,
                        expected,
                        available: commands.len() - i,
                    });
                }
                if id == LINE_TO && current.is_empty() {
                    return Err(GeometryError::LineToWithoutMoveTo);
                }

                for pair in commands[i..i + expected].chunks_exact(2) {
                    x = x
                        .checked_add(zigzag_decode(pair[0]))
                        .ok_or(GeometryError::CoordinateOverflow)?;
                    y = y
                        .checked_add(zigzag_decode(pair[1]))
                        .ok_or(GeometryError::CoordinateOverflow)?;

                    if id == MOVE_TO && feature_type != FeatureType::Point && !current.is_empty() {
                        paths.push(Path {
                            points: std::mem::take(&mut current),
                            closed: false,
                        });
                    }
                    current.push(TilePoint::new(x, y, z));
                }
                i += expected;
            }
            CLOSE_PATH => {
                if !current.is_empty() {
                    paths.push(Path {
                        points: std::mem::take(&mut current),
                        closed: true,
                    });
                }
            }
            other => return Err(GeometryError::UnknownCommand(other)),
        }
    }

    if !current.is_empty() {
        paths.push(Path {
            points: current,
            closed: false,
        });
    }
    Ok(paths)
}

fn classify_rings(layer: &str, paths: Vec<Path>, warnings: &mut Vec<String>) -> Vec<VectorGeometry> {
    let mut rings = Vec::with_capacity(paths.len());
    let mut has_outer = false;

    for path in paths {
        if !path.closed {
            warnings.push(format!("layer {layer}: dropped unclosed polygon ring"));
            continue;
        }
        match classify_ring(&path.points) {
            RingType::Invalid => {
                log::warn!("layer {layer}: dropped zero-area ring");
                warnings.push(format!("layer {layer}: dropped zero-area ring"));
            }
            RingType::Inner if !has_outer => {
                warnings.push(format!("layer {layer}: dropped hole without an outer ring"));
            }
            ring_type => {
                has_outer |= ring_type == RingType::Outer;
                rings.push(VectorGeometry::ring(path.points, ring_type));
            }
        }
    }
    rings
}

fn decode_properties(
    layer: &proto::Layer,
    feature: &proto::Feature,
    warnings: &mut Vec<String>,
) -> HashMap<String, serde_json::Value> {
    let mut properties = HashMap::default();
    for tag in feature.tags.chunks(2) {
        let (Some(key), Some(value)) = (
            layer.keys.get(tag[0] as usize),
            tag.get(1).and_then(|v| layer.values.get(*v as usize)),
        ) else {
            warnings.push(format!("layer {}: skipped out-of-range tag", layer.name));
            continue;
        };
        properties.insert(key.clone(), value.to_json());
    }
    properties
}

/// Twice the signed area of a ring (surveyor's formula) in tile-grid units.
pub fn signed_area(points: &[TilePoint]) -> i64 {
    if points.len() < 3 {
        return 0;
    }
    let mut sum = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        sum += i64::from(p.x) * i64::from(q.y) - i64::from(q.x) * i64::from(p.y);
    }
    sum
}

pub fn classify_ring(points: &[TilePoint]) -> RingType {
    match signed_area(points) {
        a if a > 0 => RingType::Outer,
        a if a < 0 => RingType::Inner,
        _ => RingType::Invalid,
    }
}

pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == GZIP_MAGIC
}

fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(data.len() * 4);
    GzDecoder::new(data).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Pack a command id and repeat count into one command integer
pub fn command_integer(id: u32, count: u32) -> u32 {
    (id & 0x7) | (count << 3)
}

pub fn zigzag_encode(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

pub fn zigzag_decode(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}
