//! Triangle meshes for decoded features
//!
//! Polygons are ear-clipped, linestrings are stroked into miter ribbons. Both
//! work in tile-grid coordinates; placing the mesh in the world is the host's
//! business.

pub mod stroke;

use crate::mvt::model::{FeatureType, VectorFeature, VectorGeometry};
use geo::TriangulateEarcut;
use geo_types::{Coord, LineString, Polygon};
use std::mem::size_of;

/// Indexed triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    pub positions: Vec<Coord<f64>>,
    /// Three indices into `positions` per triangle
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Coord<f64>; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| {
            [
                self.positions[t[0] as usize],
                self.positions[t[1] as usize],
                self.positions[t[2] as usize],
            ]
        })
    }

    /// Append `other`, rebasing its indices
    pub fn append(&mut self, other: TriangleMesh) {
        let base = self.positions.len() as u32;
        self.positions.extend(other.positions);
        self.indices.extend(other.indices.into_iter().map(|i| i + base));
    }

    pub fn byte_size(&self) -> usize {
        self.positions.len() * size_of::<Coord<f64>>() + self.indices.len() * size_of::<u32>()
    }
}

/// Ear-clip a polygon and its holes. Rings with fewer than three distinct
/// points are skipped; a degenerate exterior yields an empty mesh.
pub fn triangulate_polygon(polygon: &Polygon<f64>) -> TriangleMesh {
    if open_ring(polygon.exterior()).len() < 3 {
        return TriangleMesh::default();
    }
    let interiors = polygon
        .interiors()
        .iter()
        .filter(|ring| open_ring(ring).len() >= 3)
        .cloned()
        .collect();

    let raw = Polygon::new(polygon.exterior().clone(), interiors).earcut_triangles_raw();
    let positions = raw
        .vertices
        .chunks_exact(2)
        .map(|xy| Coord { x: xy[0], y: xy[1] })
        .collect();
    let indices = raw.triangle_indices.into_iter().map(|i| i as u32).collect();

    TriangleMesh { positions, indices }
}

/// Ring coordinates without the closing duplicate
fn open_ring(ring: &LineString<f64>) -> &[Coord<f64>] {
    let coords = ring.0.as_slice();
    match (coords.first(), coords.last()) {
        (Some(first), Some(last)) if coords.len() > 1 && first == last => &coords[..coords.len() - 1],
        _ => coords,
    }
}

fn to_line_string(geometry: &VectorGeometry) -> LineString<f64> {
    geometry
        .points
        .iter()
        .map(|p| Coord {
            x: f64::from(p.x),
            y: f64::from(p.y),
        })
        .collect()
}

/// Build a `geo` polygon from an outer ring and its holes
pub fn to_geo_polygon(outer: &VectorGeometry, holes: &[&VectorGeometry]) -> Polygon<f64> {
    Polygon::new(
        to_line_string(outer),
        holes.iter().map(|h| to_line_string(h)).collect(),
    )
}

/// Mesh for one decoded feature. Points get none.
pub fn triangulate_feature(feature: &VectorFeature, line_width: f64) -> Option<TriangleMesh> {
    let mut mesh = TriangleMesh::default();
    match feature.feature_type {
        FeatureType::Point => return None,
        FeatureType::LineString => {
            for geometry in &feature.geometry {
                let line = to_line_string(geometry);
                mesh.append(stroke::stroke_polyline(&line.0, line_width));
            }
        }
        FeatureType::Polygon => {
            for (outer, holes) in feature.polygons() {
                mesh.append(triangulate_polygon(&to_geo_polygon(outer, &holes)));
            }
        }
    }
    (!mesh.is_empty()).then_some(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::model::{RingType, TilePoint};

    fn ring(points: &[(i32, i32)], ring_type: RingType) -> VectorGeometry {
        VectorGeometry::ring(
            points.iter().map(|(x, y)| TilePoint::new(*x, *y, 0)).collect(),
            ring_type,
        )
    }

    #[test]
    fn test_triangle_count_with_holes() {
        let outer = ring(&[(0, 0), (100, 0), (100, 100), (0, 100)], RingType::Outer);
        let hole_a = ring(&[(10, 10), (10, 40), (40, 40), (40, 10)], RingType::Inner);
        let hole_b = ring(&[(60, 60), (60, 90), (90, 90), (90, 60)], RingType::Inner);

        let polygon = to_geo_polygon(&outer, &[&hole_a, &hole_b]);
        let mesh = triangulate_polygon(&polygon);

        let (n, holes, hole_points) = (4, 2, 8);
        assert_eq!(mesh.triangle_count(), n + hole_points + 2 * holes - 2);

        let inputs: Vec<Coord<f64>> = [&outer, &hole_a, &hole_b]
            .iter()
            .flat_map(|g| to_line_string(g).0)
            .collect();
        for triangle in mesh.triangles() {
            for vertex in triangle {
                assert!(inputs.contains(&vertex));
            }
        }
    }

    #[test]
    fn test_closing_point_does_not_add_triangles() {
        let polygon = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![],
        );
        let mesh = triangulate_polygon(&polygon);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.indices.iter().all(|i| (*i as usize) < mesh.positions.len()));
    }

    #[test]
    fn test_square_with_square_hole() {
        let polygon = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            vec![LineString::from(vec![(3.0, 3.0), (3.0, 6.0), (6.0, 6.0), (6.0, 3.0)])],
        );
        let mesh = triangulate_polygon(&polygon);
        assert_eq!(mesh.triangle_count(), 8);

        // Filled area is the square minus the hole
        let area: f64 = mesh
            .triangles()
            .map(|[a, b, c]| ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs() / 2.0)
            .sum();
        assert!((area - 91.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_rings() {
        let polygon = Polygon::new(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]), vec![]);
        assert!(triangulate_polygon(&polygon).is_empty());

        let sliver_hole = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)]),
            vec![LineString::from(vec![(1.0, 1.0), (2.0, 2.0)])],
        );
        assert_eq!(triangulate_polygon(&sliver_hole).triangle_count(), 2);
    }

    #[test]
    fn test_triangulate_feature() {
        let polygon = VectorFeature::new(
            FeatureType::Polygon,
            vec![ring(&[(0, 0), (10, 0), (10, 10), (0, 10)], RingType::Outer)],
        );
        assert_eq!(triangulate_feature(&polygon, 1.0).unwrap().triangle_count(), 2);

        let line = VectorFeature::new(
            FeatureType::LineString,
            vec![
                VectorGeometry::new(vec![TilePoint::new(0, 0, 0), TilePoint::new(5, 0, 0)]),
                VectorGeometry::new(vec![TilePoint::new(0, 5, 0), TilePoint::new(5, 5, 0)]),
            ],
        );
        let mesh = triangulate_feature(&line, 2.0).unwrap();
        assert_eq!(mesh.triangle_count(), 4);
        assert_eq!(mesh.positions.len(), 8);
        assert!(mesh.indices.iter().all(|i| (*i as usize) < mesh.positions.len()));

        let point = VectorFeature::new(
            FeatureType::Point,
            vec![VectorGeometry::new(vec![TilePoint::new(1, 1, 0)])],
        );
        assert!(triangulate_feature(&point, 1.0).is_none());
    }
}
