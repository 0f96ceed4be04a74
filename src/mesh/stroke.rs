//! Linestring stroking into miter-joined triangle ribbons.

use crate::core::constants::INTERSECTION_EPSILON;
use crate::mesh::TriangleMesh;
use geo_types::Coord;

/// Miter points further than this many half-widths from their vertex fall
/// back to the plain offset.
pub const DEFAULT_MITER_LIMIT: f64 = 4.0;

/// Stroke `points` into a ribbon `width` wide using the default miter limit
pub fn stroke_polyline(points: &[Coord<f64>], width: f64) -> TriangleMesh {
    stroke_polyline_with_limit(points, width, DEFAULT_MITER_LIMIT)
}

/// Stroke `points` into a quad strip.
///
/// Every vertex contributes a left and a right point (`2i` and `2i + 1`).
/// Interior vertices sit where the offset edges of the two adjacent segments
/// meet. Near-parallel segments and over-long miters use the incoming
/// segment's offset instead. Fewer than two distinct points give an empty
/// mesh.
pub fn stroke_polyline_with_limit(points: &[Coord<f64>], width: f64, miter_limit: f64) -> TriangleMesh {
    let mut path: Vec<Coord<f64>> = Vec::with_capacity(points.len());
    for p in points {
        if path.last().map_or(true, |last| distance(*last, *p) > INTERSECTION_EPSILON) {
            path.push(*p);
        }
    }

    let mut mesh = TriangleMesh::default();
    if path.len() < 2 || !(width > 0.0) {
        return mesh;
    }

    let half = width / 2.0;
    let max_miter = half * miter_limit.max(1.0);
    let last = path.len() - 1;

    for i in 0..path.len() {
        let current = path[i];
        let (left, right) = if i == 0 {
            let n = left_normal(current, path[1]);
            (offset(current, n, half), offset(current, n, -half))
        } else if i == last {
            let n = left_normal(path[i - 1], current);
            (offset(current, n, half), offset(current, n, -half))
        } else {
            let (previous, next) = (path[i - 1], path[i + 1]);
            let n0 = left_normal(previous, current);
            let n1 = left_normal(current, next);
            (
                miter(previous, current, next, n0, n1, half, max_miter),
                miter(previous, current, next, n0, n1, -half, max_miter),
            )
        };
        mesh.positions.push(left);
        mesh.positions.push(right);
    }

    for i in 0..last as u32 {
        let base = 2 * i;
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 1, base + 3, base + 2]);
    }
    mesh
}

fn miter(
    previous: Coord<f64>,
    current: Coord<f64>,
    next: Coord<f64>,
    n0: Coord<f64>,
    n1: Coord<f64>,
    signed_half: f64,
    max_miter: f64,
) -> Coord<f64> {
    let fallback = offset(current, n0, signed_half);
    let incoming = (offset(previous, n0, signed_half), unit(current - previous));
    let outgoing = (offset(current, n1, signed_half), unit(next - current));

    match line_intersection(incoming.0, incoming.1, outgoing.0, outgoing.1) {
        Some(point) if distance(point, current) <= max_miter => point,
        _ => fallback,
    }
}

/// Intersection of the lines `a + t * da` and `b + u * db`, `None` when they
/// are (nearly) parallel
fn line_intersection(
    a: Coord<f64>,
    da: Coord<f64>,
    b: Coord<f64>,
    db: Coord<f64>,
) -> Option<Coord<f64>> {
    let det = cross(da, db);
    if det.abs() <= INTERSECTION_EPSILON {
        return None;
    }
    let t = cross(b - a, db) / det;
    Some(a + da * t)
}

fn cross(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

fn unit(v: Coord<f64>) -> Coord<f64> {
    let len = v.x.hypot(v.y);
    if len <= 0.0 {
        Coord { x: 0.0, y: 0.0 }
    } else {
        v / len
    }
}

fn left_normal(from: Coord<f64>, to: Coord<f64>) -> Coord<f64> {
    let d = unit(to - from);
    Coord { x: -d.y, y: d.x }
}

fn offset(p: Coord<f64>, normal: Coord<f64>, amount: f64) -> Coord<f64> {
    p + normal * amount
}
