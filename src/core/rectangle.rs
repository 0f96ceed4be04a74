use crate::core::projection::Point;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in a projection's linear units.
///
/// `min_x <= max_x` and `min_y <= max_y` once normalized. Y grows northward,
/// so `(min_x, min_y)` is the lower-left (south-west) corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rectangle {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rectangle {
    /// Creates a rectangle from its four edges
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Creates a rectangle from two opposite corners, in any order
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn lower_left(&self) -> Point {
        Point::new(self.min_x, self.min_y)
    }

    pub fn upper_right(&self) -> Point {
        Point::new(self.max_x, self.max_y)
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Checks if the rectangle contains a point, edges included
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    /// True when the two rectangles share a region of non-zero area.
    /// Rectangles that only touch along an edge do not overlap.
    pub fn overlaps(&self, other: &Rectangle) -> bool {
        let left = self.min_x.max(other.min_x);
        let bottom = self.min_y.max(other.min_y);
        let right = self.max_x.min(other.max_x);
        let top = self.max_y.min(other.max_y);
        bottom < top && left < right
    }

    /// Gets the intersection of two rectangles.
    ///
    /// Touching rectangles produce a degenerate (zero width or height)
    /// intersection rather than `None`.
    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let left = self.min_x.max(other.min_x);
        let bottom = self.min_y.max(other.min_y);
        let right = self.max_x.min(other.max_x);
        let top = self.max_y.min(other.max_y);
        if left > right || bottom > top {
            return None;
        }
        Some(Rectangle::new(left, bottom, right, top))
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rectangle) -> Rectangle {
        Rectangle::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Checks if the rectangle is valid (min <= max)
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    /// Returns a copy with min and max swapped where needed
    pub fn normalized(&self) -> Rectangle {
        Rectangle::from_corners(self.lower_left(), self.upper_right())
    }

    pub fn area(&self) -> f64 {
        if !self.is_valid() {
            0.0
        } else {
            self.width() * self.height()
        }
    }
}
