use crate::core::rectangle::Rectangle;
use geo::HaversineDistance;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// WGS84 semi-major axis, shared by both projections
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Web Mercator latitude limit in degrees (the square-world cutoff)
pub const MAX_LATITUDE: f64 = 85.0511287798;

/// Represents a geographical coordinate with latitude and longitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Great-circle distance in meters
    pub fn distance_to(&self, other: &LatLng) -> f64 {
        let a = geo::Point::new(self.lng, self.lat);
        let b = geo::Point::new(other.lng, other.lat);
        a.haversine_distance(&b)
    }

    /// Clamps latitude to the Web Mercator range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in projected coordinates or a 2D vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a bounding box of geographical coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

/// The projections a vector source can be tiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Projection {
    /// Equirectangular: x = longitude in radians times the earth radius
    Geographic,
    /// Spherical Web Mercator (EPSG:3857)
    WebMercator,
}

impl Projection {
    /// Maps a tile matrix set name to its projection
    pub fn from_matrix_set(name: &str) -> Option<Projection> {
        match name {
            "EPSG:4326" => Some(Projection::Geographic),
            "EPSG:3857" | "EPSG:900913" => Some(Projection::WebMercator),
            _ => None,
        }
    }

    /// Number of level-zero tiles across the projected world
    pub fn root_tiles(&self) -> (u32, u32) {
        match self {
            Projection::Geographic => (2, 1),
            Projection::WebMercator => (1, 1),
        }
    }

    pub fn project(&self, position: LatLng) -> Point {
        match self {
            Projection::Geographic => Point::new(
                position.lng.to_radians() * EARTH_RADIUS,
                position.lat.to_radians() * EARTH_RADIUS,
            ),
            Projection::WebMercator => {
                let lat = LatLng::clamp_lat(position.lat);
                let x = position.lng.to_radians() * EARTH_RADIUS;
                let y = ((PI / 4.0 + lat.to_radians() / 2.0).tan().ln()) * EARTH_RADIUS;
                Point::new(x, y)
            }
        }
    }

    pub fn unproject(&self, point: Point) -> LatLng {
        match self {
            Projection::Geographic => LatLng::new(
                (point.y / EARTH_RADIUS).to_degrees(),
                (point.x / EARTH_RADIUS).to_degrees(),
            ),
            Projection::WebMercator => {
                let lng = (point.x / EARTH_RADIUS).to_degrees();
                let lat = (2.0 * (point.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
                LatLng::new(lat, lng)
            }
        }
    }

    /// The largest geographic area this projection can represent
    pub fn maximum_globe_rectangle(&self) -> LatLngBounds {
        match self {
            Projection::Geographic => LatLngBounds::from_coords(-90.0, -180.0, 90.0, 180.0),
            Projection::WebMercator => {
                LatLngBounds::from_coords(-MAX_LATITUDE, -180.0, MAX_LATITUDE, 180.0)
            }
        }
    }

    /// Projects the corners of a geographic rectangle
    pub fn project_rectangle(&self, bounds: &LatLngBounds) -> Rectangle {
        Rectangle::from_corners(self.project(bounds.south_west), self.project(bounds.north_east))
    }

    /// Unprojects the corners of a projected rectangle
    pub fn unproject_rectangle(&self, rectangle: &Rectangle) -> LatLngBounds {
        let south_west = self.unproject(rectangle.lower_left());
        let north_east = self.unproject(rectangle.upper_right());
        LatLngBounds::new(south_west, north_east)
    }

    /// Approximate on-the-ground size of a projected rectangle in meters,
    /// as (east-west, north-south). Measured along the widest parallel.
    pub fn projected_rectangle_size(&self, rectangle: &Rectangle) -> Point {
        let bounds = self.unproject_rectangle(rectangle);
        let (south, north) = (bounds.south_west.lat, bounds.north_east.lat);
        let (west, east) = (bounds.south_west.lng, bounds.north_east.lng);
        let middle_lng = (west + east) / 2.0;

        // The parallel closest to the equator is the longest one.
        let widest_lat = if south <= 0.0 && north >= 0.0 {
            0.0
        } else if south > 0.0 {
            south
        } else {
            north
        };
        let along = |lat: f64| {
            LatLng::new(lat, west).distance_to(&LatLng::new(lat, middle_lng))
                + LatLng::new(lat, middle_lng).distance_to(&LatLng::new(lat, east))
        };
        let height = LatLng::new(south, west).distance_to(&LatLng::new(north, west));
        Point::new(along(widest_lat), height)
    }
}
