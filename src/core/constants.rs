//! Engine-wide constants for vector overlays.
//! Keeping them in a single place makes it easier to tweak the magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Side of the integer grid a vector tile's geometry is encoded in.
pub const TILE_EXTENT: u32 = 4096;

/// Default cap on throttled loads in flight per provider.
pub const MAXIMUM_SIMULTANEOUS_TILE_LOADS: usize = 20;

/// Default byte budget of the quadtree tile cache (16 MiB).
pub const SUB_TILE_CACHE_BYTES: u64 = 16 * 1024 * 1024;

/// Largest combined texture edge a mapped tile range may span.
pub const MAXIMUM_TEXTURE_SIZE: u32 = 2048;

/// Default screen-space error used to size overlay requests.
pub const MAXIMUM_SCREEN_SPACE_ERROR: f64 = 2.0;

/// A tile edge within `rectangle_size / VERY_CLOSE_DIVISOR` of a request
/// boundary does not pull in an extra row or column.
pub const VERY_CLOSE_DIVISOR: f64 = 512.0;

/// Determinant tolerance for segment intersection tests.
pub const INTERSECTION_EPSILON: f64 = 1e-6;

/// Standardized rendering pixel size (0.28 mm) used by WMTS scale denominators.
pub const WMTS_PIXEL_SIZE_METERS: f64 = 0.28e-3;
