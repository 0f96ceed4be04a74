//! Configuration for vector overlays
//!
//! Options are plain serde structs so a host can keep them in a settings file.
//! Presets cover the common deployment shapes.

use crate::core::constants::{
    MAXIMUM_SCREEN_SPACE_ERROR, MAXIMUM_SIMULTANEOUS_TILE_LOADS, MAXIMUM_TEXTURE_SIZE,
    SUB_TILE_CACHE_BYTES,
};
use crate::{OverlayError, Result};
use serde::{Deserialize, Serialize};

/// Options shared by every provider of one overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorOverlayOptions {
    /// Throttled loads a provider may have in flight at once
    pub maximum_simultaneous_tile_loads: usize,
    /// Byte budget of the quadtree tile cache
    pub sub_tile_cache_bytes: u64,
    /// Largest combined texture edge a geometry tile may map to
    pub maximum_texture_size: u32,
    /// Screen-space error used to turn geometric error into target pixels
    pub maximum_screen_space_error: f64,
    /// Treat a successful response with an empty body as "no features"
    /// instead of an error
    pub allow_empty_body: bool,
    /// Build triangle meshes for decoded features on the worker side
    pub triangulate: bool,
    /// Ribbon width used when stroking linestrings, in tile pixels
    pub line_width: f64,
    pub show_credits_on_screen: bool,
}

impl Default for VectorOverlayOptions {
    fn default() -> Self {
        Self {
            maximum_simultaneous_tile_loads: MAXIMUM_SIMULTANEOUS_TILE_LOADS,
            sub_tile_cache_bytes: SUB_TILE_CACHE_BYTES,
            maximum_texture_size: MAXIMUM_TEXTURE_SIZE,
            maximum_screen_space_error: MAXIMUM_SCREEN_SPACE_ERROR,
            allow_empty_body: false,
            triangulate: false,
            line_width: 1.0,
            show_credits_on_screen: false,
        }
    }
}

/// Configuration presets
impl VectorOverlayOptions {
    pub fn low_resource() -> Self {
        Self {
            maximum_simultaneous_tile_loads: 4,
            sub_tile_cache_bytes: 4 * 1024 * 1024,
            maximum_texture_size: 1024,
            maximum_screen_space_error: 4.0,
            ..Self::default()
        }
    }

    pub fn high_performance() -> Self {
        Self {
            maximum_simultaneous_tile_loads: 64,
            sub_tile_cache_bytes: 128 * 1024 * 1024,
            maximum_texture_size: 4096,
            triangulate: true,
            ..Self::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            maximum_simultaneous_tile_loads: 2,
            sub_tile_cache_bytes: 64 * 1024,
            ..Self::default()
        }
    }

    /// Parses options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.maximum_simultaneous_tile_loads == 0 {
            return Err(OverlayError::InvalidConfig(
                "maximum_simultaneous_tile_loads must be at least 1".to_string(),
            ));
        }
        if self.maximum_texture_size == 0 {
            return Err(OverlayError::InvalidConfig(
                "maximum_texture_size must be at least 1".to_string(),
            ));
        }
        if !(self.maximum_screen_space_error > 0.0) {
            return Err(OverlayError::InvalidConfig(format!(
                "maximum_screen_space_error must be positive, got {}",
                self.maximum_screen_space_error
            )));
        }
        if !(self.line_width > 0.0) {
            return Err(OverlayError::InvalidConfig(format!(
                "line_width must be positive, got {}",
                self.line_width
            )));
        }
        Ok(())
    }
}
