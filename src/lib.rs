//! # vector-overlay
//!
//! Drapes Mapbox vector tiles over a streamed 3D tileset.
//!
//! The crate decodes vector tile payloads into typed geometry, picks the
//! quadtree level of detail needed to cover a geometry tile at a target pixel
//! density, fetches and caches quadtree tiles under a byte budget, and maps the
//! loaded overlay tiles onto the geometry tiles that asked for them, falling
//! back to ancestor data while better data is still on its way.
//!
//! All cache and tile state is mutated from a single "main thread" context.
//! Network, decode and triangulation work runs on the worker side of an
//! [`AsyncSystem`](runtime::AsyncSystem); the host drains main-thread work once
//! per frame with [`AsyncSystem::dispatch_main_thread_tasks`](runtime::AsyncSystem::dispatch_main_thread_tasks).

pub mod core;
pub mod mesh;
pub mod mvt;
pub mod overlay;
pub mod prelude;
pub mod projector;
pub mod runtime;
pub mod tiles;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::VectorOverlayOptions,
    projection::{LatLng, LatLngBounds, Point, Projection},
    rectangle::Rectangle,
    tiling::{QuadtreeTileID, QuadtreeTilingScheme},
};

pub use mvt::{
    decoder::VectorTileDecoder,
    model::{FeatureType, RingType, VectorFeature, VectorGeometry, VectorLayer, VectorModel},
};

pub use mesh::TriangleMesh;

pub use projector::{BoxExtent, CoordinateProjector, TileMatrix, TileMatrixSet};

pub use tiles::{
    fetch::{AssetAccessor, AssetResponse, HttpAssetAccessor},
    mapped::{AttachmentState, VectorMappedTo3DTile},
    provider::{LoadedVectorOverlayData, VectorOverlayTileProvider},
    quadtree::QuadtreeVectorOverlayTileProvider,
    source::{TileSource, WmtsSource, XyzSource},
    tile::{LoadState, VectorOverlayTile},
};

pub use overlay::VectorOverlay;

pub use runtime::AsyncSystem;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, OverlayError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("vector response code {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("empty vector response for {0}")]
    EmptyResponse(String),

    #[error("async task was dropped before it completed")]
    TaskCanceled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Error type alias for convenience
pub type Error = OverlayError;

/// Install `env_logger` as the `log` backend. Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(cfg!(test))
        .try_init();
}
