//! Prelude module for common vector-overlay types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use vector_overlay::prelude::*;`

pub use crate::core::{
    config::VectorOverlayOptions,
    projection::{LatLng, LatLngBounds, Point, Projection},
    rectangle::Rectangle,
    tiling::{QuadtreeTileID, QuadtreeTilingScheme},
};

pub use crate::mvt::{
    decoder::{DecodeResult, VectorTileDecoder},
    model::{FeatureType, RingType, TilePoint, VectorFeature, VectorGeometry, VectorLayer, VectorModel},
};

pub use crate::tiles::{
    fetch::{AssetAccessor, AssetResponse, Header},
    mapped::{AttachmentState, VectorMappedTo3DTile},
    provider::{LoadedVectorOverlayData, ProviderStats, VectorOverlayTileProvider},
    quadtree::QuadtreeVectorOverlayTileProvider,
    source::{TileSource, WmtsSource, XyzSource},
    tile::{LoadState, VectorOverlayTile},
};

pub use crate::traits::{GeometryTile, OverlayAttachment, OverlayDetails, PrepareVectorResources, RendererResources};

pub use crate::runtime::{AsyncHandle, AsyncSpawner, AsyncSystem};

pub use crate::overlay::VectorOverlay;

pub use crate::{Error as OverlayError, Result};

pub use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::future::{BoxFuture, FutureExt, Shared};
pub use futures::Future;
pub use std::pin::Pin;
