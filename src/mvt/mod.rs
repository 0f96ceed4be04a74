pub mod decoder;
pub mod model;
pub mod proto;

pub use decoder::{DecodeResult, VectorTileDecoder};
pub use model::{FeatureType, RingType, TilePoint, VectorFeature, VectorGeometry, VectorLayer, VectorModel};
