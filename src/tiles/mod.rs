pub mod cache;
pub mod fetch;
pub mod mapped;
pub mod provider;
pub mod quadtree;
pub mod source;
pub mod tile;

// Re-exports for convenience
pub use cache::{CacheStats, LoadedQuadtreeData, QuadtreeTileCache};
pub use fetch::{AssetAccessor, AssetResponse, Header, HttpAssetAccessor};
pub use mapped::{update_mapped_tiles, AttachmentState, VectorMappedTo3DTile};
pub use provider::{LoadedVectorOverlayData, ProviderContext, ProviderStats, TileDataLoader, VectorOverlayTileProvider};
pub use quadtree::{QuadtreeLayout, QuadtreeVectorOverlayTileProvider};
pub use source::{TileSource, UrlTemplate, WmtsSource, WmtsSourceOptions, XyzSource, XyzSourceOptions};
pub use tile::{LoadState, VectorOverlayTile};
