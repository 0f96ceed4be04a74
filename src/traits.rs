//! Seams between the overlay pipeline and the host engine
//!
//! The crate never creates GPU resources or walks a scene graph itself. Hosts
//! plug those concerns in through the traits below.

use crate::core::projection::{Point, Projection};
use crate::core::rectangle::Rectangle;
use crate::core::tiling::QuadtreeTileID;
use crate::mvt::model::VectorModel;
use crate::prelude::Arc;
use crate::tiles::mapped::VectorMappedTo3DTile;
use crate::tiles::tile::VectorOverlayTile;
use std::any::Any;

/// Opaque renderer handle. The crate stores and hands these back but never
/// looks inside.
pub type RendererResources = Arc<dyn Any + Send + Sync>;

/// Host hook that turns decoded overlay data into renderer resources.
pub trait PrepareVectorResources: Send + Sync {
    /// Called on a worker right after a tile's model is decoded
    fn prepare_in_load_thread(&self, model: &VectorModel) -> Option<RendererResources>;

    /// Called on the main thread when a loaded tile is first attached
    fn prepare_in_main_thread(
        &self,
        tile: &VectorOverlayTile,
        load_thread_result: Option<RendererResources>,
    ) -> Option<RendererResources>;

    /// Release whatever the two prepare steps produced. Only one of the two
    /// results is ever set. The owning tile may already be gone.
    fn free(
        &self,
        load_thread_result: Option<RendererResources>,
        main_thread_result: Option<RendererResources>,
    );
}

/// Host hook invoked when an overlay tile starts or stops being drawn on a
/// geometry tile.
pub trait OverlayAttachment<T: ?Sized> {
    fn attach(
        &mut self,
        tile: &mut T,
        texture_coordinate_index: i32,
        overlay_tile: &VectorOverlayTile,
        translation: Point,
        scale: Point,
    );

    fn detach(&mut self, tile: &mut T, texture_coordinate_index: i32, overlay_tile: &VectorOverlayTile);
}

/// Overlay texture-coordinate sets generated for a loaded geometry tile,
/// one rectangle per projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayDetails {
    pub projections: Vec<Projection>,
    pub rectangles: Vec<Rectangle>,
}

impl OverlayDetails {
    /// Index of the rectangle generated for `projection`
    pub fn find_rectangle_index(&self, projection: Projection) -> Option<usize> {
        self.projections
            .iter()
            .position(|p| *p == projection)
            .filter(|index| *index < self.rectangles.len())
    }

    pub fn find_rectangle(&self, projection: Projection) -> Option<&Rectangle> {
        self.find_rectangle_index(projection)
            .map(|index| &self.rectangles[index])
    }
}

/// A node of the host's 3D tileset that overlays are mapped onto.
pub trait GeometryTile {
    fn parent(&self) -> Option<&Self>;

    fn mapped_vector_tiles(&self) -> &[VectorMappedTo3DTile];

    fn mapped_vector_tiles_mut(&mut self) -> &mut Vec<VectorMappedTo3DTile>;

    /// Precise overlay rectangles, present once the tile's content is loaded
    fn overlay_details(&self) -> Option<&OverlayDetails>;

    /// Rectangle derived from the tile's bounding region, when it has one
    fn bounding_rectangle(&self, projection: Projection) -> Option<Rectangle>;

    fn geometric_error(&self) -> f64;

    /// Implicit quadtree address of the tile, when the tileset has one
    fn tile_id(&self) -> Option<QuadtreeTileID> {
        None
    }
}
