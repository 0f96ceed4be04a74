//! Overlay tiles as seen from one geometry tile
//!
//! Each geometry tile keeps a [`VectorMappedTo3DTile`] per overlay. The
//! mapping tracks the overlay tile being loaded for it and the tile currently
//! drawn, which may belong to an ancestor until the better tile is ready.

use crate::core::projection::{Point, Projection};
use crate::core::rectangle::Rectangle;
use crate::prelude::Arc;
use crate::tiles::provider::VectorOverlayTileProvider;
use crate::tiles::tile::{LoadState, VectorOverlayTile};
use crate::traits::{GeometryTile, OverlayAttachment};

/// Whether the mapping's ready tile is drawn on the geometry tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentState {
    Unattached,
    /// Drawn while a better tile is still loading
    TemporarilyAttached,
    Attached,
}

#[derive(Debug, Clone)]
pub struct VectorMappedTo3DTile {
    loading_tile: Option<Arc<VectorOverlayTile>>,
    ready_tile: Option<Arc<VectorOverlayTile>>,
    texture_coordinate_index: i32,
    translation: Point,
    scale: Point,
    state: AttachmentState,
}

impl VectorMappedTo3DTile {
    pub fn new(tile: Arc<VectorOverlayTile>, texture_coordinate_index: i32) -> Self {
        Self {
            loading_tile: Some(tile),
            ready_tile: None,
            texture_coordinate_index,
            translation: Point::new(0.0, 0.0),
            scale: Point::new(1.0, 1.0),
            state: AttachmentState::Unattached,
        }
    }

    pub fn loading_tile(&self) -> Option<&Arc<VectorOverlayTile>> {
        self.loading_tile.as_ref()
    }

    pub fn ready_tile(&self) -> Option<&Arc<VectorOverlayTile>> {
        self.ready_tile.as_ref()
    }

    pub fn texture_coordinate_index(&self) -> i32 {
        self.texture_coordinate_index
    }

    pub fn translation(&self) -> Point {
        self.translation
    }

    pub fn scale(&self) -> Point {
        self.scale
    }

    pub fn state(&self) -> AttachmentState {
        self.state
    }

    /// Advance the mapping by one frame. Main thread only.
    ///
    /// Promotes the loading tile once it has data, otherwise borrows the
    /// nearest ancestor's loaded tile from the same overlay, and attaches
    /// whatever is ready.
    pub fn update<T, R>(&mut self, renderer: &mut R, tile: &mut T)
    where
        T: GeometryTile,
        R: OverlayAttachment<T> + ?Sized,
    {
        if self.state == AttachmentState::Attached {
            return;
        }

        if let Some(loading) = self.loading_tile.clone() {
            if loading.state() >= LoadState::Loaded {
                self.detach_ready_tile(renderer, tile);
                self.ready_tile = self.loading_tile.take();
                self.compute_translation_and_scale(tile);
            }
        }

        if let Some(overlay_id) = self.loading_tile.as_ref().map(|loading| loading.overlay_id()) {
            if let Some(candidate) = find_loaded_ancestor_tile(tile, overlay_id) {
                let already_ready = self
                    .ready_tile
                    .as_ref()
                    .map_or(false, |ready| Arc::ptr_eq(ready, &candidate));
                if !already_ready {
                    self.detach_ready_tile(renderer, tile);
                    self.ready_tile = Some(candidate);
                    self.compute_translation_and_scale(tile);
                }
            }
        }

        if self.state == AttachmentState::Unattached {
            if let Some(ready) = self.ready_tile.clone() {
                ready.load_in_main_thread();
                renderer.attach(tile, self.texture_coordinate_index, &ready, self.translation, self.scale);
                self.state = if self.loading_tile.is_some() {
                    AttachmentState::TemporarilyAttached
                } else {
                    AttachmentState::Attached
                };
            }
        }
    }

    fn detach_ready_tile<T, R>(&mut self, renderer: &mut R, tile: &mut T)
    where
        T: GeometryTile,
        R: OverlayAttachment<T> + ?Sized,
    {
        if self.state == AttachmentState::Unattached {
            return;
        }
        if let Some(ready) = &self.ready_tile {
            renderer.detach(tile, self.texture_coordinate_index, ready);
        }
        self.state = AttachmentState::Unattached;
    }

    /// Stop drawing the ready tile on `tile`
    pub fn detach_from_tile<T, R>(&mut self, renderer: &mut R, tile: &mut T)
    where
        T: GeometryTile,
        R: OverlayAttachment<T> + ?Sized,
    {
        self.detach_ready_tile(renderer, tile);
    }

    /// Ask the loading tile's provider to start it under the throttle.
    /// `false` means the throttle is full; try again next frame.
    pub fn load_throttled(&self) -> bool {
        let Some(loading) = &self.loading_tile else {
            return true;
        };
        match loading.provider() {
            Some(provider) => provider.load_tile_throttled(loading),
            None => true,
        }
    }

    /// Create the mapping of `provider`'s overlay onto `tile` and append it
    /// to the tile's list.
    ///
    /// Projections the tile has no overlay rectangle for yet are added to
    /// `missing_projections`; the mapping's texture-coordinate index then
    /// points past the tile's existing sets. Returns `None` when the
    /// provider has nothing for the tile.
    pub fn map_overlay_to_tile<'a, T: GeometryTile>(
        maximum_screen_space_error: f64,
        provider: &Arc<VectorOverlayTileProvider>,
        placeholder: &Arc<VectorOverlayTileProvider>,
        tile: &'a mut T,
        missing_projections: &mut Vec<Projection>,
    ) -> Option<&'a mut VectorMappedTo3DTile> {
        let placeholder_tile = placeholder.get_tile(Rectangle::default(), Point::new(0.0, 0.0))?;

        if provider.is_placeholder() {
            return Some(push_mapping(tile, placeholder_tile, -1));
        }

        let projection = provider.projection();

        enum Precise {
            Known(usize, Rectangle),
            Missing(usize),
        }
        let precise = tile.overlay_details().map(|details| match details.find_rectangle_index(projection) {
            Some(index) => Precise::Known(index, details.rectangles[index]),
            None => Precise::Missing(details.projections.len()),
        });

        match precise {
            Some(Precise::Known(index, rectangle)) => {
                let pixels = target_screen_pixels(tile, projection, &rectangle, maximum_screen_space_error);
                add_real_tile(tile, provider, rectangle, pixels, index as i32)
            }
            Some(Precise::Missing(existing)) => {
                let index = existing as i32 + add_projection_to_list(missing_projections, projection);
                Some(push_mapping(tile, placeholder_tile, index))
            }
            None => {
                let index = add_projection_to_list(missing_projections, projection);
                match tile.bounding_rectangle(projection) {
                    Some(rectangle) => {
                        let pixels = target_screen_pixels(tile, projection, &rectangle, maximum_screen_space_error);
                        add_real_tile(tile, provider, rectangle, pixels, index)
                    }
                    None => Some(push_mapping(tile, placeholder_tile, index)),
                }
            }
        }
    }

    fn compute_translation_and_scale<T: GeometryTile>(&mut self, tile: &T) {
        let Some(ready) = &self.ready_tile else {
            return;
        };
        let Some(provider) = ready.provider() else {
            return;
        };
        let Some(geometry_rectangle) = tile
            .overlay_details()
            .and_then(|details| details.find_rectangle(provider.projection()).copied())
        else {
            return;
        };

        let overlay_rectangle = ready.rectangle();
        let (geometry_width, geometry_height) = (geometry_rectangle.width(), geometry_rectangle.height());
        let (overlay_width, overlay_height) = (overlay_rectangle.width(), overlay_rectangle.height());
        if geometry_width <= 0.0 || geometry_height <= 0.0 || overlay_width <= 0.0 || overlay_height <= 0.0 {
            return;
        }

        let scale_x = geometry_width / overlay_width;
        let scale_y = geometry_height / overlay_height;
        self.scale = Point::new(scale_x, scale_y);
        self.translation = Point::new(
            scale_x * (geometry_rectangle.min_x - overlay_rectangle.min_x) / geometry_width,
            scale_y * (geometry_rectangle.min_y - overlay_rectangle.min_y) / geometry_height,
        );
    }
}

/// Run [`VectorMappedTo3DTile::update`] on every mapping of `tile`
pub fn update_mapped_tiles<T, R>(renderer: &mut R, tile: &mut T)
where
    T: GeometryTile,
    R: OverlayAttachment<T> + ?Sized,
{
    let mut mapped = std::mem::take(tile.mapped_vector_tiles_mut());
    for mapping in &mut mapped {
        mapping.update(renderer, tile);
    }
    // Keep anything added while the list was out
    mapped.append(tile.mapped_vector_tiles_mut());
    *tile.mapped_vector_tiles_mut() = mapped;
}

/// Closest ancestor holding a loaded tile of the same overlay
fn find_loaded_ancestor_tile<T: GeometryTile>(tile: &T, overlay_id: u64) -> Option<Arc<VectorOverlayTile>> {
    let mut current = tile.parent();
    while let Some(ancestor) = current {
        if let Some(candidate) = find_tile_overlay(ancestor, overlay_id) {
            if candidate.state() >= LoadState::Loaded {
                return Some(candidate);
            }
        }
        current = ancestor.parent();
    }
    None
}

/// The overlay tile `tile` shows for an overlay, preferring one it is
/// loading over the one it draws
fn find_tile_overlay<T: GeometryTile>(tile: &T, overlay_id: u64) -> Option<Arc<VectorOverlayTile>> {
    tile.mapped_vector_tiles()
        .iter()
        .find(|mapping| {
            mapping
                .ready_tile
                .as_ref()
                .map_or(false, |ready| ready.overlay_id() == overlay_id)
        })
        .and_then(|mapping| mapping.loading_tile.clone().or_else(|| mapping.ready_tile.clone()))
}

fn push_mapping<T: GeometryTile>(
    tile: &mut T,
    overlay_tile: Arc<VectorOverlayTile>,
    texture_coordinate_index: i32,
) -> &mut VectorMappedTo3DTile {
    let mapped = tile.mapped_vector_tiles_mut();
    mapped.push(VectorMappedTo3DTile::new(overlay_tile, texture_coordinate_index));
    let last = mapped.len() - 1;
    &mut mapped[last]
}

fn add_real_tile<'a, T: GeometryTile>(
    tile: &'a mut T,
    provider: &Arc<VectorOverlayTileProvider>,
    rectangle: Rectangle,
    target_screen_pixels: Point,
    texture_coordinate_index: i32,
) -> Option<&'a mut VectorMappedTo3DTile> {
    let overlay_tile = provider.get_tile(rectangle, target_screen_pixels)?;
    if let Some(id) = tile.tile_id() {
        overlay_tile.set_tile_id(id.level, id.reverse_y(), id.x);
    }
    Some(push_mapping(tile, overlay_tile, texture_coordinate_index))
}

/// Index of `projection` in `projections`, appending it when absent
fn add_projection_to_list(projections: &mut Vec<Projection>, projection: Projection) -> i32 {
    match projections.iter().position(|p| *p == projection) {
        Some(index) => index as i32,
        None => {
            projections.push(projection);
            projections.len() as i32 - 1
        }
    }
}

/// Pixels the overlay needs across `rectangle` for the tile's error to stay
/// under `maximum_screen_space_error`
fn target_screen_pixels<T: GeometryTile>(
    tile: &T,
    projection: Projection,
    rectangle: &Rectangle,
    maximum_screen_space_error: f64,
) -> Point {
    let size = projection.projected_rectangle_size(rectangle);
    let error = non_zero_geometric_error(tile);
    Point::new(
        size.x * maximum_screen_space_error / error,
        size.y * maximum_screen_space_error / error,
    )
}

/// Geometric error of the tile, or half its nearest non-zero ancestor's per
/// level of distance
fn non_zero_geometric_error<T: GeometryTile>(tile: &T) -> f64 {
    let mut divisor = 1.0;
    let mut current = Some(tile);
    while let Some(t) = current {
        let error = t.geometric_error();
        if error > 0.0 {
            return error / divisor;
        }
        divisor *= 2.0;
        current = t.parent();
    }
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_projection_to_list() {
        let mut projections = vec![Projection::WebMercator];
        assert_eq!(add_projection_to_list(&mut projections, Projection::WebMercator), 0);
        assert_eq!(add_projection_to_list(&mut projections, Projection::Geographic), 1);
        assert_eq!(add_projection_to_list(&mut projections, Projection::Geographic), 1);
        assert_eq!(projections.len(), 2);
    }

    #[test]
    fn test_new_mapping_is_unattached() {
        let tile = Arc::new(VectorOverlayTile::new(
            std::sync::Weak::new(),
            1,
            Rectangle::new(0.0, 0.0, 1.0, 1.0),
            Point::new(256.0, 256.0),
        ));
        let mapping = VectorMappedTo3DTile::new(tile, 2);
        assert_eq!(mapping.state(), AttachmentState::Unattached);
        assert_eq!(mapping.texture_coordinate_index(), 2);
        assert!(mapping.ready_tile().is_none());
        assert_eq!(mapping.scale(), Point::new(1.0, 1.0));
        // No provider left to ask
        assert!(mapping.load_throttled());
    }
}
