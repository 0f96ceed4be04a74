use crate::core::projection::Point;
use crate::core::rectangle::Rectangle;
use crate::mvt::model::VectorModel;
use crate::prelude::{Arc, Mutex, Weak};
use crate::tiles::provider::VectorOverlayTileProvider;
use crate::traits::RendererResources;
use std::sync::MutexGuard;

/// Lifecycle of a [`VectorOverlayTile`]. Ordering follows the numeric
/// values, so `state >= LoadState::Loaded` means "has data".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadState {
    /// Stand-in for a provider that is not ready yet; never loads
    Placeholder = -2,
    Failed = -1,
    Unloaded = 0,
    Loading = 1,
    /// Data is decoded and worker-side preparation is done
    Loaded = 2,
    /// Main-thread preparation is done too
    Done = 3,
}

/// Address the tile was requested for: (level, north-origin row, column)
pub type OverlayTileId = (u32, u32, u32);

/// Outcome of a load, produced on a worker and applied on the main thread.
#[derive(Default)]
pub(crate) struct LoadResult {
    pub(crate) state: Option<LoadState>,
    pub(crate) rectangle: Option<Rectangle>,
    pub(crate) model: Option<Arc<VectorModel>>,
    pub(crate) credits: Vec<String>,
    pub(crate) errors: Vec<String>,
    pub(crate) warnings: Vec<String>,
    pub(crate) renderer_resources: Option<RendererResources>,
}

struct TileInner {
    state: LoadState,
    rectangle: Rectangle,
    model: Option<Arc<VectorModel>>,
    credits: Vec<String>,
    errors: Vec<String>,
    warnings: Vec<String>,
    renderer_resources: Option<RendererResources>,
    tile_id: OverlayTileId,
}

/// One overlay tile requested for a rectangle at a target pixel density.
///
/// Tiles are shared through `Arc` by every mapping that uses them. Dropping
/// the last reference hands the tile back to its provider, which releases
/// its byte count and renderer resources.
pub struct VectorOverlayTile {
    overlay_id: u64,
    provider: Weak<VectorOverlayTileProvider>,
    target_screen_pixels: Point,
    inner: Mutex<TileInner>,
}

impl VectorOverlayTile {
    pub(crate) fn new(
        provider: Weak<VectorOverlayTileProvider>,
        overlay_id: u64,
        rectangle: Rectangle,
        target_screen_pixels: Point,
    ) -> Self {
        Self::with_state(provider, overlay_id, rectangle, target_screen_pixels, LoadState::Unloaded)
    }

    pub(crate) fn placeholder(provider: Weak<VectorOverlayTileProvider>, overlay_id: u64) -> Self {
        Self::with_state(
            provider,
            overlay_id,
            Rectangle::default(),
            Point::new(0.0, 0.0),
            LoadState::Placeholder,
        )
    }

    fn with_state(
        provider: Weak<VectorOverlayTileProvider>,
        overlay_id: u64,
        rectangle: Rectangle,
        target_screen_pixels: Point,
        state: LoadState,
    ) -> Self {
        Self {
            overlay_id,
            provider,
            target_screen_pixels,
            inner: Mutex::new(TileInner {
                state,
                rectangle,
                model: None,
                credits: Vec::new(),
                errors: Vec::new(),
                warnings: Vec::new(),
                renderer_resources: None,
                tile_id: (0, 0, 0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TileInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn overlay_id(&self) -> u64 {
        self.overlay_id
    }

    /// Owning provider, `None` once it has been dropped
    pub fn provider(&self) -> Option<Arc<VectorOverlayTileProvider>> {
        self.provider.upgrade()
    }

    pub fn state(&self) -> LoadState {
        self.lock().state
    }

    pub(crate) fn set_state(&self, state: LoadState) {
        self.lock().state = state;
    }

    pub fn rectangle(&self) -> Rectangle {
        self.lock().rectangle
    }

    pub fn target_screen_pixels(&self) -> Point {
        self.target_screen_pixels
    }

    pub fn model(&self) -> Option<Arc<VectorModel>> {
        self.lock().model.clone()
    }

    pub fn credits(&self) -> Vec<String> {
        self.lock().credits.clone()
    }

    /// Errors reported by the last load
    pub fn errors(&self) -> Vec<String> {
        self.lock().errors.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lock().warnings.clone()
    }

    pub fn renderer_resources(&self) -> Option<RendererResources> {
        self.lock().renderer_resources.clone()
    }

    pub(crate) fn take_renderer_resources(&self) -> Option<RendererResources> {
        self.lock().renderer_resources.take()
    }

    pub fn tile_id(&self) -> OverlayTileId {
        self.lock().tile_id
    }

    pub fn set_tile_id(&self, level: u32, row: u32, col: u32) {
        self.lock().tile_id = (level, row, col);
    }

    /// Bytes this tile's data accounts for in the provider's statistics
    pub(crate) fn data_bytes(&self) -> i64 {
        let inner = self.lock();
        if inner.state >= LoadState::Loaded {
            inner.model.as_ref().map_or(0, |m| m.byte_size() as i64)
        } else {
            0
        }
    }

    pub(crate) fn apply_load_result(&self, result: LoadResult) {
        let mut inner = self.lock();
        if let Some(state) = result.state {
            inner.state = state;
        }
        if let Some(rectangle) = result.rectangle {
            inner.rectangle = rectangle;
        }
        inner.model = result.model;
        inner.credits = result.credits;
        inner.errors = result.errors;
        inner.warnings = result.warnings;
        inner.renderer_resources = result.renderer_resources;
    }

    /// Run main-thread preparation for a `Loaded` tile and move it to `Done`.
    /// Does nothing in any other state.
    pub fn load_in_main_thread(&self) {
        let load_thread_result = {
            let mut inner = self.lock();
            if inner.state != LoadState::Loaded {
                return;
            }
            inner.renderer_resources.take()
        };

        // The tile lock is released while the host callback runs.
        let prepare = self
            .provider()
            .and_then(|provider| provider.context().prepare_resources.clone());
        let main_thread_result = match prepare {
            Some(prepare) => prepare.prepare_in_main_thread(self, load_thread_result),
            None => load_thread_result,
        };

        let mut inner = self.lock();
        inner.renderer_resources = main_thread_result;
        inner.state = LoadState::Done;
    }
}

impl std::fmt::Debug for VectorOverlayTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("VectorOverlayTile")
            .field("overlay_id", &self.overlay_id)
            .field("state", &inner.state)
            .field("rectangle", &inner.rectangle)
            .field("tile_id", &inner.tile_id)
            .field("has_model", &inner.model.is_some())
            .finish()
    }
}

impl Drop for VectorOverlayTile {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.upgrade() {
            provider.remove_tile(self);
        }
    }
}
