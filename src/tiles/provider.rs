//! Overlay tile creation, loading and accounting
//!
//! A [`VectorOverlayTileProvider`] hands out [`VectorOverlayTile`]s for
//! rectangles, drives their loads through a [`TileDataLoader`], and keeps the
//! byte and in-flight counters the host uses for throttling.

use crate::core::config::VectorOverlayOptions;
use crate::core::projection::{Point, Projection};
use crate::core::rectangle::Rectangle;
use crate::mesh::triangulate_feature;
use crate::mvt::decoder::VectorTileDecoder;
use crate::mvt::model::VectorModel;
use crate::prelude::{Arc, BoxFuture, FutureExt, Mutex, Weak};
use crate::runtime::AsyncSystem;
use crate::tiles::fetch::{parse_tile_bounds, AssetAccessor, AssetResponse, Header, TILE_BOUNDS_HEADER};
use crate::tiles::tile::{LoadResult, LoadState, VectorOverlayTile};
use crate::traits::PrepareVectorResources;
use crate::{OverlayError, Result};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::MutexGuard;

/// Decoded data for one request, or the reasons there is none.
#[derive(Debug, Clone, Default)]
pub struct LoadedVectorOverlayData {
    pub model: Option<Arc<VectorModel>>,
    /// Projected rectangle the data covers
    pub rectangle: Rectangle,
    pub credits: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl LoadedVectorOverlayData {
    /// Nothing useful was loaded, and nothing went wrong either
    pub fn no_data(rectangle: Rectangle) -> Self {
        Self {
            rectangle,
            ..Self::default()
        }
    }

    pub fn failed(rectangle: Rectangle, error: impl Into<String>) -> Self {
        Self {
            rectangle,
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    /// Has a model and no errors. Warnings do not count against success.
    pub fn is_success(&self) -> bool {
        self.model.is_some() && self.errors.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        self.model.as_ref().map_or(0, |model| model.byte_size())
    }
}

/// Snapshot of a provider's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    /// Bytes held by tiles in `Loaded` or `Done`
    pub tile_data_bytes: i64,
    pub total_tiles_currently_loading: u32,
    pub throttled_tiles_currently_loading: u32,
}

/// Per-request parameters of [`ProviderContext::load_tile_data_from_url`]
#[derive(Debug, Clone, Default)]
pub struct UrlLoadOptions {
    pub rectangle: Rectangle,
    pub credits: Vec<String>,
    pub allow_empty_body: bool,
    pub level: u32,
    /// North-origin row
    pub row: u32,
    pub col: u32,
    pub source_name: String,
}

/// State shared by a provider and the loader behind it.
pub struct ProviderContext {
    pub overlay_id: u64,
    pub async_system: AsyncSystem,
    pub asset_accessor: Arc<dyn AssetAccessor>,
    pub prepare_resources: Option<Arc<dyn PrepareVectorResources>>,
    pub projection: Projection,
    /// Projected area the provider has data for
    pub coverage_rectangle: Rectangle,
    pub options: VectorOverlayOptions,
    pub credit: Option<String>,
    /// Stamped on every decoded model
    pub source_name: String,
    pub decoder: VectorTileDecoder,
}

impl ProviderContext {
    pub fn new(
        overlay_id: u64,
        async_system: AsyncSystem,
        asset_accessor: Arc<dyn AssetAccessor>,
        projection: Projection,
        coverage_rectangle: Rectangle,
        options: VectorOverlayOptions,
    ) -> Self {
        Self {
            overlay_id,
            async_system,
            asset_accessor,
            prepare_resources: None,
            projection,
            coverage_rectangle,
            options,
            credit: None,
            source_name: String::new(),
            decoder: VectorTileDecoder::new(),
        }
    }

    pub fn with_prepare_resources(mut self, prepare: Arc<dyn PrepareVectorResources>) -> Self {
        self.prepare_resources = Some(prepare);
        self
    }

    pub fn with_credit(mut self, credit: impl Into<String>) -> Self {
        self.credit = Some(credit.into());
        self
    }

    pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = source_name.into();
        self
    }

    /// Fetch and decode one payload. The request, decode and optional
    /// triangulation all run on a worker, starting immediately.
    pub fn load_tile_data_from_url(
        self: &Arc<Self>,
        url: String,
        headers: Vec<Header>,
        options: UrlLoadOptions,
    ) -> BoxFuture<'static, LoadedVectorOverlayData> {
        let context = self.clone();
        let rectangle = options.rectangle;
        let failed_url = url.clone();

        self.async_system
            .spawn_with_result(async move {
                let response = context.asset_accessor.get(&url, &headers).await;
                context.interpret_response(&url, response, options)
            })
            .map(move |result| {
                result.unwrap_or_else(|e| {
                    LoadedVectorOverlayData::failed(
                        rectangle,
                        format!("Vector request for {} failed: {}", failed_url, e),
                    )
                })
            })
            .boxed()
    }

    /// Turn a response (or the lack of one) into loaded data
    pub fn interpret_response(
        &self,
        url: &str,
        response: Result<AssetResponse>,
        options: UrlLoadOptions,
    ) -> LoadedVectorOverlayData {
        let rectangle = options.rectangle;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!("vector request for {} failed: {}", url, e);
                return LoadedVectorOverlayData::failed(
                    rectangle,
                    format!("Vector request for {} failed: {}", url, e),
                );
            }
        };

        let empty_model = || VectorModel {
            level: options.level,
            row: options.row,
            col: options.col,
            source_name: options.source_name.clone(),
            ..VectorModel::default()
        };
        let with_model = |model: VectorModel, warnings: Vec<String>| LoadedVectorOverlayData {
            model: Some(Arc::new(model)),
            rectangle,
            credits: options.credits.clone(),
            errors: Vec::new(),
            warnings,
        };

        // No content for this tile
        if response.status == 204 || response.status == 400 {
            debug!("{} returned {}, treating as empty", url, response.status);
            return with_model(empty_model(), Vec::new());
        }

        if !response.is_success() {
            let error = OverlayError::HttpStatus {
                status: response.status,
                url: url.to_string(),
            };
            info!("{}", error);
            return LoadedVectorOverlayData::failed(rectangle, error.to_string());
        }

        if response.body.is_empty() {
            if options.allow_empty_body {
                return with_model(empty_model(), Vec::new());
            }
            return LoadedVectorOverlayData::failed(
                rectangle,
                OverlayError::EmptyResponse(url.to_string()).to_string(),
            );
        }

        let decoded = self
            .decoder
            .decode(&response.body, options.level, options.row, options.col);
        let mut model = match decoded.model {
            Some(model) if decoded.errors.is_empty() => model,
            _ => {
                let mut errors = decoded.errors;
                errors.push(format!("tile url: {}", url));
                warn!("failed to decode {}: {}", url, errors[0]);
                return LoadedVectorOverlayData {
                    model: None,
                    rectangle,
                    credits: Vec::new(),
                    errors,
                    warnings: decoded.warnings,
                };
            }
        };

        model.source_name = options.source_name.clone();
        model.style.line_width = self.options.line_width;
        model.extent = response.header(TILE_BOUNDS_HEADER).and_then(parse_tile_bounds);

        if self.options.triangulate {
            let line_width = self.options.line_width;
            for feature in model.layers.iter_mut().flat_map(|l| l.features.iter_mut()) {
                feature.mesh = triangulate_feature(feature, line_width);
            }
        }

        debug!(
            "decoded {} features from {} ({} warnings)",
            model.feature_count(),
            url,
            decoded.warnings.len()
        );
        with_model(model, decoded.warnings)
    }
}

/// Produces the data for one overlay tile.
///
/// Called on the main thread. The returned future is awaited on a worker.
pub trait TileDataLoader: Send + Sync {
    fn load_tile_data(&self, tile: &VectorOverlayTile) -> BoxFuture<'static, LoadedVectorOverlayData>;
}

/// Creates, loads and accounts for the overlay tiles of one overlay.
pub struct VectorOverlayTileProvider {
    context: Arc<ProviderContext>,
    loader: Option<Arc<dyn TileDataLoader>>,
    placeholder: Option<Arc<VectorOverlayTile>>,
    stats: Mutex<ProviderStats>,
}

impl VectorOverlayTileProvider {
    pub fn new(context: Arc<ProviderContext>, loader: Arc<dyn TileDataLoader>) -> Arc<Self> {
        Arc::new(Self {
            context,
            loader: Some(loader),
            placeholder: None,
            stats: Mutex::new(ProviderStats::default()),
        })
    }

    /// Provider standing in for an overlay whose real provider is not ready.
    /// Every request gets the same placeholder tile.
    pub fn new_placeholder(context: Arc<ProviderContext>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let placeholder = VectorOverlayTile::placeholder(weak.clone(), context.overlay_id);
            Self {
                context,
                loader: None,
                placeholder: Some(Arc::new(placeholder)),
                stats: Mutex::new(ProviderStats::default()),
            }
        })
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }

    pub fn context(&self) -> &Arc<ProviderContext> {
        &self.context
    }

    pub fn overlay_id(&self) -> u64 {
        self.context.overlay_id
    }

    pub fn projection(&self) -> Projection {
        self.context.projection
    }

    pub fn coverage_rectangle(&self) -> Rectangle {
        self.context.coverage_rectangle
    }

    pub fn options(&self) -> &VectorOverlayOptions {
        &self.context.options
    }

    pub fn async_system(&self) -> &AsyncSystem {
        &self.context.async_system
    }

    fn lock_stats(&self) -> MutexGuard<'_, ProviderStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stats(&self) -> ProviderStats {
        *self.lock_stats()
    }

    /// Tile for `rectangle` at `target_screen_pixels`. `None` when the
    /// rectangle does not overlap the provider's coverage.
    pub fn get_tile(
        self: &Arc<Self>,
        rectangle: Rectangle,
        target_screen_pixels: Point,
    ) -> Option<Arc<VectorOverlayTile>> {
        if let Some(placeholder) = &self.placeholder {
            return Some(placeholder.clone());
        }
        if !rectangle.overlaps(&self.context.coverage_rectangle) {
            return None;
        }
        Some(Arc::new(VectorOverlayTile::new(
            Arc::downgrade(self),
            self.context.overlay_id,
            rectangle,
            target_screen_pixels,
        )))
    }

    /// Start loading `tile` if it is `Unloaded`, regardless of the throttle
    pub fn load_tile(self: &Arc<Self>, tile: &Arc<VectorOverlayTile>) {
        if tile.state() != LoadState::Unloaded {
            return;
        }
        self.do_load(tile, false);
    }

    /// Start loading `tile` unless the throttle is full. Returns `false` only
    /// when the load was refused.
    pub fn load_tile_throttled(self: &Arc<Self>, tile: &Arc<VectorOverlayTile>) -> bool {
        if tile.state() != LoadState::Unloaded {
            return true;
        }
        if self.lock_stats().throttled_tiles_currently_loading as usize
            >= self.context.options.maximum_simultaneous_tile_loads
        {
            return false;
        }
        self.do_load(tile, true);
        true
    }

    fn do_load(self: &Arc<Self>, tile: &Arc<VectorOverlayTile>, throttled: bool) {
        let Some(loader) = self.loader.clone() else {
            return;
        };

        tile.set_state(LoadState::Loading);
        self.begin_tile_load(throttled);

        let load = loader.load_tile_data(tile);
        let provider = self.clone();
        let weak_tile = Arc::downgrade(tile);
        let system = self.context.async_system.clone();
        let prepare = self.context.prepare_resources.clone();

        self.context.async_system.spawn(async move {
            let loaded = load.await;
            let result = create_load_result(loaded, prepare.as_deref());
            let _ = system.run_in_main(move || provider.finish_tile_load(&weak_tile, result, throttled));
        });
    }

    fn finish_tile_load(&self, tile: &Weak<VectorOverlayTile>, result: LoadResult, throttled: bool) {
        match tile.upgrade() {
            Some(tile) => {
                tile.apply_load_result(result);
                let bytes = tile.data_bytes();
                self.lock_stats().tile_data_bytes += bytes;
            }
            None => {
                debug!("overlay tile was released while loading, discarding its data");
                if let (Some(prepare), Some(resources)) =
                    (&self.context.prepare_resources, result.renderer_resources)
                {
                    prepare.free(Some(resources), None);
                }
            }
        }
        self.finalize_tile_load(throttled);
    }

    fn begin_tile_load(&self, throttled: bool) {
        let mut stats = self.lock_stats();
        stats.total_tiles_currently_loading += 1;
        if throttled {
            stats.throttled_tiles_currently_loading += 1;
        }
    }

    fn finalize_tile_load(&self, throttled: bool) {
        let mut stats = self.lock_stats();
        match stats.total_tiles_currently_loading.checked_sub(1) {
            Some(n) => stats.total_tiles_currently_loading = n,
            None => error!("tile load finished with no loads in flight"),
        }
        if throttled {
            match stats.throttled_tiles_currently_loading.checked_sub(1) {
                Some(n) => stats.throttled_tiles_currently_loading = n,
                None => error!("throttled tile load finished with no throttled loads in flight"),
            }
        }
    }

    /// Release what `tile` holds. Runs when the last reference to it drops.
    pub(crate) fn remove_tile(&self, tile: &VectorOverlayTile) {
        let bytes = tile.data_bytes();
        if bytes > 0 {
            let mut stats = self.lock_stats();
            stats.tile_data_bytes -= bytes;
            if stats.tile_data_bytes < 0 {
                error!("overlay tile byte count went negative ({})", stats.tile_data_bytes);
                stats.tile_data_bytes = 0;
            }
        }

        let state = tile.state();
        if let (Some(prepare), Some(resources)) =
            (&self.context.prepare_resources, tile.take_renderer_resources())
        {
            if state == LoadState::Done {
                prepare.free(None, Some(resources));
            } else {
                prepare.free(Some(resources), None);
            }
        }
    }
}

/// Worker-side half of a tile load
fn create_load_result(
    loaded: LoadedVectorOverlayData,
    prepare: Option<&dyn PrepareVectorResources>,
) -> LoadResult {
    let LoadedVectorOverlayData {
        model,
        rectangle,
        credits,
        errors,
        warnings,
    } = loaded;

    for warning in &warnings {
        debug!("overlay tile warning: {}", warning);
    }

    if !errors.is_empty() {
        info!("overlay tile failed to load: {}", errors.join("; "));
        return LoadResult {
            state: Some(LoadState::Failed),
            rectangle: Some(rectangle),
            errors,
            warnings,
            ..LoadResult::default()
        };
    }

    let Some(model) = model else {
        return LoadResult {
            state: Some(LoadState::Failed),
            rectangle: Some(rectangle),
            warnings,
            ..LoadResult::default()
        };
    };

    let renderer_resources = prepare.and_then(|prepare| prepare.prepare_in_load_thread(&model));
    LoadResult {
        state: Some(LoadState::Loaded),
        rectangle: Some(rectangle),
        model: Some(model),
        credits,
        errors,
        warnings,
        renderer_resources,
    }
}
