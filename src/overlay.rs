//! Overlay owner
//!
//! A [`VectorOverlay`] describes one vector data source and builds the
//! providers that serve it: a placeholder while the host is still setting
//! up, then the real quadtree provider.

use crate::core::config::VectorOverlayOptions;
use crate::core::projection::Projection;
use crate::core::rectangle::Rectangle;
use crate::core::tiling::QuadtreeTilingScheme;
use crate::prelude::Arc;
use crate::runtime::AsyncSystem;
use crate::tiles::fetch::AssetAccessor;
use crate::tiles::provider::{ProviderContext, VectorOverlayTileProvider};
use crate::tiles::quadtree::{QuadtreeLayout, QuadtreeVectorOverlayTileProvider};
use crate::tiles::source::{TileSource, WmtsSource, WmtsSourceOptions, XyzSource, XyzSourceOptions};
use crate::traits::PrepareVectorResources;
use crate::{OverlayError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OVERLAY_ID: AtomicU64 = AtomicU64::new(1);

/// Where an overlay's tiles come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverlaySource {
    Xyz { url: String, options: XyzSourceOptions },
    Wmts(WmtsSourceOptions),
}

impl OverlaySource {
    fn matrix_set(&self) -> &str {
        match self {
            OverlaySource::Xyz { options, .. } => &options.matrix_set,
            OverlaySource::Wmts(options) => &options.tile_matrix_set,
        }
    }

    fn credit(&self) -> Option<&String> {
        match self {
            OverlaySource::Xyz { options, .. } => options.credit.as_ref(),
            OverlaySource::Wmts(options) => options.credit.as_ref(),
        }
    }

    fn source_name(&self) -> &str {
        match self {
            OverlaySource::Xyz { options, .. } => &options.source_name,
            OverlaySource::Wmts(options) => &options.source_name,
        }
    }

    fn levels_and_tile_size(&self) -> (u32, u32, u32, u32) {
        match self {
            OverlaySource::Xyz { options, .. } => (
                options.minimum_level,
                options.maximum_level,
                options.tile_width,
                options.tile_height,
            ),
            OverlaySource::Wmts(options) => (
                options.minimum_level,
                options.maximum_level,
                options.tile_width,
                options.tile_height,
            ),
        }
    }
}

/// One vector overlay draped over a tileset
#[derive(Debug, Clone)]
pub struct VectorOverlay {
    id: u64,
    name: String,
    options: VectorOverlayOptions,
    source: OverlaySource,
}

impl VectorOverlay {
    pub fn new(name: impl Into<String>, source: OverlaySource, options: VectorOverlayOptions) -> Self {
        Self {
            id: NEXT_OVERLAY_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            options,
            source,
        }
    }

    /// Overlay over a `{z}/{x}/{y}` endpoint
    pub fn xyz(
        name: impl Into<String>,
        url: impl Into<String>,
        source_options: XyzSourceOptions,
        options: VectorOverlayOptions,
    ) -> Self {
        Self::new(
            name,
            OverlaySource::Xyz {
                url: url.into(),
                options: source_options,
            },
            options,
        )
    }

    /// Overlay over a WMTS endpoint
    pub fn wmts(name: impl Into<String>, source_options: WmtsSourceOptions, options: VectorOverlayOptions) -> Self {
        Self::new(name, OverlaySource::Wmts(source_options), options)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &VectorOverlayOptions {
        &self.options
    }

    pub fn source(&self) -> &OverlaySource {
        &self.source
    }

    /// Projection named by the source's tile matrix set
    pub fn projection(&self) -> Result<Projection> {
        let matrix_set = self.source.matrix_set();
        Projection::from_matrix_set(matrix_set)
            .ok_or_else(|| OverlayError::InvalidConfig(format!("unsupported tile matrix set '{}'", matrix_set)))
    }

    /// Provider that hands out the placeholder tile until the real one is
    /// ready. Shares this overlay's id.
    pub fn create_placeholder(
        &self,
        async_system: AsyncSystem,
        asset_accessor: Arc<dyn AssetAccessor>,
    ) -> Arc<VectorOverlayTileProvider> {
        let projection = self.projection().unwrap_or(Projection::Geographic);
        let coverage = projection.project_rectangle(&projection.maximum_globe_rectangle());
        let context = ProviderContext::new(
            self.id,
            async_system,
            asset_accessor,
            projection,
            coverage,
            self.options.clone(),
        );
        VectorOverlayTileProvider::new_placeholder(Arc::new(context))
    }

    /// Build the quadtree provider for this overlay's source
    pub fn create_tile_provider(
        &self,
        async_system: AsyncSystem,
        asset_accessor: Arc<dyn AssetAccessor>,
        prepare_resources: Option<Arc<dyn PrepareVectorResources>>,
    ) -> Result<Arc<VectorOverlayTileProvider>> {
        self.options.validate()?;
        let projection = self.projection()?;

        let (minimum_level, maximum_level, tile_width, tile_height) = self.source.levels_and_tile_size();
        if minimum_level > maximum_level {
            return Err(OverlayError::InvalidConfig(format!(
                "minimum_level {} is above maximum_level {}",
                minimum_level, maximum_level
            )));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(OverlayError::InvalidConfig("tile size must be non-zero".to_string()));
        }

        let scheme_rectangle: Rectangle = projection.project_rectangle(&projection.maximum_globe_rectangle());
        let (root_tiles_x, root_tiles_y) = projection.root_tiles();
        let layout = QuadtreeLayout {
            tiling_scheme: QuadtreeTilingScheme::new(scheme_rectangle, root_tiles_x, root_tiles_y),
            minimum_level,
            maximum_level,
            tile_width,
            tile_height,
        };

        let source: Arc<dyn TileSource> = match &self.source {
            OverlaySource::Xyz { url, options } => Arc::new(XyzSource::new(url.clone(), options.headers.clone())),
            OverlaySource::Wmts(options) => Arc::new(WmtsSource::new(options)),
        };

        let mut context = ProviderContext::new(
            self.id,
            async_system,
            asset_accessor,
            projection,
            scheme_rectangle,
            self.options.clone(),
        )
        .with_source_name(self.source.source_name());
        if let Some(credit) = self.source.credit() {
            context = context.with_credit(credit.clone());
        }
        if let Some(prepare) = prepare_resources {
            context = context.with_prepare_resources(prepare);
        }

        log::info!(
            "creating provider for overlay '{}' ({:?}, levels {}..={})",
            self.name,
            projection,
            minimum_level,
            maximum_level
        );
        Ok(QuadtreeVectorOverlayTileProvider::new(Arc::new(context), source, layout).into_provider())
    }
}
