//! Overlay tiles backed by a quadtree tile service
//!
//! A geometry tile's rectangle is covered by every quadtree tile at the level
//! whose pixel density best matches the target screen pixels. Quadtree tile
//! requests are shared through a byte-budgeted LRU cache, and a tile the
//! server has no data for falls back to its parent, all the way up to the
//! minimum level.

use crate::constants::VERY_CLOSE_DIVISOR;
use crate::core::projection::Point;
use crate::core::rectangle::Rectangle;
use crate::core::tiling::{QuadtreeTileID, QuadtreeTilingScheme};
use crate::prelude::{Arc, BoxFuture, FutureExt, Weak};
use crate::tiles::cache::{CacheStats, LoadedQuadtreeData, QuadtreeTileCache, SharedTileFuture};
use crate::tiles::provider::{
    LoadedVectorOverlayData, ProviderContext, TileDataLoader, UrlLoadOptions, VectorOverlayTileProvider,
};
use crate::tiles::source::TileSource;
use crate::tiles::tile::VectorOverlayTile;
use futures::future::{join_all, ready};
use log::{debug, warn};

/// Shape of the quadtree a source is published in
#[derive(Debug, Clone, PartialEq)]
pub struct QuadtreeLayout {
    pub tiling_scheme: QuadtreeTilingScheme,
    pub minimum_level: u32,
    pub maximum_level: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

pub struct QuadtreeVectorOverlayTileProvider {
    weak_self: Weak<Self>,
    context: Arc<ProviderContext>,
    source: Arc<dyn TileSource>,
    layout: QuadtreeLayout,
    cache: QuadtreeTileCache,
}

impl QuadtreeVectorOverlayTileProvider {
    pub fn new(context: Arc<ProviderContext>, source: Arc<dyn TileSource>, layout: QuadtreeLayout) -> Arc<Self> {
        let cache = QuadtreeTileCache::new(context.options.sub_tile_cache_bytes);
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            context,
            source,
            layout,
            cache,
        })
    }

    /// Wrap in the generic provider the mapping layer works with
    pub fn into_provider(self: Arc<Self>) -> Arc<VectorOverlayTileProvider> {
        let context = self.context.clone();
        VectorOverlayTileProvider::new(context, self)
    }

    pub fn context(&self) -> &Arc<ProviderContext> {
        &self.context
    }

    pub fn layout(&self) -> &QuadtreeLayout {
        &self.layout
    }

    pub fn tiling_scheme(&self) -> &QuadtreeTilingScheme {
        &self.layout.tiling_scheme
    }

    pub fn minimum_level(&self) -> u32 {
        self.layout.minimum_level
    }

    pub fn maximum_level(&self) -> u32 {
        self.layout.maximum_level
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cached entries whose request has finished
    pub fn ready_cache_entries(&self) -> usize {
        self.cache.ready_count()
    }

    /// Quadtree level whose tiles give `target_screen_pixels` across
    /// `rectangle` at the configured screen-space error, clamped to the
    /// source's level range
    pub fn compute_level_from_target_screen_pixels(&self, rectangle: &Rectangle, target_screen_pixels: Point) -> u32 {
        let sse = self.context.options.maximum_screen_space_error;
        let raster_tiles_x = target_screen_pixels.x / sse / f64::from(self.layout.tile_width);
        let raster_tiles_y = target_screen_pixels.y / sse / f64::from(self.layout.tile_height);

        let target_tile_width = rectangle.width() / raster_tiles_x;
        let target_tile_height = rectangle.height() / raster_tiles_y;

        let scheme = &self.layout.tiling_scheme;
        let root_tile_width = scheme.rectangle().width() / f64::from(scheme.root_tiles_x());
        let root_tile_height = scheme.rectangle().height() / f64::from(scheme.root_tiles_y());

        let level_for = |root: f64, target: f64| -> f64 {
            let level = (root / target).log2().round();
            if level.is_finite() {
                level.max(0.0)
            } else if level > 0.0 {
                f64::from(self.layout.maximum_level)
            } else {
                0.0
            }
        };

        let level = level_for(root_tile_width, target_tile_width).max(level_for(root_tile_height, target_tile_height));
        (level as u32).clamp(self.layout.minimum_level, self.layout.maximum_level.max(self.layout.minimum_level))
    }

    /// Quadtree tiles covering `geometry_rectangle` at the level selected for
    /// `target_screen_pixels`.
    ///
    /// A rectangle outside the provider's coverage is clamped to the nearest
    /// coverage edge, so edge texels stretch over it. Pure: the same inputs
    /// always give the same tiles.
    pub fn tiles_for_rectangle(&self, geometry_rectangle: &Rectangle, target_screen_pixels: Point) -> Vec<QuadtreeTileID> {
        let scheme = &self.layout.tiling_scheme;
        let Some(bounds) = self.context.coverage_rectangle.intersection(scheme.rectangle()) else {
            warn!("provider coverage does not intersect its tiling scheme");
            return Vec::new();
        };

        let intersection = geometry_rectangle
            .intersection(&bounds)
            .unwrap_or_else(|| clamp_to_edge(geometry_rectangle, &bounds));

        let mut level = self.compute_level_from_target_screen_pixels(geometry_rectangle, target_screen_pixels);

        let (Some(mut south_west), Some(mut north_east)) = (
            scheme.position_to_tile(intersection.lower_left(), level),
            scheme.position_to_tile(intersection.upper_right(), level),
        ) else {
            return Vec::new();
        };

        // A corner sitting within 1/512 of the rectangle's size of a tile
        // edge does not pull in the tile on the far side of that edge.
        let very_close_x = geometry_rectangle.width() / VERY_CLOSE_DIVISOR;
        let very_close_y = geometry_rectangle.height() / VERY_CLOSE_DIVISOR;

        let south_west_rectangle = scheme.tile_to_rectangle(south_west);
        if (south_west_rectangle.max_y - intersection.min_y).abs() < very_close_y && south_west.y < north_east.y {
            south_west.y += 1;
        }
        if (south_west_rectangle.max_x - intersection.min_x).abs() < very_close_x && south_west.x < north_east.x {
            south_west.x += 1;
        }

        let north_east_rectangle = scheme.tile_to_rectangle(north_east);
        if (north_east_rectangle.min_y - intersection.max_y).abs() < very_close_y && north_east.y > south_west.y {
            north_east.y -= 1;
        }
        if (north_east_rectangle.min_x - intersection.max_x).abs() < very_close_x && north_east.x > south_west.x {
            north_east.x -= 1;
        }

        // Step up while the combined texture would be too large
        let max_texture_size = u64::from(self.context.options.maximum_texture_size);
        let too_large = |sw: &QuadtreeTileID, ne: &QuadtreeTileID| {
            let tiles_x = u64::from(ne.x - sw.x) + 1;
            let tiles_y = u64::from(ne.y - sw.y) + 1;
            tiles_x * u64::from(self.layout.tile_width) > max_texture_size
                || tiles_y * u64::from(self.layout.tile_height) > max_texture_size
        };
        while level > 0 && too_large(&south_west, &north_east) {
            let (Some(sw), Some(ne)) = (south_west.parent(), north_east.parent()) else {
                break;
            };
            south_west = sw;
            north_east = ne;
            level -= 1;
        }

        let mut tiles = Vec::new();
        for x in south_west.x..=north_east.x {
            for y in south_west.y..=north_east.y {
                let id = QuadtreeTileID::new(level, x, y);
                if scheme.tile_to_rectangle(id).intersection(&bounds).is_some() {
                    tiles.push(id);
                }
            }
        }
        tiles
    }

    /// Shared requests for every quadtree tile covering the rectangle
    pub fn map_vector_tiles_to_geometry_tile(
        &self,
        geometry_rectangle: &Rectangle,
        target_screen_pixels: Point,
    ) -> Vec<SharedTileFuture> {
        self.tiles_for_rectangle(geometry_rectangle, target_screen_pixels)
            .into_iter()
            .map(|id| self.get_quadtree_tile(id))
            .collect()
    }

    /// Cached request for `id`, starting one on a miss. Main thread only.
    pub fn get_quadtree_tile(&self, id: QuadtreeTileID) -> SharedTileFuture {
        if let Some(future) = self.cache.get(&id) {
            return future;
        }

        let future = self.request_tile(id);
        self.cache.insert(id, future.clone());
        self.cache.unload_cached_tiles();
        future
    }

    fn request_tile(&self, id: QuadtreeTileID) -> SharedTileFuture {
        let rectangle = self.layout.tiling_scheme.tile_to_rectangle(id);
        let url = self.source.url(id);
        debug!("requesting quadtree tile {:?} from {}", id, url);

        let options = UrlLoadOptions {
            rectangle,
            credits: self.context.credit.iter().cloned().collect(),
            allow_empty_body: self.context.options.allow_empty_body,
            level: id.level,
            row: id.reverse_y(),
            col: id.x,
            source_name: self.context.source_name.clone(),
        };
        let load = self
            .context
            .load_tile_data_from_url(url, self.source.headers().to_vec(), options);

        let weak_self = self.weak_self.clone();
        let system = self.context.async_system.clone();
        let minimum_level = self.layout.minimum_level;

        let chain = async move {
            let loaded = load.await;
            let next = system
                .run_in_main(move || -> BoxFuture<'static, LoadedQuadtreeData> {
                    let Some(this) = weak_self.upgrade() else {
                        return ready(LoadedQuadtreeData::new(loaded)).boxed();
                    };
                    if loaded.is_success() {
                        this.cache.add_bytes(loaded.byte_size() as i64);
                        return ready(LoadedQuadtreeData::new(loaded)).boxed();
                    }
                    match id.parent() {
                        Some(parent) if id.level > minimum_level => {
                            debug!("no data for quadtree tile {:?}, trying {:?}", id, parent);
                            this.get_quadtree_tile(parent)
                                .map(move |data| LoadedQuadtreeData {
                                    loaded: data.loaded,
                                    subset: Some(rectangle),
                                })
                                .boxed()
                        }
                        _ => ready(LoadedQuadtreeData::new(loaded)).boxed(),
                    }
                })
                .await;
            match next {
                Ok(data) => data.await,
                Err(e) => LoadedQuadtreeData::failed(rectangle, e.to_string()),
            }
        };

        self.context
            .async_system
            .spawn_with_result(chain)
            .map(move |result| result.unwrap_or_else(|e| LoadedQuadtreeData::failed(rectangle, e.to_string())))
            .boxed()
            .shared()
    }
}

/// Degenerate rectangle on the edge of `bounds` nearest to a disjoint
/// `rectangle`
fn clamp_to_edge(rectangle: &Rectangle, bounds: &Rectangle) -> Rectangle {
    let clamp_axis = |min: f64, max: f64, lower: f64, upper: f64| -> (f64, f64) {
        if min >= upper {
            (upper, upper)
        } else if max <= lower {
            (lower, lower)
        } else {
            (min.max(lower), max.min(upper))
        }
    };
    let (min_x, max_x) = clamp_axis(rectangle.min_x, rectangle.max_x, bounds.min_x, bounds.max_x);
    let (min_y, max_y) = clamp_axis(rectangle.min_y, rectangle.max_y, bounds.min_y, bounds.max_y);
    Rectangle::new(min_x, min_y, max_x, max_y)
}

impl TileDataLoader for QuadtreeVectorOverlayTileProvider {
    fn load_tile_data(&self, tile: &VectorOverlayTile) -> BoxFuture<'static, LoadedVectorOverlayData> {
        let rectangle = tile.rectangle();
        let requests = self.map_vector_tiles_to_geometry_tile(&rectangle, tile.target_screen_pixels());
        async move { compose_tiles(rectangle, join_all(requests).await) }.boxed()
    }
}

/// Combine the quadtree tiles covering one overlay tile.
///
/// When none of them loaded data of its own, the result is "no data" so the
/// mapping keeps showing ancestor data instead.
fn compose_tiles(rectangle: Rectangle, tiles: Vec<LoadedQuadtreeData>) -> LoadedVectorOverlayData {
    let has_own_data = tiles
        .iter()
        .any(|tile| tile.subset.is_none() && tile.loaded.model.is_some());

    let mut warnings: Vec<String> = Vec::new();
    for tile in &tiles {
        warnings.extend(tile.loaded.warnings.iter().cloned());
        warnings.extend(tile.loaded.errors.iter().cloned());
    }

    if !has_own_data {
        return LoadedVectorOverlayData {
            warnings,
            ..LoadedVectorOverlayData::no_data(rectangle)
        };
    }

    match tiles.iter().find(|tile| tile.loaded.model.is_some()) {
        Some(first) => LoadedVectorOverlayData {
            model: first.loaded.model.clone(),
            rectangle,
            credits: first.loaded.credits.clone(),
            errors: Vec::new(),
            warnings,
        },
        None => LoadedVectorOverlayData::no_data(rectangle),
    }
}
