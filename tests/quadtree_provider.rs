mod common;

use common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vector_overlay::core::projection::Point;
use vector_overlay::tiles::{AssetAccessor, AssetResponse, Header, WmtsSourceOptions};
use vector_overlay::{
    AsyncSystem, LoadState, QuadtreeTileID, Rectangle, Result, VectorOverlay, VectorOverlayOptions,
};

fn pixels(n: f64) -> Point {
    Point::new(n, n)
}

fn id(level: u32, x: u32, y: u32) -> QuadtreeTileID {
    QuadtreeTileID::new(level, x, y)
}

#[test]
fn test_exact_cell_maps_to_one_tile() {
    let context = unit_context(MockAssetAccessor::new(), VectorOverlayOptions::default(), None);
    let quadtree = unit_quadtree(context, 10);

    let tiles = quadtree.tiles_for_rectangle(&cell(5, 3, 7), pixels(512.0));
    assert_eq!(tiles, vec![id(5, 3, 7)]);
}

#[test]
fn test_level_grows_with_target_pixels() {
    let context = unit_context(MockAssetAccessor::new(), VectorOverlayOptions::default(), None);
    let quadtree = unit_quadtree(context, 3);
    let whole = Rectangle::new(0.0, 0.0, 1.0, 1.0);

    let levels: Vec<u32> = [512.0, 1024.0, 2048.0, 4096.0, 8192.0, 1.0e6]
        .iter()
        .map(|p| quadtree.compute_level_from_target_screen_pixels(&whole, pixels(*p)))
        .collect();
    assert_eq!(levels, vec![0, 1, 2, 3, 3, 3]);

    // Never below the minimum level, even for a tiny request
    let high_floor = vector_overlay::tiles::QuadtreeVectorOverlayTileProvider::new(
        unit_context(MockAssetAccessor::new(), VectorOverlayOptions::default(), None),
        mock_source(),
        unit_layout(2, 6),
    );
    assert_eq!(high_floor.compute_level_from_target_screen_pixels(&whole, pixels(1.0)), 2);
}

#[test]
fn test_tile_selection_is_repeatable() {
    let context = unit_context(MockAssetAccessor::new(), VectorOverlayOptions::default(), None);
    let quadtree = unit_quadtree(context, 12);
    let rectangle = Rectangle::new(0.1, 0.2, 0.37, 0.41);

    let first = quadtree.tiles_for_rectangle(&rectangle, pixels(900.0));
    let second = quadtree.tiles_for_rectangle(&rectangle, pixels(900.0));
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_texture_limit_steps_up_a_level() {
    let block = Rectangle::new(2.0 / 32.0, 2.0 / 32.0, 4.0 / 32.0, 4.0 / 32.0);

    let context = unit_context(MockAssetAccessor::new(), VectorOverlayOptions::default(), None);
    let roomy = unit_quadtree(context, 10);
    let mut tiles = roomy.tiles_for_rectangle(&block, pixels(1024.0));
    tiles.sort_by_key(|t| (t.x, t.y));
    assert_eq!(tiles, vec![id(5, 2, 2), id(5, 2, 3), id(5, 3, 2), id(5, 3, 3)]);

    let tight = VectorOverlayOptions {
        maximum_texture_size: 256,
        ..VectorOverlayOptions::default()
    };
    let context = unit_context(MockAssetAccessor::new(), tight, None);
    let limited = unit_quadtree(context, 10);
    assert_eq!(limited.tiles_for_rectangle(&block, pixels(1024.0)), vec![id(4, 1, 1)]);
}

#[test]
fn test_disjoint_rectangle_clamps_to_nearest_edge() {
    let context = unit_context(MockAssetAccessor::new(), VectorOverlayOptions::default(), None);
    let quadtree = unit_quadtree(context, 5);

    // The rectangle's height picks level 3; its rows land in the last column
    let east_of_coverage = Rectangle::new(2.0, 0.25, 3.0, 0.75);
    let tiles = quadtree.tiles_for_rectangle(&east_of_coverage, pixels(2048.0));
    assert_eq!(tiles, vec![id(3, 7, 2), id(3, 7, 3), id(3, 7, 4), id(3, 7, 5)]);

    // Square and below the coverage: level 2, bottom row
    let south_of_coverage = Rectangle::new(0.3, -2.0, 0.7, -1.6);
    let tiles = quadtree.tiles_for_rectangle(&south_of_coverage, pixels(819.2));
    assert_eq!(tiles, vec![id(2, 1, 0), id(2, 2, 0)]);
}

#[test]
fn test_missing_tiles_walk_to_the_root() {
    let accessor = MockAssetAccessor::new();
    let context = unit_context(accessor.clone(), VectorOverlayOptions::default(), None);
    let system = context.async_system.clone();
    let provider = unit_quadtree(context, 8).into_provider();

    let tile = provider.get_tile(cell(8, 0, 0), pixels(512.0)).unwrap();
    provider.load_tile(&tile);
    assert!(pump_until(&system, || tile.state() != LoadState::Loading));

    assert_eq!(tile.state(), LoadState::Failed);
    assert!(tile.errors().is_empty());
    assert_eq!(tile.warnings(), vec!["vector response code 404 for mock://0/0/0".to_string()]);

    // One request per level, each retry going to the previous tile's parent
    let expected: Vec<String> = (0..=8).rev().map(|level| format!("mock://{}/0/0", level)).collect();
    assert_eq!(accessor.requests(), expected);
    assert_eq!(accessor.requests()[1], "mock://7/0/0");
    assert_eq!(provider.stats().total_tiles_currently_loading, 0);
}

#[test]
fn test_loaded_tile_counts_its_bytes_until_dropped() {
    let accessor = MockAssetAccessor::new();
    accessor.respond("mock://0/0/0", 200, square_tile("water"));
    let context = unit_context(accessor.clone(), VectorOverlayOptions::default(), None);
    let system = context.async_system.clone();
    let quadtree = unit_quadtree(context, 0);
    let provider = quadtree.clone().into_provider();

    let whole = Rectangle::new(0.0, 0.0, 1.0, 1.0);
    let tile = provider.get_tile(whole, pixels(512.0)).unwrap();
    provider.load_tile(&tile);
    assert!(pump_until(&system, || tile.state() != LoadState::Loading));

    assert_eq!(tile.state(), LoadState::Loaded);
    let model = tile.model().unwrap();
    assert_eq!(model.feature_count(), 1);
    assert_eq!(model.source_name, "mock");
    assert_eq!(tile.rectangle(), whole);
    assert_eq!(tile.credits(), vec!["test data".to_string()]);

    let bytes = provider.stats().tile_data_bytes;
    assert_eq!(bytes, model.byte_size() as i64);
    assert_eq!(quadtree.cache_stats().cached_bytes, bytes);

    // A second tile over the same area reuses the cached request
    let again = provider.get_tile(whole, pixels(512.0)).unwrap();
    provider.load_tile(&again);
    assert!(pump_until(&system, || again.state() != LoadState::Loading));
    assert_eq!(accessor.request_count(), 1);
    assert_eq!(provider.stats().tile_data_bytes, bytes * 2);

    drop(tile);
    drop(again);
    assert_eq!(provider.stats().tile_data_bytes, 0);
}

#[test]
fn test_ancestor_data_alone_leaves_tile_failed() {
    let accessor = MockAssetAccessor::new();
    accessor.respond("mock://0/0/0", 200, square_tile("land"));
    let context = unit_context(accessor.clone(), VectorOverlayOptions::default(), None);
    let system = context.async_system.clone();
    let provider = unit_quadtree(context, 1).into_provider();

    let tile = provider.get_tile(cell(1, 0, 0), pixels(512.0)).unwrap();
    provider.load_tile(&tile);
    assert!(pump_until(&system, || tile.state() != LoadState::Loading));
    assert_eq!(tile.state(), LoadState::Failed);
    assert!(tile.model().is_none());
    assert_eq!(accessor.requests(), vec!["mock://1/0/0".to_string(), "mock://0/0/0".to_string()]);

    // The root is cached now; its other child only costs one request
    let sibling = provider.get_tile(cell(1, 1, 0), pixels(512.0)).unwrap();
    provider.load_tile(&sibling);
    assert!(pump_until(&system, || sibling.state() != LoadState::Loading));
    assert_eq!(sibling.state(), LoadState::Failed);
    assert_eq!(accessor.request_count(), 3);
}

/// Holds every request until the gate opens
struct GatedAccessor {
    open: AtomicBool,
    inner: Arc<MockAssetAccessor>,
}

#[async_trait::async_trait]
impl AssetAccessor for GatedAccessor {
    async fn get(&self, url: &str, headers: &[Header]) -> Result<AssetResponse> {
        while !self.open.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.inner.get(url, headers).await
    }
}

#[test]
fn test_throttled_loads_respect_the_limit() {
    let inner = MockAssetAccessor::new();
    inner.respond("mock://0/0/0", 200, square_tile("water"));
    let gated = Arc::new(GatedAccessor {
        open: AtomicBool::new(false),
        inner,
    });
    // Two throttled loads at a time
    let context = unit_context(gated.clone(), VectorOverlayOptions::for_testing(), None);
    let system = context.async_system.clone();
    let provider = unit_quadtree(context, 0).into_provider();

    let whole = Rectangle::new(0.0, 0.0, 1.0, 1.0);
    let tiles: Vec<_> = (0..4).map(|_| provider.get_tile(whole, pixels(512.0)).unwrap()).collect();

    assert!(provider.load_tile_throttled(&tiles[0]));
    assert!(provider.load_tile_throttled(&tiles[1]));
    assert!(!provider.load_tile_throttled(&tiles[2]));
    assert_eq!(tiles[2].state(), LoadState::Unloaded);
    assert_eq!(provider.stats().throttled_tiles_currently_loading, 2);

    // Unthrottled loads ignore the limit
    provider.load_tile(&tiles[3]);
    assert_eq!(provider.stats().total_tiles_currently_loading, 3);
    assert_eq!(provider.stats().throttled_tiles_currently_loading, 2);

    gated.open.store(true, Ordering::SeqCst);
    assert!(pump_until(&system, || provider.stats().total_tiles_currently_loading == 0));
    assert_eq!(provider.stats().throttled_tiles_currently_loading, 0);

    assert!(provider.load_tile_throttled(&tiles[2]));
    assert!(pump_until(&system, || tiles[2].state() != LoadState::Loading));
    assert_eq!(tiles[2].state(), LoadState::Loaded);

    // Already loaded: nothing to start, and not a refusal
    assert!(provider.load_tile_throttled(&tiles[0]));
}

#[test]
fn test_cache_evicts_finished_tiles_over_budget() {
    let accessor = MockAssetAccessor::new();
    accessor.respond("mock://1/0/0", 200, square_tile("a"));
    accessor.respond("mock://1/1/0", 200, square_tile("b"));
    let options = VectorOverlayOptions {
        sub_tile_cache_bytes: 1,
        ..VectorOverlayOptions::default()
    };
    let context = unit_context(accessor.clone(), options, None);
    let system = context.async_system.clone();
    let quadtree = unit_quadtree(context, 1);
    let provider = quadtree.clone().into_provider();

    let first = provider.get_tile(cell(1, 0, 0), pixels(512.0)).unwrap();
    provider.load_tile(&first);
    assert!(pump_until(&system, || first.state() != LoadState::Loading));
    assert_eq!(first.state(), LoadState::Loaded);
    assert!(quadtree.cache_stats().cached_bytes > 1);

    // Inserting the next request pushes the finished one out
    let second = provider.get_tile(cell(1, 1, 0), pixels(512.0)).unwrap();
    provider.load_tile(&second);
    let stats = quadtree.cache_stats();
    assert_eq!(stats.lru_order, vec![id(1, 1, 0)]);
    assert_eq!(stats.cached_bytes, 0);

    assert!(pump_until(&system, || second.state() != LoadState::Loading));
    assert_eq!(second.state(), LoadState::Loaded);
    // The evicted tile keeps its own copy of the data
    assert_eq!(first.model().unwrap().feature_count(), 1);

    let reload = provider.get_tile(cell(1, 0, 0), pixels(512.0)).unwrap();
    provider.load_tile(&reload);
    assert!(pump_until(&system, || reload.state() != LoadState::Loading));
    assert_eq!(accessor.request_count(), 3);
}

#[test]
fn test_wmts_overlay_requests_key_value_urls() {
    let accessor = MockAssetAccessor::new();
    let overlay = VectorOverlay::wmts(
        "roads",
        WmtsSourceOptions::new("mock://wmts", "roads"),
        VectorOverlayOptions::default(),
    );
    let system = AsyncSystem::with_threads();
    let provider = overlay.create_tile_provider(system.clone(), accessor.clone(), None).unwrap();

    let coverage = provider.coverage_rectangle();
    let west = Rectangle::new(coverage.min_x, coverage.min_y, coverage.center().x, coverage.max_y);
    let tile = provider.get_tile(west, pixels(512.0)).unwrap();
    provider.load_tile(&tile);
    assert!(pump_until(&system, || tile.state() != LoadState::Loading));
    assert_eq!(tile.state(), LoadState::Failed);

    let requests = accessor.requests();
    assert_eq!(requests.len(), 1);
    let url = &requests[0];
    assert!(url.starts_with("mock://wmts?Request=GetTile&Service=WMTS"));
    assert!(url.contains("Layer=roads"));
    assert!(url.contains("TileMatrix=EPSG:4326:0"));
    assert!(url.contains("TileCol=0&TileRow=0"));
}
