//! Shared fixtures for the integration tests: an in-memory asset accessor,
//! a tiny geometry tile tree and a renderer that records what it was asked
//! to do.
#![allow(dead_code)]

use async_trait::async_trait;
use prost::Message;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use vector_overlay::core::projection::Point;
use vector_overlay::mvt::decoder::{command_integer, zigzag_encode, CLOSE_PATH, LINE_TO, MOVE_TO};
use vector_overlay::mvt::proto;
use vector_overlay::tiles::{
    AssetAccessor, AssetResponse, Header, ProviderContext, QuadtreeLayout, QuadtreeVectorOverlayTileProvider,
    TileSource, VectorMappedTo3DTile, VectorOverlayTile, VectorOverlayTileProvider, XyzSource,
};
use vector_overlay::traits::{GeometryTile, OverlayAttachment, OverlayDetails, PrepareVectorResources, RendererResources};
use vector_overlay::{
    AsyncSystem, Projection, QuadtreeTileID, QuadtreeTilingScheme, Rectangle, Result, VectorModel,
    VectorOverlayOptions,
};

pub const WAIT: Duration = Duration::from_secs(5);
pub const OVERLAY_ID: u64 = 7;

/// Serves canned responses by URL; anything else is a 404.
#[derive(Default)]
pub struct MockAssetAccessor {
    responses: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    requests: Mutex<Vec<String>>,
}

impl MockAssetAccessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: impl Into<String>, status: u16, body: Vec<u8>) {
        self.responses.lock().unwrap().insert(url.into(), (status, body));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl AssetAccessor for MockAssetAccessor {
    async fn get(&self, url: &str, _headers: &[Header]) -> Result<AssetResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        let canned = self.responses.lock().unwrap().get(url).cloned();
        Ok(match canned {
            Some((status, body)) => AssetResponse::new(url, status, body),
            None => AssetResponse::new(url, 404, Vec::new()),
        })
    }
}

/// One layer holding a single 10x10 square polygon
pub fn square_tile(layer: &str) -> Vec<u8> {
    let mut geometry = vec![command_integer(MOVE_TO, 1), zigzag_encode(0), zigzag_encode(0)];
    geometry.push(command_integer(LINE_TO, 3));
    for (dx, dy) in [(10, 0), (0, 10), (-10, 0)] {
        geometry.push(zigzag_encode(dx));
        geometry.push(zigzag_encode(dy));
    }
    geometry.push(command_integer(CLOSE_PATH, 1));

    proto::Tile {
        layers: vec![proto::Layer {
            version: 2,
            name: layer.to_string(),
            features: vec![proto::Feature {
                id: Some(1),
                r#type: Some(proto::GeomType::Polygon as i32),
                geometry,
                ..Default::default()
            }],
            extent: Some(4096),
            ..Default::default()
        }],
    }
    .encode_to_vec()
}

/// Counts calls to each prepare hook
#[derive(Default)]
pub struct CountingPrepare {
    pub load_thread: AtomicUsize,
    pub main_thread: AtomicUsize,
    pub freed: AtomicUsize,
}

impl CountingPrepare {
    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }
}

impl PrepareVectorResources for CountingPrepare {
    fn prepare_in_load_thread(&self, model: &VectorModel) -> Option<RendererResources> {
        self.load_thread.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(model.feature_count()) as Arc<dyn Any + Send + Sync>)
    }

    fn prepare_in_main_thread(
        &self,
        _tile: &VectorOverlayTile,
        load_thread_result: Option<RendererResources>,
    ) -> Option<RendererResources> {
        self.main_thread.fetch_add(1, Ordering::SeqCst);
        load_thread_result
    }

    fn free(&self, load_thread_result: Option<RendererResources>, main_thread_result: Option<RendererResources>) {
        if load_thread_result.is_some() || main_thread_result.is_some() {
            self.freed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Provider context over the unit square in the geographic projection
pub fn unit_context(
    accessor: Arc<dyn AssetAccessor>,
    options: VectorOverlayOptions,
    prepare: Option<Arc<dyn PrepareVectorResources>>,
) -> Arc<ProviderContext> {
    let mut context = ProviderContext::new(
        OVERLAY_ID,
        AsyncSystem::with_threads(),
        accessor,
        Projection::Geographic,
        Rectangle::new(0.0, 0.0, 1.0, 1.0),
        options,
    )
    .with_credit("test data")
    .with_source_name("mock");
    if let Some(prepare) = prepare {
        context = context.with_prepare_resources(prepare);
    }
    Arc::new(context)
}

/// Single-root quadtree over the unit square with 256 pixel tiles
pub fn unit_layout(minimum_level: u32, maximum_level: u32) -> QuadtreeLayout {
    QuadtreeLayout {
        tiling_scheme: QuadtreeTilingScheme::new(Rectangle::new(0.0, 0.0, 1.0, 1.0), 1, 1),
        minimum_level,
        maximum_level,
        tile_width: 256,
        tile_height: 256,
    }
}

pub fn mock_source() -> Arc<dyn TileSource> {
    Arc::new(XyzSource::new("mock://{z}/{x}/{y}", Vec::new()))
}

pub fn unit_quadtree(context: Arc<ProviderContext>, maximum_level: u32) -> Arc<QuadtreeVectorOverlayTileProvider> {
    QuadtreeVectorOverlayTileProvider::new(context, mock_source(), unit_layout(0, maximum_level))
}

/// Rectangle of `tile` in the unit quadtree
pub fn cell(level: u32, x: u32, y: u32) -> Rectangle {
    unit_layout(0, level).tiling_scheme.tile_to_rectangle(QuadtreeTileID::new(level, x, y))
}

/// Act as the main thread until `done` holds or the wait runs out
pub fn pump_until(system: &AsyncSystem, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        system.dispatch_one_main_thread_task(Duration::from_millis(5));
    }
    true
}

/// Minimal geometry tile tree node
#[derive(Debug, Default)]
pub struct MockGeometryTile {
    pub parent: Option<Box<MockGeometryTile>>,
    pub mapped: Vec<VectorMappedTo3DTile>,
    pub details: Option<OverlayDetails>,
    pub bounding: Option<Rectangle>,
    pub error: f64,
    pub id: Option<QuadtreeTileID>,
}

impl MockGeometryTile {
    /// Loaded tile with a precise rectangle for `projection`
    pub fn loaded(projection: Projection, rectangle: Rectangle, error: f64) -> Self {
        Self {
            details: Some(OverlayDetails {
                projections: vec![projection],
                rectangles: vec![rectangle],
            }),
            error,
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: MockGeometryTile) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }
}

impl GeometryTile for MockGeometryTile {
    fn parent(&self) -> Option<&Self> {
        self.parent.as_deref()
    }

    fn mapped_vector_tiles(&self) -> &[VectorMappedTo3DTile] {
        &self.mapped
    }

    fn mapped_vector_tiles_mut(&mut self) -> &mut Vec<VectorMappedTo3DTile> {
        &mut self.mapped
    }

    fn overlay_details(&self) -> Option<&OverlayDetails> {
        self.details.as_ref()
    }

    fn bounding_rectangle(&self, _projection: Projection) -> Option<Rectangle> {
        self.bounding
    }

    fn geometric_error(&self) -> f64 {
        self.error
    }

    fn tile_id(&self) -> Option<QuadtreeTileID> {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentEvent {
    Attach {
        index: i32,
        overlay_rectangle: Rectangle,
        translation: Point,
        scale: Point,
    },
    Detach {
        index: i32,
        overlay_rectangle: Rectangle,
    },
}

/// Renderer stand-in that logs attach and detach calls
#[derive(Debug, Default)]
pub struct RecordingAttachment {
    pub events: Vec<AttachmentEvent>,
}

impl RecordingAttachment {
    pub fn attaches(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, AttachmentEvent::Attach { .. }))
            .count()
    }

    pub fn detaches(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, AttachmentEvent::Detach { .. }))
            .count()
    }
}

impl OverlayAttachment<MockGeometryTile> for RecordingAttachment {
    fn attach(
        &mut self,
        _tile: &mut MockGeometryTile,
        texture_coordinate_index: i32,
        overlay_tile: &VectorOverlayTile,
        translation: Point,
        scale: Point,
    ) {
        self.events.push(AttachmentEvent::Attach {
            index: texture_coordinate_index,
            overlay_rectangle: overlay_tile.rectangle(),
            translation,
            scale,
        });
    }

    fn detach(&mut self, _tile: &mut MockGeometryTile, texture_coordinate_index: i32, overlay_tile: &VectorOverlayTile) {
        self.events.push(AttachmentEvent::Detach {
            index: texture_coordinate_index,
            overlay_rectangle: overlay_tile.rectangle(),
        });
    }
}

/// Placeholder provider sharing the test overlay id
pub fn placeholder_for(context: &Arc<ProviderContext>) -> Arc<VectorOverlayTileProvider> {
    VectorOverlayTileProvider::new_placeholder(context.clone())
}
