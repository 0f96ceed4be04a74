use crate::core::rectangle::Rectangle;
use crate::core::tiling::QuadtreeTileID;
use crate::prelude::{Arc, BoxFuture, FutureExt, Mutex, Shared};
use crate::tiles::provider::LoadedVectorOverlayData;
use lru::LruCache;
use std::sync::MutexGuard;

/// What a quadtree tile request resolves to. When the tile itself had no
/// data, `loaded` is an ancestor's data and `subset` is the part of it the
/// request covers.
#[derive(Debug, Clone)]
pub struct LoadedQuadtreeData {
    pub loaded: Arc<LoadedVectorOverlayData>,
    pub subset: Option<Rectangle>,
}

impl LoadedQuadtreeData {
    pub fn new(loaded: LoadedVectorOverlayData) -> Self {
        Self {
            loaded: Arc::new(loaded),
            subset: None,
        }
    }

    pub fn failed(rectangle: Rectangle, error: impl Into<String>) -> Self {
        Self::new(LoadedVectorOverlayData::failed(rectangle, error))
    }
}

/// A cached, possibly still running, quadtree tile request
pub type SharedTileFuture = Shared<BoxFuture<'static, LoadedQuadtreeData>>;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub cached_bytes: i64,
    pub max_bytes: u64,
    pub entries: usize,
    /// Running total of bytes left in `cached_bytes` by evicting entries
    /// whose data was still shared
    pub stranded_bytes: i64,
    /// Cached tiles, least recently used first
    pub lru_order: Vec<QuadtreeTileID>,
}

struct CacheInner {
    entries: LruCache<QuadtreeTileID, SharedTileFuture>,
    cached_bytes: i64,
    stranded_bytes: i64,
    max_bytes: u64,
}

/// Byte-budgeted LRU cache of quadtree tile requests.
///
/// Entries are evicted least recently used first, but only once their
/// request has finished; in-flight requests are never dropped.
#[derive(Clone)]
pub struct QuadtreeTileCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl QuadtreeTileCache {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                cached_bytes: 0,
                stranded_bytes: 0,
                max_bytes,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a request and mark it most recently used
    pub fn get(&self, id: &QuadtreeTileID) -> Option<SharedTileFuture> {
        self.lock().entries.get(id).cloned()
    }

    /// Insert a request as the most recently used entry
    pub fn insert(&self, id: QuadtreeTileID, future: SharedTileFuture) {
        self.lock().entries.put(id, future);
    }

    pub fn contains(&self, id: &QuadtreeTileID) -> bool {
        self.lock().entries.contains(id)
    }

    /// Count bytes of data that finished loading
    pub fn add_bytes(&self, bytes: i64) {
        self.lock().cached_bytes += bytes;
    }

    pub fn cached_bytes(&self) -> i64 {
        self.lock().cached_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.lock().max_bytes
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict finished entries, oldest first, until the cache is back within
    /// budget or only in-flight entries are left. Returns how many went.
    pub fn unload_cached_tiles(&self) -> usize {
        let mut inner = self.lock();
        if inner.cached_bytes <= inner.max_bytes as i64 {
            return 0;
        }

        let oldest_first: Vec<QuadtreeTileID> = inner.entries.iter().rev().map(|(id, _)| *id).collect();
        let mut evicted = 0;

        for id in oldest_first {
            if inner.cached_bytes <= inner.max_bytes as i64 {
                break;
            }

            let finished = inner
                .entries
                .peek(&id)
                .and_then(|future| future.clone().now_or_never());
            let Some(data) = finished else {
                continue;
            };

            drop(inner.entries.pop(&id));
            evicted += 1;

            // Bytes go once nothing else shares the data. Data held outside
            // the cache, by a running compose say, keeps its bytes counted.
            if data.loaded.is_success() {
                let bytes = data.loaded.byte_size() as i64;
                if Arc::strong_count(&data.loaded) == 1 {
                    inner.cached_bytes -= bytes;
                } else {
                    inner.stranded_bytes += bytes;
                    log::debug!(
                        "evicted quadtree tile {:?} while its data is shared; {} bytes stay counted",
                        id,
                        bytes
                    );
                }
            }
            log::trace!("evicted quadtree tile {:?}", id);
        }

        if inner.cached_bytes > inner.max_bytes as i64 {
            log::debug!(
                "quadtree cache still over budget ({} / {} bytes) with {} entries in flight",
                inner.cached_bytes,
                inner.max_bytes,
                inner.entries.len()
            );
        }
        evicted
    }

    /// Entries whose request has finished
    pub fn ready_count(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|(_, future)| future.peek().is_some())
            .count()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            cached_bytes: inner.cached_bytes,
            max_bytes: inner.max_bytes,
            entries: inner.entries.len(),
            stranded_bytes: inner.stranded_bytes,
            lru_order: inner.entries.iter().rev().map(|(id, _)| *id).collect(),
        }
    }

    /// Drop every entry and reset the byte count
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.cached_bytes = 0;
        inner.stranded_bytes = 0;
    }
}

impl std::fmt::Debug for QuadtreeTileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("QuadtreeTileCache")
            .field("entries", &inner.entries.len())
            .field("cached_bytes", &inner.cached_bytes)
            .field("max_bytes", &inner.max_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::model::{VectorLayer, VectorModel};
    use futures::future;

    fn model_of_size(name_len: usize) -> Arc<VectorModel> {
        Arc::new(VectorModel {
            layers: vec![VectorLayer {
                name: "x".repeat(name_len),
                extent: 4096,
                features: Vec::new(),
            }],
            ..VectorModel::default()
        })
    }

    fn ready_entry(model: Arc<VectorModel>) -> (SharedTileFuture, i64) {
        let loaded = LoadedVectorOverlayData {
            model: Some(model),
            ..LoadedVectorOverlayData::default()
        };
        let bytes = loaded.byte_size() as i64;
        let data = LoadedQuadtreeData::new(loaded);
        (future::ready(data).boxed().shared(), bytes)
    }

    fn in_flight_entry() -> SharedTileFuture {
        future::pending::<LoadedQuadtreeData>().boxed().shared()
    }

    fn id(x: u32) -> QuadtreeTileID {
        QuadtreeTileID::new(4, x, 0)
    }

    fn insert_ready(cache: &QuadtreeTileCache, tile: QuadtreeTileID) -> i64 {
        let (future, bytes) = ready_entry(model_of_size(64));
        // Resolve once so the output is stored in the shared future
        assert!(future.clone().now_or_never().is_some());
        cache.insert(tile, future);
        cache.add_bytes(bytes);
        bytes
    }

    #[test]
    fn test_lru_order_tracks_access() {
        let cache = QuadtreeTileCache::new(u64::MAX);
        for x in 0..3 {
            insert_ready(&cache, id(x));
        }
        assert_eq!(cache.stats().lru_order, vec![id(0), id(1), id(2)]);

        assert!(cache.get(&id(0)).is_some());
        assert_eq!(cache.stats().lru_order, vec![id(1), id(2), id(0)]);
        assert!(cache.get(&id(9)).is_none());
    }

    #[test]
    fn test_evicts_oldest_over_budget() {
        let entry_bytes = ready_entry(model_of_size(64)).1;
        // Room for three entries, not four
        let cache = QuadtreeTileCache::new((entry_bytes * 3) as u64);

        for x in 0..4 {
            insert_ready(&cache, id(x));
        }
        assert_eq!(cache.cached_bytes(), entry_bytes * 4);

        assert_eq!(cache.unload_cached_tiles(), 1);
        assert!(!cache.contains(&id(0)));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.cached_bytes(), entry_bytes * 3);

        // Within budget: nothing to do
        assert_eq!(cache.unload_cached_tiles(), 0);
    }

    #[test]
    fn test_in_flight_entries_are_skipped() {
        let entry_bytes = ready_entry(model_of_size(64)).1;
        let cache = QuadtreeTileCache::new(0);

        cache.insert(id(0), in_flight_entry());
        insert_ready(&cache, id(1));
        cache.insert(id(2), in_flight_entry());
        assert_eq!(cache.cached_bytes(), entry_bytes);

        assert_eq!(cache.unload_cached_tiles(), 1);
        assert_eq!(cache.stats().lru_order, vec![id(0), id(2)]);
        assert_eq!(cache.cached_bytes(), 0);
        assert_eq!(cache.ready_count(), 0);
    }

    #[test]
    fn test_shared_data_keeps_its_bytes() {
        let cache = QuadtreeTileCache::new(0);
        let (parent, bytes) = ready_entry(model_of_size(64));
        let parent_data = parent.clone().now_or_never().unwrap();
        cache.insert(id(0), parent);
        cache.add_bytes(bytes);

        // A child served from the parent's data
        let child = LoadedQuadtreeData {
            loaded: parent_data.loaded.clone(),
            subset: Some(Rectangle::new(0.0, 0.0, 1.0, 1.0)),
        };
        drop(parent_data);
        cache.insert(id(1), future::ready(child).boxed().shared());
        assert!(cache.get(&id(1)).unwrap().now_or_never().is_some());

        assert_eq!(cache.unload_cached_tiles(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.cached_bytes(), 0);
    }

    #[test]
    fn test_bytes_of_data_held_elsewhere_are_stranded() {
        let cache = QuadtreeTileCache::new(0);
        let (entry, bytes) = ready_entry(model_of_size(64));
        let held = entry.clone().now_or_never().unwrap();
        cache.insert(id(0), entry);
        cache.add_bytes(bytes);

        assert_eq!(cache.unload_cached_tiles(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.cached_bytes(), bytes);
        assert_eq!(cache.stats().stranded_bytes, bytes);

        drop(held);
        assert_eq!(cache.cached_bytes(), bytes);
    }

    #[test]
    fn test_failed_entries_carry_no_bytes() {
        let cache = QuadtreeTileCache::new(0);
        insert_ready(&cache, id(0));
        let failed = LoadedQuadtreeData::failed(Rectangle::default(), "vector response code 404 for x");
        cache.insert(id(1), future::ready(failed).boxed().shared());

        // Back within budget once the successful entry is gone
        assert_eq!(cache.unload_cached_tiles(), 1);
        assert_eq!(cache.cached_bytes(), 0);
        assert!(cache.contains(&id(1)));

        cache.add_bytes(10);
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
