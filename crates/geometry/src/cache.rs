use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use foundation::Position;
use parking_lot::Mutex;
use tracing::debug;

use crate::significance::{SignificanceSet, significance_for_zoom};

/// Key used for an unknown zoom level.
const UNKNOWN_ZOOM: i32 = -1;

/// Per-zoom significance of the current route.
///
/// Every [`SignificanceCache::clear`] bumps the generation; a result computed
/// against an older generation is never stored.
#[derive(Debug, Default)]
pub struct SignificanceCache {
    generation: u64,
    by_zoom: BTreeMap<i32, Arc<SignificanceSet>>,
}

impl SignificanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.by_zoom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_zoom.is_empty()
    }

    pub fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.by_zoom.clear();
    }

    /// Cached set for `zoom`, if it was computed for `universe` positions.
    pub fn get(&self, zoom: Option<i32>, universe: usize) -> Option<Arc<SignificanceSet>> {
        self.by_zoom
            .get(&zoom.unwrap_or(UNKNOWN_ZOOM))
            .filter(|set| set.universe() == universe)
            .cloned()
    }

    /// Stores `set` unless the cache was cleared after `generation` was observed.
    pub fn insert_if_current(
        &mut self,
        generation: u64,
        zoom: Option<i32>,
        set: Arc<SignificanceSet>,
    ) -> bool {
        if generation != self.generation {
            return false;
        }
        self.by_zoom.insert(zoom.unwrap_or(UNKNOWN_ZOOM), set);
        true
    }
}

/// Source of significance sets for the reducer.
pub trait SignificanceLookup {
    fn significant(&self, positions: &[Arc<Position>], zoom: Option<i32>) -> Arc<SignificanceSet>;
}

/// Computes on every call.
#[derive(Debug, Default, Copy, Clone)]
pub struct Uncached;

impl SignificanceLookup for Uncached {
    fn significant(&self, positions: &[Arc<Position>], zoom: Option<i32>) -> Arc<SignificanceSet> {
        Arc::new(significance_for_zoom(positions, zoom))
    }
}

/// A shared cache as seen from a route snapshot taken at `generation`.
///
/// The cache lock is not held during computation.
#[derive(Debug, Copy, Clone)]
pub struct SnapshotCache<'a> {
    pub cache: &'a Mutex<SignificanceCache>,
    pub generation: u64,
}

impl<'a> SnapshotCache<'a> {
    pub fn new(cache: &'a Mutex<SignificanceCache>, generation: u64) -> Self {
        Self { cache, generation }
    }
}

impl SignificanceLookup for SnapshotCache<'_> {
    fn significant(&self, positions: &[Arc<Position>], zoom: Option<i32>) -> Arc<SignificanceSet> {
        {
            let cache = self.cache.lock();
            if cache.generation() == self.generation
                && let Some(set) = cache.get(zoom, positions.len())
            {
                return set;
            }
        }

        let start = Instant::now();
        let set = Arc::new(significance_for_zoom(positions, zoom));
        let stored = self
            .cache
            .lock()
            .insert_if_current(self.generation, zoom, Arc::clone(&set));
        debug!(
            zoom = zoom.unwrap_or(UNKNOWN_ZOOM),
            positions = positions.len(),
            significant = set.len(),
            stored,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "computed significant positions"
        );
        set
    }
}
