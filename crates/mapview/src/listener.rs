use std::sync::Arc;

use parking_lot::RwLock;

/// Observer of engine events.
pub trait MapViewListener: Send + Sync {
    /// Running totals of the directions currently shown.
    fn calculated_distance(&self, meters: u64, seconds: u64);

    /// The surface acknowledged the callback listener on `port`.
    fn received_callback(&self, port: u16);

    fn selection_changed(&self, _indices: &[usize]) {}
}

/// Copy-on-write listener list; notification iterates a snapshot without holding the lock.
pub struct Listeners {
    inner: RwLock<Arc<[Arc<dyn MapViewListener>]>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::from(Vec::new())),
        }
    }

    pub fn add(&self, listener: Arc<dyn MapViewListener>) {
        let mut guard = self.inner.write();
        let mut next: Vec<_> = guard.iter().cloned().collect();
        next.push(listener);
        *guard = Arc::from(next);
    }

    /// Removes `listener` (by identity). Returns `true` if it was registered.
    pub fn remove(&self, listener: &Arc<dyn MapViewListener>) -> bool {
        let mut guard = self.inner.write();
        let before = guard.len();
        let next: Vec<_> = guard
            .iter()
            .filter(|l| !Arc::ptr_eq(l, listener))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *guard = Arc::from(next);
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Arc<[Arc<dyn MapViewListener>]> {
        Arc::clone(&self.inner.read())
    }

    pub fn calculated_distance(&self, meters: u64, seconds: u64) {
        for listener in self.snapshot().iter() {
            listener.calculated_distance(meters, seconds);
        }
    }

    pub fn received_callback(&self, port: u16) {
        for listener in self.snapshot().iter() {
            listener.received_callback(port);
        }
    }

    pub fn selection_changed(&self, indices: &[usize]) {
        for listener in self.snapshot().iter() {
            listener.selection_changed(indices);
        }
    }
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}
