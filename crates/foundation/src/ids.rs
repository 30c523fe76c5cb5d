use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identity of a position across edits and snapshots.
///
/// Positions are compared by id, never by value: two positions with the same
/// coordinates are still distinct route members.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionId(u64);

static NEXT_POSITION_ID: AtomicU64 = AtomicU64::new(1);

impl PositionId {
    /// Allocates a process-wide unique id.
    pub fn next() -> Self {
        PositionId(NEXT_POSITION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}
