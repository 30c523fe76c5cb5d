use std::sync::Arc;

use callback::{InsertionMode, RouteStep};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use foundation::Position;
use uuid::Uuid;

/// A leg waiting for the surface to compute its intermediate waypoints.
#[derive(Debug, Clone)]
pub struct PendingInsertion {
    pub mode: InsertionMode,
    pub predecessor: Arc<Position>,
    pub successor: Arc<Position>,
}

/// Outstanding insertion requests keyed by correlation key. Each key is consumed once.
#[derive(Debug, Default)]
pub struct PendingInsertions {
    pending: DashMap<i32, PendingInsertion>,
}

impl PendingInsertions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a leg under a fresh random key.
    pub fn register(&self, insertion: PendingInsertion) -> i32 {
        loop {
            match self.pending.entry(correlation_key()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(vacant) => {
                    let key = *vacant.key();
                    vacant.insert(insertion);
                    return key;
                }
            }
        }
    }

    /// Removes and returns the leg for `key`; `None` if unknown or already consumed.
    pub fn take(&self, key: i32) -> Option<PendingInsertion> {
        self.pending.remove(&key).map(|(_, insertion)| insertion)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&self) {
        self.pending.clear();
    }
}

/// Random 32-bit key from a v4 UUID.
pub fn correlation_key() -> i32 {
    let bytes = Uuid::new_v4().into_bytes();
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Positions to insert between `predecessor` and `successor` for the reported steps.
///
/// Times are derived backwards from the successor's time. Steps within
/// `duplicate_distance_m` of either stop are dropped. `comment` names steps
/// without an instruction by their step index.
pub fn build_insertion(
    steps: &[RouteStep],
    predecessor: &Position,
    successor: &Position,
    duplicate_distance_m: f64,
    comment: impl Fn(usize) -> String,
) -> Vec<Position> {
    let mut time = successor.time;
    let mut positions = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate().rev() {
        if let (Some(seconds), Some(t)) = (step.seconds, time) {
            time = Some(t.minus_seconds(seconds));
        }
        let mut position = Position::at(step.longitude, step.latitude);
        position.time = step.seconds.and(time);
        position.comment = Some(
            step.instruction
                .clone()
                .unwrap_or_else(|| comment(index)),
        );
        if !is_duplicate(predecessor, &position, duplicate_distance_m)
            && !is_duplicate(successor, &position, duplicate_distance_m)
        {
            positions.push(position);
        }
    }
    positions.reverse();
    positions
}

fn is_duplicate(stop: &Position, candidate: &Position, distance_m: f64) -> bool {
    stop.distance_to(candidate)
        .is_some_and(|distance| distance < distance_m)
}
