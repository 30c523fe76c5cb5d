use std::sync::Arc;

use crate::ids::PositionId;
use crate::position::Position;

/// Classification of a route; selects rendering strategy and segmentation limits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Characteristic {
    Waypoints,
    Route,
    #[default]
    Track,
    Other,
}

/// Ordered positions tagged with a [`Characteristic`].
///
/// Positions are shared as `Arc` so snapshots are cheap; edits go through
/// [`Arc::make_mut`] and keep the position's id.
#[derive(Debug, Clone, Default)]
pub struct Route {
    pub characteristic: Characteristic,
    positions: Vec<Arc<Position>>,
}

impl Route {
    pub fn new(characteristic: Characteristic, positions: Vec<Position>) -> Self {
        Self {
            characteristic,
            positions: positions.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_shared(characteristic: Characteristic, positions: Vec<Arc<Position>>) -> Self {
        Self {
            characteristic,
            positions,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Arc<Position>] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut Vec<Arc<Position>> {
        &mut self.positions
    }

    pub fn into_positions(self) -> Vec<Arc<Position>> {
        self.positions
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Position>> {
        self.positions.get(index)
    }

    pub fn index_of(&self, id: PositionId) -> Option<usize> {
        self.positions.iter().position(|p| p.id() == id)
    }

    /// Mutable access to one position; clones it if a snapshot still shares it.
    pub fn edit(&mut self, index: usize) -> Option<&mut Position> {
        self.positions.get_mut(index).map(Arc::make_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::{Characteristic, Route};
    use crate::position::Position;

    #[test]
    fn edit_does_not_touch_snapshots() {
        let mut route = Route::new(Characteristic::Track, vec![Position::at(1.0, 2.0)]);
        let snapshot = route.positions().to_vec();
        let id = snapshot[0].id();

        route.edit(0).unwrap().longitude = Some(5.0);

        assert_eq!(snapshot[0].longitude, Some(1.0));
        assert_eq!(route.get(0).unwrap().longitude, Some(5.0));
        assert_eq!(route.index_of(id), Some(0));
    }
}
