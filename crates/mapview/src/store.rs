use std::sync::Arc;

use foundation::{Characteristic, GeoBounds, Position, PositionId, Route, Time};

/// Columns of the position table, as far as change notifications care.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    Description,
    Longitude,
    Latitude,
    Elevation,
    Time,
    All,
}

impl Column {
    /// Columns whose changes are visible on the map.
    pub fn is_rendered(self) -> bool {
        matches!(
            self,
            Column::Description | Column::Longitude | Column::Latitude | Column::All
        )
    }

    pub fn touches_coordinates(self) -> bool {
        matches!(self, Column::Longitude | Column::Latitude | Column::All)
    }
}

/// A single-field edit of one position.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Comment(Option<String>),
    Longitude(Option<f64>),
    Latitude(Option<f64>),
    Elevation(Option<f64>),
    Time(Option<Time>),
}

impl Edit {
    pub fn column(&self) -> Column {
        match self {
            Edit::Comment(_) => Column::Description,
            Edit::Longitude(_) => Column::Longitude,
            Edit::Latitude(_) => Column::Latitude,
            Edit::Elevation(_) => Column::Elevation,
            Edit::Time(_) => Column::Time,
        }
    }

    fn apply(self, position: &mut Position) {
        match self {
            Edit::Comment(v) => position.comment = v,
            Edit::Longitude(v) => position.longitude = v,
            Edit::Latitude(v) => position.latitude = v,
            Edit::Elevation(v) => position.elevation = v,
            Edit::Time(v) => position.time = v,
        }
    }
}

/// Notification about a change of the position list.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModelChange {
    Inserted { first: usize, last: usize },
    Deleted { first: usize, last: usize },
    Updated { first: usize, last: usize, column: Column },
    /// The whole list was replaced.
    AllRowsChanged,
    CharacteristicChanged,
}

/// The edited route. `None` until a route has been set.
#[derive(Debug, Default, Clone)]
pub struct PositionStore {
    route: Option<Route>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_route(&self) -> bool {
        self.route.is_some()
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn characteristic(&self) -> Characteristic {
        self.route
            .as_ref()
            .map(|r| r.characteristic)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.route.as_ref().map_or(0, Route::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn positions(&self) -> &[Arc<Position>] {
        match &self.route {
            Some(route) => route.positions(),
            None => &[],
        }
    }

    pub fn position(&self, row: usize) -> Option<&Arc<Position>> {
        self.route.as_ref()?.get(row)
    }

    pub fn index_of(&self, id: PositionId) -> Option<usize> {
        self.route.as_ref()?.index_of(id)
    }

    pub fn set_route(&mut self, route: Route) -> ModelChange {
        self.route = Some(route);
        ModelChange::AllRowsChanged
    }

    pub fn clear_route(&mut self) -> ModelChange {
        self.route = None;
        ModelChange::AllRowsChanged
    }

    pub fn set_characteristic(&mut self, characteristic: Characteristic) -> Option<ModelChange> {
        let route = self.route.as_mut()?;
        if route.characteristic == characteristic {
            return None;
        }
        route.characteristic = characteristic;
        Some(ModelChange::CharacteristicChanged)
    }

    /// Inserts at `row` (clamped to the end). Creates an empty route first if needed.
    pub fn add_position(&mut self, row: usize, position: Position) -> ModelChange {
        let route = self.route.get_or_insert_with(Route::default);
        let row = row.min(route.len());
        route.positions_mut().insert(row, Arc::new(position));
        ModelChange::Inserted {
            first: row,
            last: row,
        }
    }

    pub fn insert_positions(&mut self, row: usize, positions: Vec<Position>) -> Option<ModelChange> {
        if positions.is_empty() {
            return None;
        }
        let count = positions.len();
        let route = self.route.get_or_insert_with(Route::default);
        let row = row.min(route.len());
        route
            .positions_mut()
            .splice(row..row, positions.into_iter().map(Arc::new));
        Some(ModelChange::Inserted {
            first: row,
            last: row + count - 1,
        })
    }

    /// Removes the given rows; out-of-range and duplicate rows are ignored.
    pub fn remove_positions(&mut self, rows: &[usize]) -> Option<ModelChange> {
        let route = self.route.as_mut()?;
        let mut rows: Vec<usize> = rows.iter().copied().filter(|&r| r < route.len()).collect();
        rows.sort_unstable();
        rows.dedup();
        let (&first, &last) = (rows.first()?, rows.last()?);
        for row in rows.into_iter().rev() {
            route.positions_mut().remove(row);
        }
        Some(ModelChange::Deleted { first, last })
    }

    pub fn edit(&mut self, row: usize, edit: Edit) -> Option<ModelChange> {
        let column = edit.column();
        let position = self.route.as_mut()?.edit(row)?;
        edit.apply(position);
        Some(ModelChange::Updated {
            first: row,
            last: row,
            column,
        })
    }

    /// Copy-on-write access to the position at `row`. Changes fire no notification.
    pub fn position_mut(&mut self, row: usize) -> Option<&mut Position> {
        self.route.as_mut()?.edit(row)
    }

    /// Mutates the position carrying `id`; returns its row.
    pub fn edit_by_id(&mut self, id: PositionId, f: impl FnOnce(&mut Position)) -> Option<usize> {
        let route = self.route.as_mut()?;
        let row = route.index_of(id)?;
        f(route.edit(row)?);
        Some(row)
    }

    /// Row of the position closest to `(longitude, latitude)` within `threshold_m`.
    pub fn closest_position(&self, longitude: f64, latitude: f64, threshold_m: f64) -> Option<usize> {
        self.positions()
            .iter()
            .enumerate()
            .filter_map(|(row, p)| Some((row, p.distance_to_coordinates(longitude, latitude)?)))
            .filter(|(_, distance)| *distance <= threshold_m)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(row, _)| row)
    }

    /// Rows inside the rectangle spanned by two `(lon, lat)` corners.
    pub fn contained_positions(&self, north_east: (f64, f64), south_west: (f64, f64)) -> Vec<usize> {
        let bounds = GeoBounds::from_corners(north_east, south_west);
        self.positions()
            .iter()
            .enumerate()
            .filter(|(_, p)| bounds.contains_position(p))
            .map(|(row, _)| row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use foundation::{Characteristic, Position, Route};
    use pretty_assertions::assert_eq;

    use super::{Column, Edit, ModelChange, PositionStore};

    fn store(coords: &[(f64, f64)]) -> PositionStore {
        let mut store = PositionStore::new();
        store.set_route(Route::new(
            Characteristic::Track,
            coords.iter().map(|&(lon, lat)| Position::at(lon, lat)).collect(),
        ));
        store
    }

    #[test]
    fn insert_and_remove_report_ranges() {
        let mut s = store(&[(0.0, 0.0), (1.0, 0.0)]);
        assert_eq!(
            s.add_position(9, Position::at(2.0, 0.0)),
            ModelChange::Inserted { first: 2, last: 2 }
        );
        assert_eq!(
            s.insert_positions(1, vec![Position::at(0.5, 0.0), Position::at(0.7, 0.0)]),
            Some(ModelChange::Inserted { first: 1, last: 2 })
        );
        assert_eq!(s.len(), 5);
        assert_eq!(
            s.remove_positions(&[3, 1, 1, 42]),
            Some(ModelChange::Deleted { first: 1, last: 3 })
        );
        assert_eq!(s.len(), 3);
        assert_eq!(s.remove_positions(&[42]), None);
    }

    #[test]
    fn edits_keep_identity() {
        let mut s = store(&[(0.0, 0.0)]);
        let id = s.position(0).unwrap().id();
        assert_eq!(
            s.edit(0, Edit::Elevation(Some(12.0))),
            Some(ModelChange::Updated { first: 0, last: 0, column: Column::Elevation })
        );
        assert_eq!(s.index_of(id), Some(0));
        assert_eq!(s.position(0).unwrap().elevation, Some(12.0));
        assert_eq!(s.edit(3, Edit::Comment(None)), None);
    }

    #[test]
    fn closest_within_threshold() {
        let s = store(&[(0.0, 0.0), (0.001, 0.0), (0.002, 0.0)]);
        assert_eq!(s.closest_position(0.0011, 0.0, 50.0), Some(1));
        assert_eq!(s.closest_position(0.5, 0.0, 50.0), None);
    }

    #[test]
    fn contained_in_rectangle() {
        let s = store(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert_eq!(s.contained_positions((1.5, 1.5), (0.5, 0.5)), vec![1]);
    }

    #[test]
    fn characteristic_change_is_reported_once() {
        let mut s = store(&[]);
        assert_eq!(
            s.set_characteristic(Characteristic::Route),
            Some(ModelChange::CharacteristicChanged)
        );
        assert_eq!(s.set_characteristic(Characteristic::Route), None);
    }
}
