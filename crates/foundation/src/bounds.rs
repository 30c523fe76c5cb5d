use crate::position::Position;

/// Geographic bounding box in degrees.
///
/// Antimeridian crossing is not modelled: `west <= east` is assumed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoBounds {
    pub north: f64,
    pub east: f64,
    pub south: f64,
    pub west: f64,
}

impl GeoBounds {
    pub fn new(north: f64, east: f64, south: f64, west: f64) -> Self {
        Self {
            north,
            east,
            south,
            west,
        }
    }

    /// Builds bounds from a north-east and a south-west corner, `(lon, lat)` each.
    pub fn from_corners(north_east: (f64, f64), south_west: (f64, f64)) -> Self {
        Self::new(north_east.1, north_east.0, south_west.1, south_west.0)
    }

    /// Smallest bounds containing every position with coordinates.
    pub fn of_positions<'a, I>(positions: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Position>,
    {
        let mut bounds: Option<GeoBounds> = None;
        for (lon, lat) in positions.into_iter().filter_map(Position::coordinates) {
            bounds = Some(match bounds {
                None => GeoBounds::new(lat, lon, lat, lon),
                Some(b) => GeoBounds::new(
                    b.north.max(lat),
                    b.east.max(lon),
                    b.south.min(lat),
                    b.west.min(lon),
                ),
            });
        }
        bounds
    }

    pub fn north_east(&self) -> (f64, f64) {
        (self.east, self.north)
    }

    pub fn south_west(&self) -> (f64, f64) {
        (self.west, self.south)
    }

    /// Corners as `(lon, lat)` in the order north-east, north-west, south-east, south-west.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.east, self.north),
            (self.west, self.north),
            (self.east, self.south),
            (self.west, self.south),
        ]
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.east + self.west) / 2.0, (self.north + self.south) / 2.0)
    }

    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        longitude >= self.west
            && longitude <= self.east
            && latitude >= self.south
            && latitude <= self.north
    }

    pub fn contains_position(&self, position: &Position) -> bool {
        position
            .coordinates()
            .is_some_and(|(lon, lat)| self.contains(lon, lat))
    }

    /// Grows the box by `factor` times its width/height on every side.
    pub fn expanded(&self, factor: f64) -> Self {
        let width = (self.east - self.west) * factor;
        let height = (self.north - self.south) * factor;
        Self::new(
            self.north + height,
            self.east + width,
            self.south - height,
            self.west - width,
        )
    }
}
