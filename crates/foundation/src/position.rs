use crate::ids::PositionId;
use crate::math::orthodrome_distance;
use crate::time::Time;

/// A single editable route position.
///
/// Coordinates are optional: a position without longitude/latitude is valid
/// route content but is never rendered.
///
/// A clone is the same position, not a new one: it keeps the [`PositionId`]
/// so copy-on-write edits and id lookups still find it. Use
/// [`Position::duplicate`] for a separate position with the same content.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    id: PositionId,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub elevation: Option<f64>,
    pub time: Option<Time>,
    pub comment: Option<String>,
}

impl Position {
    pub fn new(longitude: Option<f64>, latitude: Option<f64>) -> Self {
        Self {
            id: PositionId::next(),
            longitude,
            latitude,
            elevation: None,
            time: None,
            comment: None,
        }
    }

    /// A position with both coordinates set.
    pub fn at(longitude: f64, latitude: f64) -> Self {
        Self::new(Some(longitude), Some(latitude))
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_time(mut self, time: Time) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn id(&self) -> PositionId {
        self.id
    }

    /// A copy of this position under a fresh id.
    pub fn duplicate(&self) -> Self {
        Self {
            id: PositionId::next(),
            ..self.clone()
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.longitude.is_some() && self.latitude.is_some()
    }

    /// `(longitude, latitude)` if both are present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.longitude?, self.latitude?))
    }

    pub fn distance_to(&self, other: &Position) -> Option<f64> {
        let (lon, lat) = other.coordinates()?;
        self.distance_to_coordinates(lon, lat)
    }

    pub fn distance_to_coordinates(&self, longitude: f64, latitude: f64) -> Option<f64> {
        let (lon, lat) = self.coordinates()?;
        Some(orthodrome_distance(lon, lat, longitude, latitude))
    }
}
