use foundation::{Position, Time};

use crate::error::EnrichError;

/// Which fields an enrichment job fills in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct EnrichFields {
    pub comment: bool,
    pub elevation: bool,
    pub time: bool,
    /// Replace an existing time instead of only filling a missing one.
    pub recompute_time: bool,
}

impl EnrichFields {
    pub const ALL: EnrichFields = EnrichFields {
        comment: true,
        elevation: true,
        time: true,
        recompute_time: false,
    };

    /// Elevation and time; comment lookups are rate limited upstream.
    pub const ELEVATION_AND_TIME: EnrichFields = EnrichFields {
        comment: false,
        elevation: true,
        time: true,
        recompute_time: false,
    };

    pub const TIME: EnrichFields = EnrichFields {
        comment: false,
        elevation: false,
        time: true,
        recompute_time: false,
    };

    /// Time of positions that were moved; their old time no longer fits.
    pub const RECOMPUTE_TIME: EnrichFields = EnrichFields {
        comment: false,
        elevation: false,
        time: true,
        recompute_time: true,
    };
}

/// Best-effort lookups that complete new or moved positions.
///
/// Every lookup may fail independently; a failure leaves the field unset.
pub trait Enricher: Send + Sync {
    /// Placeholder comment for the `number`th position.
    fn create_comment(&self, number: usize) -> String {
        format!("Position {number}")
    }

    fn complement_comment(&self, _longitude: f64, _latitude: f64) -> Result<Option<String>, EnrichError> {
        Ok(None)
    }

    fn complement_elevation(&self, _longitude: f64, _latitude: f64) -> Result<Option<f64>, EnrichError> {
        Ok(None)
    }

    /// Time of `position` given its neighbours in the route.
    fn complement_time(
        &self,
        previous: Option<&Position>,
        position: &Position,
        next: Option<&Position>,
    ) -> Result<Option<Time>, EnrichError> {
        Ok(interpolate_time(previous, position, next))
    }
}

/// Enricher without external services: placeholder comments and interpolated times.
#[derive(Debug, Default, Copy, Clone)]
pub struct LocalEnricher;

impl Enricher for LocalEnricher {}

/// Time at `position` by distance-weighted interpolation between timed neighbours.
pub fn interpolate_time(
    previous: Option<&Position>,
    position: &Position,
    next: Option<&Position>,
) -> Option<Time> {
    let previous = previous?;
    let next = next?;
    let (start, end) = (previous.time?, next.time?);
    let before = previous.distance_to(position)?;
    let after = position.distance_to(next)?;
    let total = before + after;
    let fraction = if total > 0.0 { before / total } else { 0.5 };
    Some(start.lerp(end, fraction))
}

#[cfg(test)]
mod tests {
    use foundation::{Position, Time};

    use super::{Enricher, LocalEnricher, interpolate_time};

    #[test]
    fn interpolates_by_distance() {
        let a = Position::at(0.0, 0.0).with_time(Time(0.0));
        let b = Position::at(1.0, 0.0);
        let c = Position::at(4.0, 0.0).with_time(Time(100.0));
        let t = interpolate_time(Some(&a), &b, Some(&c)).unwrap();
        assert!((t.seconds() - 25.0).abs() < 0.5, "got {t:?}");
    }

    #[test]
    fn needs_both_timed_neighbours() {
        let a = Position::at(0.0, 0.0);
        let b = Position::at(1.0, 0.0);
        let c = Position::at(2.0, 0.0).with_time(Time(10.0));
        assert_eq!(interpolate_time(Some(&a), &b, Some(&c)), None);
        assert_eq!(interpolate_time(None, &b, Some(&c)), None);
    }

    #[test]
    fn local_enricher_defaults() {
        let enricher = LocalEnricher;
        assert_eq!(enricher.create_comment(7), "Position 7");
        assert_eq!(enricher.complement_elevation(1.0, 2.0).unwrap(), None);
    }
}
