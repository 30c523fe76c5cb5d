use std::sync::Arc;

use callback::InsertionMode;
use foundation::{GeoBounds, Position};
use serde::{Deserialize, Serialize};

use crate::error::SurfaceError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Bicycling,
}

/// Options handed to the surface whenever it computes directions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelOptions {
    pub mode: TravelMode,
    pub avoid_highways: bool,
    pub avoid_tolls: bool,
}

/// Fire-and-forget instructions for the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// One connected polyline; consecutive batches share their boundary position.
    Polyline { positions: Vec<Arc<Position>> },
    /// One directions leg with up to a segment's worth of intermediate waypoints.
    Directions {
        origin: Arc<Position>,
        destination: Arc<Position>,
        waypoints: Vec<Arc<Position>>,
        travel: TravelOptions,
        /// Index of `origin` in the full route, used to label distance callbacks.
        start_index: Option<usize>,
        last_segment: bool,
    },
    Markers { positions: Vec<Arc<Position>> },
    /// Draggable markers of the rendered selection, optionally centering the map.
    SelectPositions {
        positions: Vec<Arc<Position>>,
        center: Option<(f64, f64)>,
    },
    FitBounds(GeoBounds),
    /// `(longitude, latitude)`.
    Center((f64, f64)),
    /// Drops overlays that were replaced by the latest batches.
    RemoveOverlays,
    RemoveDirections,
    /// Port of the loopback listener, `-1` to switch the surface to buffering.
    SetCallbackPort(i32),
    /// Asks the surface to answer with `callback-port/<n>`.
    CheckCallbackPort,
    Print { with_route: bool },
    InsertWaypoints {
        mode: InsertionMode,
        key: i32,
        from: Arc<Position>,
        to: Arc<Position>,
        travel: TravelOptions,
    },
}

impl RenderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RenderCommand::Polyline { .. } => "polyline",
            RenderCommand::Directions { .. } => "directions",
            RenderCommand::Markers { .. } => "markers",
            RenderCommand::SelectPositions { .. } => "select-positions",
            RenderCommand::FitBounds(_) => "fit-bounds",
            RenderCommand::Center(_) => "center",
            RenderCommand::RemoveOverlays => "remove-overlays",
            RenderCommand::RemoveDirections => "remove-directions",
            RenderCommand::SetCallbackPort(_) => "set-callback-port",
            RenderCommand::CheckCallbackPort => "check-callback-port",
            RenderCommand::Print { .. } => "print",
            RenderCommand::InsertWaypoints { .. } => "insert-waypoints",
        }
    }
}

/// Round-trip questions to the surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SurfaceQuery {
    ZoomLevel,
    /// Answered as `"lat,lon"`.
    NorthEastBounds,
    /// Answered as `"lat,lon"`.
    SouthWestBounds,
    /// `--` separated callbacks buffered while no listener is reachable.
    Callbacks,
}

/// The scriptable map the engine draws on.
pub trait RenderSurface: Send + Sync {
    fn initialize(&self) -> Result<(), SurfaceError>;

    /// An invisible surface is skipped by both updaters.
    fn is_visible(&self) -> bool;

    fn execute(&self, command: RenderCommand) -> Result<(), SurfaceError>;

    fn query(&self, query: SurfaceQuery) -> Result<Option<String>, SurfaceError>;
}

/// Current zoom level, if the surface reports a parseable one.
pub fn query_zoom(surface: &dyn RenderSurface) -> Result<Option<i32>, SurfaceError> {
    Ok(surface
        .query(SurfaceQuery::ZoomLevel)?
        .and_then(|z| z.trim().parse().ok()))
}

/// Current map bounds from the two corner queries.
pub fn query_bounds(surface: &dyn RenderSurface) -> Result<Option<GeoBounds>, SurfaceError> {
    let north_east = surface
        .query(SurfaceQuery::NorthEastBounds)?
        .as_deref()
        .and_then(parse_lat_lon);
    let south_west = surface
        .query(SurfaceQuery::SouthWestBounds)?
        .as_deref()
        .and_then(parse_lat_lon);
    Ok(match (north_east, south_west) {
        (Some(ne), Some(sw)) => Some(GeoBounds::from_corners(ne, sw)),
        _ => None,
    })
}

/// Parses `"lat,lon"` into `(lon, lat)`.
pub fn parse_lat_lon(value: &str) -> Option<(f64, f64)> {
    let (lat, lon) = value.split_once(',')?;
    if lon.contains(',') {
        return None;
    }
    Some((lon.trim().parse().ok()?, lat.trim().parse().ok()?))
}
