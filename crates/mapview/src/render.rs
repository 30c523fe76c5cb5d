//! Batching of reduced positions into surface commands.

use std::sync::Arc;

use foundation::{Characteristic, GeoBounds, Position};

use crate::config::MapViewConfig;
use crate::surface::{RenderCommand, TravelOptions};

/// Upper bound of rendered positions for a route of this characteristic.
pub fn max_positions(characteristic: Characteristic, config: &MapViewConfig) -> usize {
    match characteristic {
        Characteristic::Route => config.max_directions_positions,
        Characteristic::Waypoints => config.max_marker_positions,
        Characteristic::Track | Characteristic::Other => config.max_polyline_positions,
    }
}

/// Commands drawing `positions` the way `characteristic` asks for.
pub fn route_commands(
    characteristic: Characteristic,
    positions: &[Arc<Position>],
    config: &MapViewConfig,
    travel: TravelOptions,
    start_index: impl Fn(&Position) -> Option<usize>,
) -> Vec<RenderCommand> {
    match characteristic {
        Characteristic::Route => directions_commands(
            positions,
            config.directions_segment_length,
            travel,
            start_index,
            config.marker_segment_length,
        ),
        Characteristic::Waypoints => marker_commands(positions, config.marker_segment_length),
        Characteristic::Track | Characteristic::Other => polyline_commands(
            positions,
            config.polyline_segment_length,
            config.marker_segment_length,
        ),
    }
}

/// Polylines of `segment + 1` positions, each starting where the previous one ended.
pub fn polyline_commands(
    positions: &[Arc<Position>],
    segment: usize,
    marker_segment: usize,
) -> Vec<RenderCommand> {
    if positions.len() < 2 {
        return marker_commands(positions, marker_segment);
    }
    let segment = segment.max(1);
    let n = positions.len();
    let mut commands = Vec::with_capacity(n.div_ceil(segment) + 2);
    let mut start = 0;
    while start < n - 1 {
        let end = n.min(start + segment + 1);
        commands.push(RenderCommand::Polyline {
            positions: positions[start..end].to_vec(),
        });
        start += segment;
    }
    commands.push(RenderCommand::RemoveOverlays);
    commands.push(RenderCommand::RemoveDirections);
    commands
}

/// Directions legs; each leg's origin is the previous leg's destination.
pub fn directions_commands(
    positions: &[Arc<Position>],
    segment: usize,
    travel: TravelOptions,
    start_index: impl Fn(&Position) -> Option<usize>,
    marker_segment: usize,
) -> Vec<RenderCommand> {
    if positions.len() < 2 {
        return marker_commands(positions, marker_segment);
    }
    let segment = segment.max(2);
    let n = positions.len();
    let legs = n.div_ceil(segment);
    let mut commands = Vec::with_capacity(legs + 1);
    commands.push(RenderCommand::RemoveOverlays);
    for j in 0..legs {
        let start = (j * segment).saturating_sub(1);
        let end = n.min((j + 1) * segment) - 1;
        let origin = Arc::clone(&positions[start]);
        commands.push(RenderCommand::Directions {
            start_index: start_index(origin.as_ref()),
            origin,
            destination: Arc::clone(&positions[end]),
            waypoints: positions[start + 1..end].to_vec(),
            travel,
            last_segment: j == legs - 1,
        });
    }
    commands
}

pub fn marker_commands(positions: &[Arc<Position>], segment: usize) -> Vec<RenderCommand> {
    let mut commands: Vec<RenderCommand> = positions
        .chunks(segment.max(1))
        .map(|chunk| RenderCommand::Markers {
            positions: chunk.to_vec(),
        })
        .collect();
    commands.push(RenderCommand::RemoveOverlays);
    commands.push(RenderCommand::RemoveDirections);
    commands
}

/// Fit-bounds plus center over `positions`, if any has coordinates.
pub fn recenter_commands(positions: &[Arc<Position>]) -> Option<[RenderCommand; 2]> {
    let bounds = GeoBounds::of_positions(positions.iter().map(|p| p.as_ref()))?;
    Some([
        RenderCommand::FitBounds(bounds),
        RenderCommand::Center(bounds.center()),
    ])
}
