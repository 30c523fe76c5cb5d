use std::path::Path;
use std::time::Duration;

use geometry::ReductionSettings;
use serde::{Deserialize, Serialize};

use crate::error::MapViewError;
use crate::surface::TravelOptions;

/// Tuning of the map view engine.
///
/// Every field has a default, so a JSON file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapViewConfig {
    /// Longest wait of the route updater between checks (ms).
    pub route_wait_ms: u64,
    /// Minimum spacing of non-urgent route updates (ms).
    pub route_min_interval_ms: u64,
    /// Longest wait of the selection updater between checks (ms).
    pub selection_wait_ms: u64,
    /// Minimum spacing of non-urgent selection repaints (ms).
    pub selection_min_interval_ms: u64,

    pub polyline_segment_length: usize,
    pub max_polyline_positions: usize,
    pub directions_segment_length: usize,
    pub max_directions_positions: usize,
    pub marker_segment_length: usize,
    pub max_marker_positions: usize,
    pub max_selection_positions: usize,

    pub hard_position_cap: usize,
    pub render_viewport_factor: f64,
    pub selection_viewport_factor: f64,

    /// Use the loopback listener; when `false` the engine polls from the start.
    pub callback_listener: bool,
    pub accept_timeout_ms: u64,
    pub max_callback_connections: usize,
    /// How long to wait for the surface to acknowledge the listener port (ms).
    pub handshake_timeout_ms: u64,
    pub poll_interval_ms: u64,

    pub worker_threads: usize,
    pub max_pending_jobs: usize,
    /// Grace period for threads on shutdown (ms).
    pub shutdown_grace_ms: u64,

    /// Pause between two waypoint insertion requests (ms).
    pub waypoint_request_pause_ms: u64,
    /// Inserted waypoints closer than this to either stop are dropped (m).
    pub duplicate_distance_m: f64,

    pub recenter_after_zooming: bool,
    pub travel: TravelOptions,
}

impl Default for MapViewConfig {
    fn default() -> Self {
        Self {
            route_wait_ms: 1_000,
            route_min_interval_ms: 5_000,
            selection_wait_ms: 100,
            selection_min_interval_ms: 500,

            polyline_segment_length: 35,
            max_polyline_positions: 1_750,
            directions_segment_length: 8,
            max_directions_positions: 240,
            marker_segment_length: 10,
            max_marker_positions: 500,
            max_selection_positions: 50,

            hard_position_cap: 50_000,
            render_viewport_factor: 2.5,
            selection_viewport_factor: 1.25,

            callback_listener: true,
            accept_timeout_ms: 1_000,
            max_callback_connections: 16,
            handshake_timeout_ms: 5_000,
            poll_interval_ms: 250,

            worker_threads: 4,
            max_pending_jobs: 1_024,
            shutdown_grace_ms: 500,

            waypoint_request_pause_ms: 500,
            duplicate_distance_m: 10.0,

            recenter_after_zooming: false,
            travel: TravelOptions::default(),
        }
    }
}

impl MapViewConfig {
    pub fn from_json(json: &str) -> Result<Self, MapViewError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, MapViewError> {
        let json = std::fs::read_to_string(path).map_err(|source| MapViewError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn reduction(&self) -> ReductionSettings {
        ReductionSettings {
            hard_cap: self.hard_position_cap,
            render_viewport_factor: self.render_viewport_factor,
            selection_viewport_factor: self.selection_viewport_factor,
        }
    }

    pub fn route_wait(&self) -> Duration {
        Duration::from_millis(self.route_wait_ms)
    }

    pub fn route_min_interval(&self) -> Duration {
        Duration::from_millis(self.route_min_interval_ms)
    }

    pub fn selection_wait(&self) -> Duration {
        Duration::from_millis(self.selection_wait_ms)
    }

    pub fn selection_min_interval(&self) -> Duration {
        Duration::from_millis(self.selection_min_interval_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn waypoint_request_pause(&self) -> Duration {
        Duration::from_millis(self.waypoint_request_pause_ms)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::MapViewConfig;
    use crate::surface::TravelMode;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = MapViewConfig::from_json(
            r#"{ "max_selection_positions": 20, "travel": { "mode": "walking", "avoid_tolls": true } }"#,
        )
        .unwrap();
        assert_eq!(config.max_selection_positions, 20);
        assert_eq!(config.travel.mode, TravelMode::Walking);
        assert!(config.travel.avoid_tolls);
        assert!(!config.travel.avoid_highways);
        assert_eq!(config.polyline_segment_length, 35);
        assert_eq!(config.reduction().hard_cap, 50_000);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(MapViewConfig::from_json("{ nope").is_err());
    }
}
