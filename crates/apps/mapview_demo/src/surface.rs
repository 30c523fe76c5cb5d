use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use callback::InsertionMode;
use foundation::Position;
use mapview::{RenderCommand, RenderSurface, SurfaceError, SurfaceQuery};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Assumed travel speed for the distances reported back after directions (m/s).
const DEMO_SPEED: f64 = 13.9;

/// A headless surface that logs commands and talks back like a browser map would.
pub struct LoggingSurface {
    zoom: Option<i32>,
    answer_handshake: bool,
    /// Listener port, `-1` while buffering, `0` before the engine told us.
    port: AtomicI32,
    sequence: AtomicU64,
    buffer: Mutex<Vec<String>>,
}

impl LoggingSurface {
    pub fn new(zoom: Option<i32>, answer_handshake: bool) -> Self {
        Self {
            zoom,
            answer_handshake,
            port: AtomicI32::new(0),
            sequence: AtomicU64::new(0),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Sends a callback over the listener, or buffers it for polling.
    pub fn emit(&self, callback: &str) {
        let port = self.port.load(Ordering::SeqCst);
        match u16::try_from(port) {
            Ok(port) if port > 0 => {
                if let Err(err) = self.send(port, callback) {
                    warn!(port, error = %err, "cannot reach callback listener, buffering");
                    self.buffer.lock().push(callback.to_string());
                }
            }
            _ => self.buffer.lock().push(callback.to_string()),
        }
    }

    fn send(&self, port: u16, callback: &str) -> std::io::Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stream = TcpStream::connect(("127.0.0.1", port))?;
        write!(
            stream,
            "GET /{sequence}/{callback} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n\r\n"
        )?;
        debug!(sequence, %callback, "sent callback");
        Ok(())
    }

    fn report_directions(&self, origin: &Position, waypoints: &[std::sync::Arc<Position>], destination: &Position) {
        let mut meters = 0.0;
        let mut previous = origin;
        for next in waypoints.iter().map(|p| p.as_ref()).chain(std::iter::once(destination)) {
            meters += previous.distance_to(next).unwrap_or(0.0);
            previous = next;
        }
        self.emit(&format!("load/{}/{}", meters.round() as u64, (meters / DEMO_SPEED).round() as u64));
    }

    /// Answers a waypoint request with the midpoint of the leg.
    fn answer_insertion(&self, mode: InsertionMode, key: i32, from: &Position, to: &Position) {
        let (Some((from_lon, from_lat)), Some((to_lon, to_lat))) = (from.coordinates(), to.coordinates()) else {
            return;
        };
        let meters = from.distance_to(to).unwrap_or(0.0) / 2.0;
        self.emit(&format!(
            "{}: {key}/{}/{}/{}/{}/-",
            mode.header(),
            (from_lat + to_lat) / 2.0,
            (from_lon + to_lon) / 2.0,
            meters.round() as u64,
            (meters / DEMO_SPEED).round() as u64,
        ));
    }
}

impl RenderSurface for LoggingSurface {
    fn initialize(&self) -> Result<(), SurfaceError> {
        info!(zoom = ?self.zoom, "logging surface ready");
        Ok(())
    }

    fn is_visible(&self) -> bool {
        true
    }

    fn execute(&self, command: RenderCommand) -> Result<(), SurfaceError> {
        match &command {
            RenderCommand::Polyline { positions } | RenderCommand::Markers { positions } => {
                info!(command = command.name(), positions = positions.len());
            }
            RenderCommand::Directions {
                origin,
                destination,
                waypoints,
                start_index,
                last_segment,
                ..
            } => {
                info!(command = command.name(), waypoints = waypoints.len(), ?start_index, last_segment);
                self.report_directions(origin, waypoints, destination);
            }
            RenderCommand::SelectPositions { positions, center } => {
                info!(command = command.name(), positions = positions.len(), ?center);
            }
            RenderCommand::SetCallbackPort(port) => {
                self.port.store(*port, Ordering::SeqCst);
                info!(command = command.name(), port);
            }
            RenderCommand::CheckCallbackPort => {
                info!(command = command.name(), answer = self.answer_handshake);
                let port = self.port.load(Ordering::SeqCst);
                if self.answer_handshake && port > 0 {
                    self.emit(&format!("callback-port/{port}"));
                }
            }
            RenderCommand::InsertWaypoints {
                mode, key, from, to, ..
            } => {
                info!(command = command.name(), key);
                self.answer_insertion(*mode, *key, from, to);
            }
            other => info!(command = other.name()),
        }
        Ok(())
    }

    fn query(&self, query: SurfaceQuery) -> Result<Option<String>, SurfaceError> {
        Ok(match query {
            SurfaceQuery::ZoomLevel => self.zoom.map(|z| z.to_string()),
            SurfaceQuery::NorthEastBounds | SurfaceQuery::SouthWestBounds => None,
            SurfaceQuery::Callbacks => {
                let drained: Vec<String> = self.buffer.lock().drain(..).collect();
                (!drained.is_empty()).then(|| drained.join("--"))
            }
        })
    }
}
