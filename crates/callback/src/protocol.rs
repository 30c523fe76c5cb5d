//! Callback grammar of the rendering surface.
//!
//! Every callback is a single line such as `move-position/3/53.55/9.99`.
//! Coordinates travel latitude first. Lines that match no shape, or whose
//! arguments do not parse, are ignored by the caller.

use std::sync::LazyLock;

use regex::Regex;

static REQUEST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(GET|OPTIONS|POST) /(\d+)/(.*) HTTP.+$").expect("request line pattern is valid")
});

static INSERTION_RESULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Insert-All-Waypoints|Insert-Only-Turnpoints): (-?\d+)/(.*)$")
        .expect("insertion result pattern is valid")
});

/// How a pending waypoint insertion asked the surface to fill in a leg.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum InsertionMode {
    /// Every intermediate point of the computed directions.
    AllWaypoints,
    /// Only the points where the directions turn.
    OnlyTurnpoints,
}

impl InsertionMode {
    pub fn header(self) -> &'static str {
        match self {
            InsertionMode::AllWaypoints => "Insert-All-Waypoints",
            InsertionMode::OnlyTurnpoints => "Insert-Only-Turnpoints",
        }
    }

    pub fn from_header(header: &str) -> Option<Self> {
        match header {
            "Insert-All-Waypoints" => Some(InsertionMode::AllWaypoints),
            "Insert-Only-Turnpoints" => Some(InsertionMode::OnlyTurnpoints),
            _ => None,
        }
    }
}

/// One leg point of an insertion result.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStep {
    pub latitude: f64,
    pub longitude: f64,
    pub meters: Option<f64>,
    /// Travel time from this step to the next one; zero is reported as `None`.
    pub seconds: Option<f64>,
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    /// `load/<meters>/<seconds>`: progress of a directions batch.
    RouteProgress { meters: u64, seconds: u64 },
    /// `insert-position/<row>/<lat>/<lon>`: `row` is already the insertion row (clicked row + 1).
    InsertPosition { row: usize, longitude: f64, latitude: f64 },
    /// `add-position/<lat>/<lon>`
    AddPosition { longitude: f64, latitude: f64 },
    /// `move-position/<renderedIndex>/<lat>/<lon>`: index into the last rendered selection.
    MovePosition { rendered_index: usize, longitude: f64, latitude: f64 },
    /// `delete-position/<lat>/<lon>/<threshold>`
    DeletePosition { longitude: f64, latitude: f64, threshold_m: f64 },
    /// `select-position/<lat>/<lon>/<threshold>/<replace>`
    SelectPosition { longitude: f64, latitude: f64, threshold_m: f64, replace: bool },
    /// `select-positions/<neLat>/<neLon>/<swLat>/<swLon>/<replace>`; corners are `(lon, lat)`.
    SelectPositions { north_east: (f64, f64), south_west: (f64, f64), replace: bool },
    /// `maptypechanged/<type>`
    MapTypeChanged(String),
    /// `zoomchanged`
    ZoomChanged,
    /// `centerchanged`
    CenterChanged,
    /// `callback-port/<n>`: the surface acknowledged the listener port.
    CallbackPort(u16),
    /// `<mode>: <key>/<lat>/<lon>/<meters>/<seconds>/<instruction>/...`
    InsertionResult { mode: InsertionMode, key: i32, steps: Vec<RouteStep> },
}

impl Callback {
    /// Parses one callback line. Shapes are tried in a fixed order; the first match wins.
    pub fn parse(line: &str) -> Option<Callback> {
        if let Some(caps) = INSERTION_RESULT.captures(line) {
            let mode = InsertionMode::from_header(&caps[1])?;
            let key = caps[2].parse().ok()?;
            return Some(Callback::InsertionResult {
                mode,
                key,
                steps: parse_steps(&caps[3]),
            });
        }

        let (name, rest) = match line.split_once('/') {
            Some((name, rest)) => (name, Some(rest)),
            None => (line, None),
        };
        let args: Vec<&str> = rest.map(|r| r.split('/').collect()).unwrap_or_default();

        let callback = match (name, args.as_slice()) {
            ("load", [meters, seconds]) => Callback::RouteProgress {
                meters: parse_count(meters)?,
                seconds: parse_count(seconds)?,
            },
            ("insert-position", [row, lat, lon]) => Callback::InsertPosition {
                row: row.trim().parse::<usize>().ok()?.checked_add(1)?,
                longitude: parse_f64(lon)?,
                latitude: parse_f64(lat)?,
            },
            ("add-position", [lat, lon]) => Callback::AddPosition {
                longitude: parse_f64(lon)?,
                latitude: parse_f64(lat)?,
            },
            ("move-position", [index, lat, lon]) => Callback::MovePosition {
                rendered_index: index.trim().parse().ok()?,
                longitude: parse_f64(lon)?,
                latitude: parse_f64(lat)?,
            },
            ("delete-position", [lat, lon, threshold]) => Callback::DeletePosition {
                longitude: parse_f64(lon)?,
                latitude: parse_f64(lat)?,
                threshold_m: parse_f64(threshold)?,
            },
            ("select-position", [lat, lon, threshold, replace]) => Callback::SelectPosition {
                longitude: parse_f64(lon)?,
                latitude: parse_f64(lat)?,
                threshold_m: parse_f64(threshold)?,
                replace: parse_bool(replace),
            },
            ("select-positions", [ne_lat, ne_lon, sw_lat, sw_lon, replace]) => {
                Callback::SelectPositions {
                    north_east: (parse_f64(ne_lon)?, parse_f64(ne_lat)?),
                    south_west: (parse_f64(sw_lon)?, parse_f64(sw_lat)?),
                    replace: parse_bool(replace),
                }
            }
            ("maptypechanged", [map_type]) => Callback::MapTypeChanged((*map_type).to_string()),
            ("zoomchanged", []) => Callback::ZoomChanged,
            ("centerchanged", []) => Callback::CenterChanged,
            ("callback-port", [port]) if is_digits(port) => Callback::CallbackPort(port.parse().ok()?),
            _ => return None,
        };
        Some(callback)
    }

    /// Whether a batch of lines stops after this callback.
    ///
    /// An insertion result with steps may be followed by further body lines;
    /// one without steps ends the batch like every other callback.
    pub fn is_terminal(&self) -> bool {
        match self {
            Callback::InsertionResult { steps, .. } => steps.is_empty(),
            _ => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Callback::RouteProgress { .. } => "load",
            Callback::InsertPosition { .. } => "insert-position",
            Callback::AddPosition { .. } => "add-position",
            Callback::MovePosition { .. } => "move-position",
            Callback::DeletePosition { .. } => "delete-position",
            Callback::SelectPosition { .. } => "select-position",
            Callback::SelectPositions { .. } => "select-positions",
            Callback::MapTypeChanged(_) => "maptypechanged",
            Callback::ZoomChanged => "zoomchanged",
            Callback::CenterChanged => "centerchanged",
            Callback::CallbackPort(_) => "callback-port",
            Callback::InsertionResult { mode, .. } => mode.header(),
        }
    }
}

/// A matched `(GET|OPTIONS|POST) /<seq>/<callback> HTTP/...` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a str,
    pub sequence: u64,
    pub callback: &'a str,
}

impl<'a> RequestLine<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let caps = REQUEST_LINE.captures(line)?;
        let method = caps.get(1)?.as_str();
        let sequence = caps.get(2)?.as_str().parse().ok()?;
        let callback = caps.get(3)?.as_str();
        Some(Self {
            method,
            sequence,
            callback,
        })
    }
}

/// Value of the first `name: value` header line called `name`, trimmed.
pub fn header_value<'a>(lines: &'a [String], name: &str) -> Option<&'a str> {
    lines.iter().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (!key.is_empty() && key == name)
            .then(|| value.trim())
            .filter(|v| !v.is_empty())
    })
}

/// A request is accepted only if it was addressed to our loopback listener.
pub fn is_authenticated(lines: &[String], listener_port: u16) -> bool {
    header_value(lines, "Host").is_some_and(|host| host == format!("127.0.0.1:{listener_port}"))
}

/// Splits a polled callback buffer on `--` into trimmed, non-empty callbacks.
pub fn split_polled_callbacks(buffer: &str) -> Vec<String> {
    buffer
        .split("--")
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_steps(body: &str) -> Vec<RouteStep> {
    let tokens: Vec<&str> = body
        .split('/')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    tokens
        .chunks_exact(5)
        .filter_map(|chunk| {
            let [lat, lon, meters, seconds, instruction] = chunk else {
                return None;
            };
            Some(RouteStep {
                latitude: parse_f64(lat)?,
                longitude: parse_f64(lon)?,
                meters: parse_f64(meters),
                seconds: parse_f64(seconds).filter(|s| *s != 0.0),
                instruction: (*instruction != "-").then(|| (*instruction).to_string()),
            })
        })
        .collect()
}

fn parse_f64(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Digits only; an empty value counts as zero.
fn parse_count(value: &str) -> Option<u64> {
    if value.is_empty() {
        return Some(0);
    }
    if !is_digits(value) {
        return None;
    }
    value.parse().ok()
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
