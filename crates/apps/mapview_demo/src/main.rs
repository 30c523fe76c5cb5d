//! Headless driver for the map view engine.
//!
//! Renders a synthetic route against a surface that only logs what it is told
//! and answers like a browser map would. Callback lines typed on stdin are
//! handed to the engine as if the user had clicked them.

mod surface;

use std::env;
use std::error::Error;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use foundation::{Characteristic, Position, Route, Time};
use mapview::{MapView, MapViewConfig, MapViewListener};
use tracing::info;

use crate::surface::LoggingSurface;

#[derive(Parser, Debug)]
#[command(author, version, about = "Drives the map view engine against a logging surface")]
struct Args {
    /// JSON file with engine settings; missing keys keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a synthetic route and feed stdin lines back as callbacks.
    Run {
        #[arg(long, default_value_t = 1000)]
        positions: usize,

        /// track, route or waypoints
        #[arg(long, default_value = "track", value_parser = parse_characteristic)]
        characteristic: Characteristic,

        /// Zoom level the surface reports; unknown if omitted.
        #[arg(long)]
        zoom: Option<i32>,

        #[arg(long, default_value_t = 30)]
        seconds: u64,

        /// Ignore the callback port check so the engine falls back to polling.
        #[arg(long)]
        no_answer: bool,
    },
    /// Print the effective settings as JSON.
    Config,
}

fn parse_characteristic(value: &str) -> Result<Characteristic, String> {
    match value.to_ascii_lowercase().as_str() {
        "track" => Ok(Characteristic::Track),
        "route" => Ok(Characteristic::Route),
        "waypoints" => Ok(Characteristic::Waypoints),
        other => Err(format!("unknown characteristic {other}")),
    }
}

struct LogListener;

impl MapViewListener for LogListener {
    fn calculated_distance(&self, meters: u64, seconds: u64) {
        info!(meters, seconds, "calculated distance");
    }

    fn received_callback(&self, port: u16) {
        info!(port, "surface reached the callback listener");
    }

    fn selection_changed(&self, indices: &[usize]) {
        info!(?indices, "selection changed");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => MapViewConfig::load(path)?,
        None => MapViewConfig::default(),
    };
    apply_env_overrides(&mut config);

    match args.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run {
            positions,
            characteristic,
            zoom,
            seconds,
            no_answer,
        } => run(config, positions, characteristic, zoom, seconds, !no_answer),
    }
}

fn run(
    config: MapViewConfig,
    positions: usize,
    characteristic: Characteristic,
    zoom: Option<i32>,
    seconds: u64,
    answer_handshake: bool,
) -> Result<(), Box<dyn Error>> {
    let surface = Arc::new(LoggingSurface::new(zoom, answer_handshake));
    let view = MapView::new(config, surface.clone())?;
    view.add_listener(Arc::new(LogListener));
    view.start().map_err(|err| err.to_string())?;
    view.set_route(Some(synthetic_route(characteristic, positions)));
    info!(positions, ?characteristic, port = ?view.callback_port(), "engine running");

    let feeder = surface.clone();
    std::thread::Builder::new()
        .name("MapViewDemoInput".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines().map_while(Result::ok) {
                let line = line.trim();
                if !line.is_empty() {
                    feeder.emit(line);
                }
            }
        })?;

    std::thread::sleep(Duration::from_secs(seconds));
    info!(polling = view.is_polling(), "stopping engine");
    view.stop();
    Ok(())
}

/// A gentle curve north of Hamburg, one position every few hundred meters.
fn synthetic_route(characteristic: Characteristic, count: usize) -> Route {
    let start = Time::now();
    let positions = (0..count)
        .map(|i| {
            let t = i as f64;
            Position::at(9.99 + t * 0.002, 53.55 + (t / 50.0).sin() * 0.01 + t * 0.001)
                .with_time(start.plus_seconds(t * 20.0))
                .with_comment(format!("Position {}", i + 1))
        })
        .collect();
    Route::new(characteristic, positions)
}

fn apply_env_overrides(config: &mut MapViewConfig) {
    config.worker_threads = env_var_usize("MAPVIEW_WORKER_THREADS", config.worker_threads);
    config.max_selection_positions =
        env_var_usize("MAPVIEW_MAX_SELECTION_POSITIONS", config.max_selection_positions);
    config.hard_position_cap = env_var_usize("MAPVIEW_HARD_POSITION_CAP", config.hard_position_cap);
    config.poll_interval_ms =
        u64::from(env_var_u32("MAPVIEW_POLL_INTERVAL_MS", clamp_u32(config.poll_interval_ms)));
    config.handshake_timeout_ms = u64::from(env_var_u32(
        "MAPVIEW_HANDSHAKE_TIMEOUT_MS",
        clamp_u32(config.handshake_timeout_ms),
    ));
    config.render_viewport_factor =
        env_var_f64("MAPVIEW_RENDER_VIEWPORT_FACTOR", config.render_viewport_factor);
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn env_var_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
