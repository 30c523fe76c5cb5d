//! The route and selection update loops.
//!
//! Both loops park on the coordination lock, take a snapshot once their
//! flags say so and render outside the lock. A failed or panicking iteration
//! is logged and the loop carries on.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use foundation::{Characteristic, Position};
use geometry::{
    MapViewport, SnapshotCache, filter_positions_without_coordinates, reduce_for_render,
    reduce_for_selection,
};
use tracing::{debug, error, info, warn};

use crate::engine::Shared;
use crate::error::SurfaceError;
use crate::flags::{RouteTrigger, SelectionTrigger};
use crate::render::{max_positions, recenter_commands, route_commands};
use crate::state::MapState;
use crate::surface::{RenderCommand, TravelOptions, query_bounds, query_zoom};

pub(crate) const ROUTE_UPDATER: &str = "MapViewRouteUpdater";
pub(crate) const SELECTION_UPDATER: &str = "MapViewSelectionUpdater";

struct RouteSnapshot {
    positions: Vec<Arc<Position>>,
    characteristic: Characteristic,
    travel: TravelOptions,
    generation: u64,
    recenter: bool,
    reason: String,
}

struct SelectionSnapshot {
    positions: Vec<Arc<Position>>,
    selection: Vec<usize>,
    center: Option<(f64, f64)>,
    trigger: SelectionTrigger,
}

/// Parks until `ready` yields a snapshot. `None` once the engine is cancelled.
fn next_snapshot<T>(
    shared: &Shared,
    wait: Duration,
    mut ready: impl FnMut(&mut MapState) -> Option<T>,
) -> Option<T> {
    let mut state = shared.state.lock();
    loop {
        if shared.token.is_cancelled() {
            return None;
        }
        if state.initialized
            && state.store.has_route()
            && shared.surface.is_visible()
            && let Some(snapshot) = ready(&mut *state)
        {
            return Some(snapshot);
        }
        shared.state.wait_for(&mut state, wait);
    }
}

pub(crate) fn run_route_updater(shared: Arc<Shared>) {
    info!("route updater started");
    let config = &shared.config;
    let mut last_dispatch: Option<Instant> = None;
    loop {
        let snapshot = next_snapshot(&shared, config.route_wait(), |state| {
            let since = last_dispatch.map(|t| t.elapsed());
            if !state.flags.route_due(since, config.route_min_interval()) {
                return None;
            }
            let RouteTrigger { recenter, reason } = state.flags.take_route();
            Some(RouteSnapshot {
                positions: state.store.positions().to_vec(),
                characteristic: state.store.characteristic(),
                travel: state.travel,
                generation: shared.significance.lock().generation(),
                recenter: recenter || state.first_start,
                reason,
            })
        });
        let Some(snapshot) = snapshot else {
            break;
        };

        let reason = snapshot.reason.clone();
        match catch_unwind(AssertUnwindSafe(|| update_route(&shared, snapshot))) {
            Ok(Ok(rendered)) => debug!(%reason, rendered, "route updated"),
            Ok(Err(err)) => warn!(%reason, error = %err, "route update failed"),
            Err(_) => error!(%reason, "route update panicked"),
        }
        last_dispatch = Some(Instant::now());
    }
    info!("route updater stopped");
}

fn update_route(shared: &Shared, snapshot: RouteSnapshot) -> Result<usize, SurfaceError> {
    let config = &shared.config;
    let surface = shared.surface.as_ref();
    let all = snapshot.positions;
    let positions = filter_positions_without_coordinates(&all);

    if snapshot.recenter
        && let Some(commands) = recenter_commands(&positions)
    {
        // The recentering zooms the map; that zoom callback must not trigger another repaint.
        shared.state.update(|s| {
            s.zoom_suppression.arm();
            s.first_start = false;
        });
        for command in commands {
            surface.execute(command)?;
        }
    }

    let viewport = MapViewport {
        zoom: query_zoom(surface)?,
        bounds: query_bounds(surface)?,
    };
    let max_count = max_positions(snapshot.characteristic, config);
    let reduction = reduce_for_render(
        &positions,
        viewport,
        max_count,
        &config.reduction(),
        &SnapshotCache::new(&shared.significance, snapshot.generation),
    );
    shared.state.update(|s| s.visible = reduction.visible);

    if snapshot.characteristic == Characteristic::Route {
        shared.state.update(|s| s.distance = Default::default());
    }
    let commands = route_commands(
        snapshot.characteristic,
        &reduction.positions,
        config,
        snapshot.travel,
        |origin| all.iter().position(|p| p.id() == origin.id()),
    );
    let rendered = reduction.positions.len();
    for command in commands {
        surface.execute(command)?;
    }
    info!(
        positions = rendered,
        characteristic = ?snapshot.characteristic,
        recenter = snapshot.recenter,
        "position list updated"
    );
    Ok(rendered)
}

pub(crate) fn run_selection_updater(shared: Arc<Shared>) {
    info!("selection updater started");
    let config = &shared.config;
    let mut last_dispatch: Option<Instant> = None;
    loop {
        let snapshot = next_snapshot(&shared, config.selection_wait(), |state| {
            let since = last_dispatch.map(|t| t.elapsed());
            if !state.flags.selection_due(since, config.selection_min_interval()) {
                return None;
            }
            let trigger = state.flags.take_selection();
            let center = if trigger.recenter { state.center.take() } else { None };
            Some(SelectionSnapshot {
                positions: state.store.positions().to_vec(),
                selection: state.selection.clone(),
                center,
                trigger,
            })
        });
        let Some(snapshot) = snapshot else {
            break;
        };

        let reason = snapshot.trigger.reason.clone();
        match catch_unwind(AssertUnwindSafe(|| update_selection(&shared, snapshot))) {
            Ok(Ok(rendered)) => debug!(%reason, rendered, "selection updated"),
            Ok(Err(err)) => warn!(%reason, error = %err, "selection update failed"),
            Err(_) => error!(%reason, "selection update panicked"),
        }
        last_dispatch = Some(Instant::now());
    }
    info!("selection updater stopped");
}

fn update_selection(shared: &Shared, snapshot: SelectionSnapshot) -> Result<usize, SurfaceError> {
    let config = &shared.config;
    let surface = shared.surface.as_ref();
    // Map bounds only matter once the selection is too large to show completely.
    let viewport = if snapshot.selection.len() > config.max_selection_positions {
        query_bounds(surface)?
    } else {
        None
    };
    let render = reduce_for_selection(
        &snapshot.positions,
        &snapshot.selection,
        viewport,
        config.max_selection_positions,
        &config.reduction(),
    );
    let center = snapshot
        .trigger
        .recenter
        .then(|| snapshot.center.or_else(|| render.first().and_then(|p| p.coordinates())))
        .flatten();

    surface.execute(RenderCommand::SelectPositions {
        positions: render.clone(),
        center,
    })?;
    let rendered = render.len();
    shared.state.update(|s| s.rendered_selection = Arc::from(render));
    info!(
        positions = rendered,
        recenter = snapshot.trigger.recenter,
        "selected positions updated"
    );
    Ok(rendered)
}
