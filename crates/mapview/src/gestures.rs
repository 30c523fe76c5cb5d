//! Turns surface callbacks into edits of the position list.
//!
//! Callbacks are handled on the thread that dispatched them: a pool worker
//! for listener requests, the poller thread otherwise. Every edit happens
//! inside one `state.update`, so readers never see half a gesture.

use std::sync::{Arc, Weak};

use callback::{Callback, CallbackHandler, RouteStep};
use foundation::Position;
use tracing::{debug, info, warn};

use crate::engine::Shared;
use crate::enrich::EnrichFields;
use crate::state::MapState;
use crate::store::ModelChange;
use crate::surface::{query_bounds, query_zoom};
use crate::waypoints::build_insertion;

/// Routes parsed callbacks to the engine they belong to.
pub(crate) struct CallbackRouter {
    shared: Weak<Shared>,
}

impl CallbackRouter {
    pub(crate) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }
}

impl CallbackHandler for CallbackRouter {
    fn handle(&self, callback: Callback) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return callback.is_terminal();
        };
        let terminal = callback.is_terminal();
        match callback {
            Callback::RouteProgress { meters, seconds } => route_progress(&shared, meters, seconds),
            Callback::InsertPosition {
                row,
                longitude,
                latitude,
            } => insert_position(&shared, Some(row), longitude, latitude),
            Callback::AddPosition {
                longitude,
                latitude,
            } => insert_position(&shared, None, longitude, latitude),
            Callback::MovePosition {
                rendered_index,
                longitude,
                latitude,
            } => move_position(&shared, rendered_index, longitude, latitude),
            Callback::DeletePosition {
                longitude,
                latitude,
                threshold_m,
            } => delete_position(&shared, longitude, latitude, threshold_m),
            Callback::SelectPosition {
                longitude,
                latitude,
                threshold_m,
                replace,
            } => {
                let selection = shared.state.update(|s| {
                    let row = s.store.closest_position(longitude, latitude, threshold_m)?;
                    s.set_selection(&[row], replace);
                    Some(s.selection.clone())
                });
                if let Some(selection) = selection {
                    shared.listeners.selection_changed(&selection);
                }
            }
            Callback::SelectPositions {
                north_east,
                south_west,
                replace,
            } => {
                let selection = shared.state.update(|s| {
                    let rows = s.store.contained_positions(north_east, south_west);
                    if rows.is_empty() {
                        return None;
                    }
                    s.set_selection(&rows, replace);
                    Some(s.selection.clone())
                });
                if let Some(selection) = selection {
                    shared.listeners.selection_changed(&selection);
                }
            }
            Callback::MapTypeChanged(map_type) => shared.preferences.set_map_type(&map_type),
            Callback::ZoomChanged => zoom_changed(&shared),
            Callback::CenterChanged => center_changed(&shared),
            Callback::CallbackPort(port) => shared.listeners.received_callback(port),
            Callback::InsertionResult { mode, key, steps } => {
                debug!(mode = mode.header(), key, steps = steps.len(), "insertion result");
                return !insertion_result(&shared, key, &steps);
            }
        }
        terminal
    }
}

fn route_progress(shared: &Shared, meters: u64, seconds: u64) {
    let totals = shared.state.update(|s| {
        s.distance.meters = s.distance.meters.saturating_add(meters);
        s.distance.seconds = s.distance.seconds.saturating_add(seconds);
        s.distance
    });
    shared.listeners.calculated_distance(totals.meters, totals.seconds);
}

/// Row after the last rendered selected position, else after the last position.
fn add_row(state: &MapState) -> usize {
    state
        .rendered_selection
        .last()
        .and_then(|p| state.store.index_of(p.id()))
        .map_or(state.store.len(), |row| row + 1)
}

fn insert_position(shared: &Arc<Shared>, row: Option<usize>, longitude: f64, latitude: f64) {
    let (id, selection) = shared.state.update(|s| {
        let row = row.unwrap_or_else(|| add_row(s));
        let comment = shared.enricher.create_comment(s.store.len() + 1);
        let position = Position::at(longitude, latitude).with_comment(comment);
        let id = position.id();
        let change = s.store.add_position(row, position);
        if let ModelChange::Inserted { first, .. } = change {
            s.shift_selection_after_insert(first, 1);
            s.set_selection(&[first], true);
        }
        shared.commit(s, change);
        (id, s.selection.clone())
    });
    shared.listeners.selection_changed(&selection);
    shared.enrich(vec![id], EnrichFields::ALL);
}

/// Drags the selected group rigidly; the dragged position lands exactly on the pointer.
fn move_position(shared: &Arc<Shared>, rendered_index: usize, longitude: f64, latitude: f64) {
    let clean_elevation = shared.preferences.clean_elevation_on_move();
    let clean_time = shared.preferences.clean_time_on_move();
    let complement_time = shared.preferences.complement_time_on_move();

    let moved = shared.state.update(|s| {
        let dragged = s.rendered_selection.get(rendered_index)?.id();
        let row = s.store.index_of(dragged)?;
        let (delta_lon, delta_lat) = s
            .store
            .position(row)?
            .coordinates()
            .map_or((0.0, 0.0), |(lon, lat)| (longitude - lon, latitude - lat));

        let len = s.store.len();
        let mut rows: Vec<usize> = s.selection.iter().copied().filter(|&r| r < len).collect();
        rows.push(row);
        rows.sort_unstable();
        rows.dedup();

        let mut ids = Vec::with_capacity(rows.len());
        for &index in &rows {
            let Some(position) = s.store.position_mut(index) else {
                continue;
            };
            if index == row {
                position.longitude = Some(longitude);
                position.latitude = Some(latitude);
            } else if let Some((lon, lat)) = position.coordinates() {
                position.longitude = Some(lon + delta_lon);
                position.latitude = Some(lat + delta_lat);
            }
            if clean_elevation {
                position.elevation = None;
            }
            if clean_time {
                position.time = None;
            }
            ids.push(position.id());
        }

        s.flags.repaint_route_immediately = true;
        s.flags.route_reason = "move position".to_string();
        s.flags.repaint_selection_immediately = true;
        s.flags.selection_reason = "move position".to_string();
        shared.significance.lock().clear();
        Some(ids)
    });

    match moved {
        Some(ids) => {
            debug!(rendered_index, moved = ids.len(), "moved positions");
            if complement_time {
                shared.enrich(ids, EnrichFields::RECOMPUTE_TIME);
            }
        }
        None => debug!(rendered_index, "ignoring move of a position that is no longer rendered"),
    }
}

fn delete_position(shared: &Shared, longitude: f64, latitude: f64, threshold_m: f64) {
    let deleted = shared.state.update(|s| {
        let row = s.store.closest_position(longitude, latitude, threshold_m)?;
        let change = s.store.remove_positions(&[row])?;
        s.shift_selection_after_removal(&[row]);
        shared.commit(s, change);
        s.flags.repaint_route_immediately = true;
        s.flags.route_reason = "delete position".to_string();
        Some(row)
    });
    if let Some(row) = deleted {
        debug!(row, "deleted position");
    }
}

fn zoom_changed(shared: &Shared) {
    let zoom = query_zoom(shared.surface.as_ref()).unwrap_or_else(|err| {
        warn!(error = %err, "cannot query zoom level");
        None
    });
    shared.state.update(|s| {
        if s.zoom_suppression.consume() {
            debug!("ignoring zoom caused by recentering");
            return;
        }
        let reason = format!("zoomed from {} to {}", describe(s.last_zoom), describe(zoom));
        s.flags.repaint_route_immediately = true;
        s.flags.route_reason = reason.clone();
        if s.recenter_after_zooming {
            s.flags.recenter_map = true;
        }
        s.flags.repaint_selection_immediately = true;
        s.flags.selection_reason = reason;
        s.last_zoom = zoom;
    });
}

fn describe(zoom: Option<i32>) -> String {
    zoom.map_or_else(|| "unknown".to_string(), |z| z.to_string())
}

/// Repaints once the map shows any corner of the area that was last reduced to.
fn center_changed(shared: &Shared) {
    let Some(visible) = shared.state.read(|s| s.visible) else {
        return;
    };
    let bounds = match query_bounds(shared.surface.as_ref()) {
        Ok(Some(bounds)) => bounds,
        Ok(None) => return,
        Err(err) => {
            warn!(error = %err, "cannot query map bounds");
            return;
        }
    };
    if visible
        .corners()
        .iter()
        .any(|&(lon, lat)| bounds.contains(lon, lat))
    {
        shared.state.update(|s| {
            s.flags.repaint_route_immediately = true;
            s.flags.route_reason = "repaint not visible positions".to_string();
        });
    }
}

/// Returns `false` if the result matched no pending request or carried no steps.
fn insertion_result(shared: &Arc<Shared>, key: i32, steps: &[RouteStep]) -> bool {
    let Some(pending) = shared.pending.take(key) else {
        debug!(key, "no pending insertion for key");
        return false;
    };
    if steps.is_empty() {
        debug!(key, "insertion result without steps");
        return false;
    }

    let inserted = shared.state.update(|s| {
        let row = s.store.index_of(pending.predecessor.id())? + 1;
        let base = s.store.len();
        let positions = build_insertion(
            steps,
            &pending.predecessor,
            &pending.successor,
            shared.config.duplicate_distance_m,
            |index| shared.enricher.create_comment(base + index + 1),
        );
        let ids: Vec<_> = positions.iter().map(Position::id).collect();
        let change = s.store.insert_positions(row, positions)?;
        if let ModelChange::Inserted { first, last } = change {
            s.shift_selection_after_insert(first, last - first + 1);
        }
        shared.commit(s, change);
        Some((row, ids))
    });

    match inserted {
        Some((row, ids)) => {
            info!(key, row, inserted = ids.len(), "inserted waypoints");
            shared.enrich(ids, EnrichFields::ELEVATION_AND_TIME);
        }
        None => debug!(key, "dropping insertion; predecessor is gone or nothing is left"),
    }
    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use callback::InsertionMode;
    use foundation::{Characteristic, Position, Route, Time};
    use pretty_assertions::assert_eq;

    use crate::config::MapViewConfig;
    use crate::engine::MapView;
    use crate::enrich::LocalEnricher;
    use crate::preferences::{MemoryPreferences, PreferenceValues};
    use crate::store::Edit;
    use crate::testing::{RecordingSurface, wait_until};
    use crate::waypoints::PendingInsertion;

    fn view_with(route: Route, preferences: PreferenceValues) -> (MapView, Arc<RecordingSurface>) {
        let surface = Arc::new(RecordingSurface::default());
        let view = MapView::with_services(
            MapViewConfig::default(),
            surface.clone(),
            Arc::new(LocalEnricher),
            Arc::new(MemoryPreferences::new(preferences)),
        )
        .unwrap();
        view.set_route(Some(route));
        (view, surface)
    }

    fn line(n: usize) -> Route {
        Route::new(
            Characteristic::Track,
            (0..n).map(|i| Position::at(i as f64 * 0.01, 50.0)).collect(),
        )
    }

    fn dispatch(view: &MapView, line: &str) {
        view.shared().dispatcher.process_callback(line);
    }

    fn coordinates(view: &MapView) -> Vec<(f64, f64)> {
        view.positions()
            .iter()
            .map(|p| p.coordinates().unwrap())
            .collect()
    }

    fn render_selection(view: &MapView, rows: &[usize]) {
        let positions = view.positions();
        view.shared().state.update(|s| {
            s.rendered_selection = rows.iter().map(|&r| Arc::clone(&positions[r])).collect();
            s.flags = Default::default();
        });
    }

    #[test]
    fn drag_moves_the_selected_group() {
        let (view, _) = view_with(
            line(4),
            PreferenceValues {
                clean_elevation_on_move: true,
                ..PreferenceValues::default()
            },
        );
        view.edit(2, Edit::Elevation(Some(12.0)));
        view.set_selected_positions(&[1, 2], true);
        render_selection(&view, &[1, 2]);
        let before = coordinates(&view);

        dispatch(&view, "move-position/1/50.5/0.03");

        let moved = coordinates(&view);
        assert_eq!(moved[0], before[0]);
        assert!((moved[1].0 - 0.02).abs() < 1e-9 && (moved[1].1 - 50.5).abs() < 1e-9);
        assert_eq!(moved[2], (0.03, 50.5));
        assert_eq!(moved[3], before[3]);
        assert_eq!(view.position(2).unwrap().elevation, None);
        let flags = view.shared().state.read(|s| s.flags.clone());
        assert!(flags.repaint_route_immediately && flags.repaint_selection_immediately);
        assert_eq!(flags.route_reason, "move position");
    }

    #[test]
    fn dragging_the_middle_of_three_moves_all_three() {
        let (view, _) = view_with(line(5), PreferenceValues::default());
        view.set_selected_positions(&[1, 2, 3], true);
        render_selection(&view, &[1, 2, 3]);
        let before = coordinates(&view);

        dispatch(&view, "move-position/1/49.998/0.021");

        let moved = coordinates(&view);
        assert_eq!(moved[0], before[0]);
        assert_eq!(moved[4], before[4]);
        for row in 1..=3 {
            assert!((moved[row].0 - (before[row].0 + 0.001)).abs() < 1e-9, "row {row}: {:?}", moved[row]);
            assert!((moved[row].1 - (before[row].1 - 0.002)).abs() < 1e-9, "row {row}: {:?}", moved[row]);
        }
        assert_eq!(moved[2], (0.021, 49.998));
    }

    #[test]
    fn moved_position_gets_a_fresh_time() {
        let mut route = line(3);
        for (row, seconds) in [0.0, 999.0, 100.0].into_iter().enumerate() {
            route.edit(row).unwrap().time = Some(Time(seconds));
        }
        let (view, _) = view_with(
            route,
            PreferenceValues {
                complement_time_on_move: true,
                ..PreferenceValues::default()
            },
        );
        render_selection(&view, &[1]);

        dispatch(&view, "move-position/0/50.0/0.011");

        assert!(wait_until(Duration::from_secs(5), || {
            view.position(1).unwrap().time != Some(Time(999.0))
        }));
        let time = view.position(1).unwrap().time.unwrap().seconds();
        assert!((0.0..=100.0).contains(&time), "got {time}");
    }

    #[test]
    fn stale_rendered_index_is_ignored() {
        let (view, _) = view_with(line(3), PreferenceValues::default());
        render_selection(&view, &[0]);
        dispatch(&view, "move-position/4/51.0/1.0");
        assert_eq!(coordinates(&view)[0], (0.0, 50.0));
        assert!(!view.shared().state.read(|s| s.flags.repaint_route_immediately));
    }

    #[test]
    fn add_goes_after_the_last_rendered_selection() {
        let (view, _) = view_with(line(3), PreferenceValues::default());
        render_selection(&view, &[0]);
        dispatch(&view, "add-position/50.2/0.005");
        assert_eq!(coordinates(&view)[1], (0.005, 50.2));
        assert_eq!(view.selected_positions(), vec![1]);
        assert_eq!(view.position(1).unwrap().comment.as_deref(), Some("Position 4"));

        dispatch(&view, "insert-position/3/50.3/0.5");
        assert_eq!(coordinates(&view)[4], (0.5, 50.3));
        assert_eq!(view.selected_positions(), vec![4]);
    }

    #[test]
    fn delete_and_select_use_the_closest_position() {
        let (view, _) = view_with(line(3), PreferenceValues::default());
        dispatch(&view, "select-position/50.0/0.0101/50/true");
        assert_eq!(view.selected_positions(), vec![1]);

        dispatch(&view, "delete-position/50.0/0.0199/1");
        assert_eq!(view.positions().len(), 3);
        dispatch(&view, "delete-position/50.0/0.0199/500");
        assert_eq!(coordinates(&view), vec![(0.0, 50.0), (0.01, 50.0)]);

        dispatch(&view, "select-positions/51.0/0.0/49.0/-1.0/true");
        assert_eq!(view.selected_positions(), vec![0]);
        dispatch(&view, "select-positions/10.0/10.0/9.0/9.0/true");
        assert_eq!(view.selected_positions(), vec![0]);
    }

    #[test]
    fn zoom_after_recentering_is_swallowed_once() {
        let (view, surface) = view_with(line(2), PreferenceValues::default());
        surface.set_zoom(Some(12));
        view.shared().state.update(|s| {
            s.flags = Default::default();
            s.zoom_suppression.arm();
        });

        dispatch(&view, "zoomchanged");
        assert!(!view.shared().state.read(|s| s.flags.repaint_route_immediately));

        dispatch(&view, "zoomchanged");
        let flags = view.shared().state.read(|s| s.flags.clone());
        assert!(flags.repaint_route_immediately && flags.repaint_selection_immediately);
        assert!(!flags.recenter_map);
        assert_eq!(flags.selection_reason, "zoomed from unknown to 12");
    }

    #[test]
    fn progress_accumulates_and_map_type_is_kept() {
        let preferences = Arc::new(MemoryPreferences::default());
        let view = MapView::with_services(
            MapViewConfig::default(),
            Arc::new(RecordingSurface::default()),
            Arc::new(LocalEnricher),
            preferences.clone(),
        )
        .unwrap();
        dispatch(&view, "load/1000/60");
        dispatch(&view, "load/500/30");
        assert_eq!(view.shared().state.read(|s| s.distance.meters), 1_500);
        dispatch(&view, "maptypechanged/terrain");
        assert_eq!(preferences.values().map_type.as_deref(), Some("terrain"));
    }

    #[test]
    fn center_change_repaints_when_reduced_area_is_on_screen() {
        let (view, surface) = view_with(line(2), PreferenceValues::default());
        view.shared().state.update(|s| {
            s.flags = Default::default();
            s.visible = foundation::GeoBounds::of_positions([&Position::at(0.0, 50.0), &Position::at(0.01, 50.0)]);
        });
        surface.set_bounds(Some(("60.0,20.0", "55.0,15.0")));
        dispatch(&view, "centerchanged");
        assert!(!view.shared().state.read(|s| s.flags.repaint_route_immediately));

        surface.set_bounds(Some(("50.5,0.5", "49.5,-0.5")));
        dispatch(&view, "centerchanged");
        assert!(view.shared().state.read(|s| s.flags.repaint_route_immediately));
    }

    #[test]
    fn insertion_result_fills_the_leg_once() {
        let (view, _) = view_with(line(2), PreferenceValues::default());
        let positions = view.positions();
        view.edit(1, Edit::Time(Some(Time(3_600.0))));
        let shared = view.shared();
        let key = shared.pending.register(PendingInsertion {
            mode: InsertionMode::AllWaypoints,
            predecessor: Arc::clone(&positions[0]),
            successor: view.position(1).unwrap(),
        });
        let other = shared.pending.register(PendingInsertion {
            mode: InsertionMode::OnlyTurnpoints,
            predecessor: Arc::clone(&positions[0]),
            successor: Arc::clone(&positions[1]),
        });

        dispatch(&view, "Insert-All-Waypoints: 77/50.0/0.005/100/10/-");
        assert_eq!(view.positions().len(), 2);

        let result = format!(
            "Insert-All-Waypoints: {key}/50.0/0.0033/300/20/Turn right/50.0/0.0066/300/30/-"
        );
        dispatch(&view, &result);
        let inserted = view.positions();
        assert_eq!(inserted.len(), 4);
        assert_eq!(inserted[1].comment.as_deref(), Some("Turn right"));
        assert_eq!(inserted[1].time, Some(Time(3_550.0)));
        assert_eq!(inserted[2].time, Some(Time(3_570.0)));

        dispatch(&view, &result);
        assert_eq!(view.positions().len(), 4);
        assert_eq!(shared.pending.len(), 1);
        assert!(shared.pending.take(other).is_some());
    }

    #[test]
    fn removed_predecessor_drops_the_insertion() {
        let (view, _) = view_with(line(3), PreferenceValues::default());
        let positions = view.positions();
        let key = view.shared().pending.register(PendingInsertion {
            mode: InsertionMode::AllWaypoints,
            predecessor: Arc::clone(&positions[0]),
            successor: Arc::clone(&positions[1]),
        });
        view.remove_positions(&[0]);
        dispatch(&view, &format!("Insert-All-Waypoints: {key}/50.0/0.005/100/10/-"));
        assert_eq!(view.positions().len(), 2);
    }

    #[test]
    fn only_a_matched_insertion_keeps_the_request_open() {
        let (view, surface) = view_with(line(2), PreferenceValues::default());
        surface.set_zoom(Some(12));
        let positions = view.positions();
        let key = view.shared().pending.register(PendingInsertion {
            mode: InsertionMode::OnlyTurnpoints,
            predecessor: Arc::clone(&positions[0]),
            successor: Arc::clone(&positions[1]),
        });
        let post = |sequence: u64, key: i32| {
            vec![
                format!("POST /{sequence}/ HTTP/1.1"),
                format!("Insert-Only-Turnpoints: {key}/50.0/0.005/100/10/-"),
                "zoomchanged".to_string(),
            ]
        };
        let zoomed = || view.shared().state.read(|s| s.last_zoom == Some(12));

        view.shared().dispatcher.process_lines(&post(1, key.wrapping_add(1)));
        assert!(!zoomed());
        assert_eq!(view.positions().len(), 2);

        view.shared().dispatcher.process_lines(&post(2, key));
        assert_eq!(view.positions().len(), 3);
        assert!(zoomed());
    }

    #[test]
    fn new_positions_are_enriched_in_the_background() {
        let (view, _) = view_with(
            Route::new(
                Characteristic::Track,
                vec![
                    Position::at(0.0, 50.0).with_time(Time(0.0)),
                    Position::at(0.02, 50.0).with_time(Time(100.0)),
                ],
            ),
            PreferenceValues::default(),
        );
        dispatch(&view, "insert-position/0/50.0/0.01");
        assert!(wait_until(Duration::from_secs(5), || {
            view.position(1).and_then(|p| p.time).is_some()
        }));
        let time = view.position(1).unwrap().time.unwrap();
        assert!((time.seconds() - 50.0).abs() < 1.0, "got {time:?}");
    }
}
