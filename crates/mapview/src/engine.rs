//! Engine lifecycle and the public map view API.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use callback::{
    CallbackListener, CallbackPoller, Dispatcher, InsertionMode, LineSink, ListenerError,
    ListenerSettings,
};
use foundation::{Characteristic, Position, PositionId, Route};
use geometry::SignificanceCache;
use parking_lot::Mutex;
use runtime::{CancellationToken, Coordinator, TaskHandle, WorkerPool};
use tracing::{debug, error, info, warn};

use crate::config::MapViewConfig;
use crate::enrich::{EnrichFields, Enricher, LocalEnricher};
use crate::error::{EnrichError, MapViewError};
use crate::gestures::CallbackRouter;
use crate::listener::{Listeners, MapViewListener};
use crate::preferences::{MemoryPreferences, Preferences};
use crate::state::MapState;
use crate::store::{Column, Edit, ModelChange};
use crate::surface::{RenderCommand, RenderSurface, SurfaceQuery, TravelMode, TravelOptions, query_bounds};
use crate::updater;
use crate::waypoints::{PendingInsertion, PendingInsertions};

const WORKER_POOL: &str = "MapViewWorker";
const LISTENER_THREAD: &str = "MapViewCallbackListener";
const POLLER_THREAD: &str = "MapViewCallbackPoller";

const PRIORITY_CALLBACK: i32 = 0;
const PRIORITY_HANDSHAKE: i32 = 0;
const PRIORITY_ENRICH: i32 = 10;
const PRIORITY_WAYPOINTS: i32 = 20;

/// Longest single park while waiting for the handshake; bounds how late cancellation is seen.
const HANDSHAKE_SLICE: Duration = Duration::from_millis(250);

/// State and services shared by the updaters, the callback channel and the pool jobs.
pub(crate) struct Shared {
    pub(crate) config: MapViewConfig,
    pub(crate) state: Coordinator<MapState>,
    /// Locked after `state` whenever both are held.
    pub(crate) significance: Mutex<SignificanceCache>,
    pub(crate) surface: Arc<dyn RenderSurface>,
    pub(crate) enricher: Arc<dyn Enricher>,
    pub(crate) preferences: Arc<dyn Preferences>,
    pub(crate) listeners: Listeners,
    pub(crate) pending: PendingInsertions,
    pub(crate) token: CancellationToken,
    pub(crate) pool: WorkerPool,
    pub(crate) dispatcher: Dispatcher<CallbackRouter>,
    listener_port: AtomicU32,
    poller: Mutex<Option<CallbackPoller>>,
}

impl Shared {
    /// Sends one command; failures are logged and reported as `false`.
    pub(crate) fn execute(&self, command: RenderCommand) -> bool {
        let name = command.name();
        match self.surface.execute(command) {
            Ok(()) => true,
            Err(err) => {
                warn!(command = name, error = %err, "surface command failed");
                false
            }
        }
    }

    /// Raises the flags for `change`. Call from inside `state.update`.
    pub(crate) fn commit(&self, state: &mut MapState, change: ModelChange) {
        if state.apply_model_change(change) {
            self.significance.lock().clear();
        }
    }

    /// Schedules `job` on the pool. The job is skipped if the engine is gone by then.
    pub(crate) fn submit<F>(self: &Arc<Self>, priority: i32, what: &'static str, job: F)
    where
        F: FnOnce(Arc<Shared>) + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        let submitted = self.pool.submit(priority, move || {
            if let Some(shared) = weak.upgrade() {
                job(shared);
            }
        });
        if let Err(err) = submitted {
            warn!(job = what, error = %err, "cannot schedule job");
        }
    }

    /// Completes the given positions in the background.
    pub(crate) fn enrich(self: &Arc<Self>, ids: Vec<PositionId>, fields: EnrichFields) {
        if ids.is_empty() {
            return;
        }
        self.submit(PRIORITY_ENRICH, "enrich positions", move |shared| {
            for id in ids {
                if shared.token.is_cancelled() {
                    return;
                }
                shared.enrich_position(id, fields);
            }
        });
    }

    fn enrich_position(&self, id: PositionId, fields: EnrichFields) {
        let snapshot = self.state.read(|s| {
            let row = s.store.index_of(id)?;
            let positions = s.store.positions();
            Some((
                row.checked_sub(1).and_then(|i| positions.get(i)).cloned(),
                Arc::clone(&positions[row]),
                positions.get(row + 1).cloned(),
            ))
        });
        let Some((previous, position, next)) = snapshot else {
            debug!(position = id.get(), "position vanished before enrichment");
            return;
        };
        let Some((longitude, latitude)) = position.coordinates() else {
            return;
        };

        let comment = if fields.comment {
            settle("comment", self.enricher.complement_comment(longitude, latitude)).flatten()
        } else {
            None
        };
        let elevation = if fields.elevation && position.elevation.is_none() {
            settle("elevation", self.enricher.complement_elevation(longitude, latitude)).flatten()
        } else {
            None
        };
        let time = if fields.time && (fields.recompute_time || position.time.is_none()) {
            settle(
                "time",
                self.enricher
                    .complement_time(previous.as_deref(), &position, next.as_deref()),
            )
            .flatten()
        } else {
            None
        };
        if comment.is_none() && elevation.is_none() && time.is_none() {
            return;
        }

        self.state.update(|state| {
            let mut columns = Vec::with_capacity(3);
            let row = state.store.edit_by_id(id, |p| {
                // A comment typed in the meantime wins over the lookup.
                if let Some(comment) = comment
                    && p.comment == position.comment
                {
                    p.comment = Some(comment);
                    columns.push(Column::Description);
                }
                if let Some(elevation) = elevation
                    && p.elevation.is_none()
                {
                    p.elevation = Some(elevation);
                    columns.push(Column::Elevation);
                }
                // A time edited in the meantime wins over the recomputation.
                if let Some(time) = time
                    && (p.time.is_none() || (fields.recompute_time && p.time == position.time))
                {
                    p.time = Some(time);
                    columns.push(Column::Time);
                }
            });
            let Some(row) = row else {
                return;
            };
            for column in columns {
                self.commit(
                    state,
                    ModelChange::Updated {
                        first: row,
                        last: row,
                        column,
                    },
                );
            }
        });
    }

    pub(crate) fn listener_port(&self) -> u16 {
        self.listener_port.load(Ordering::SeqCst) as u16
    }

    /// Waits for the surface to acknowledge the listener port; polls if it never does.
    fn handshake(self: &Arc<Self>) {
        let acknowledged = Arc::new(Coordinator::new(false));
        let waiter: Arc<dyn MapViewListener> = Arc::new(HandshakeWaiter(Arc::clone(&acknowledged)));
        self.listeners.add(Arc::clone(&waiter));
        self.execute(RenderCommand::CheckCallbackPort);

        let deadline = Instant::now() + self.config.handshake_timeout();
        let received = {
            let mut guard = acknowledged.lock();
            while !*guard && !self.token.is_cancelled() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                acknowledged.wait_for(&mut guard, remaining.min(HANDSHAKE_SLICE));
            }
            *guard
        };
        self.listeners.remove(&waiter);

        if received {
            info!(port = self.listener_port(), "surface reached the callback listener");
        } else if !self.token.is_cancelled() {
            warn!(
                port = self.listener_port(),
                timeout_ms = self.config.handshake_timeout_ms,
                "no callback from the surface, switching to polling"
            );
            self.start_polling();
        }
    }

    /// Tells the surface to buffer callbacks and starts draining that buffer.
    fn start_polling(self: &Arc<Self>) {
        let mut slot = self.poller.lock();
        if self.token.is_cancelled() || slot.is_some() {
            return;
        }
        self.execute(RenderCommand::SetCallbackPort(-1));

        let fetch = {
            let weak = Arc::downgrade(self);
            move || {
                let shared = weak.upgrade()?;
                match shared.surface.query(SurfaceQuery::Callbacks) {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        debug!(error = %err, "cannot fetch buffered callbacks");
                        None
                    }
                }
            }
        };
        let deliver = {
            let weak = Arc::downgrade(self);
            move |line: &str| {
                if let Some(shared) = weak.upgrade() {
                    shared.dispatcher.process_callback(line);
                }
            }
        };
        match CallbackPoller::start(POLLER_THREAD, self.config.poll_interval(), fetch, deliver) {
            Ok(poller) => *slot = Some(poller),
            Err(err) => error!(error = %err, "cannot start callback poller"),
        }
    }

    fn stop_polling(&self) {
        if let Some(mut poller) = self.poller.lock().take() {
            poller.stop();
        }
    }

    fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }
}

fn settle<T>(field: &'static str, result: Result<T, EnrichError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(field, error = %err, "enrichment failed");
            None
        }
    }
}

struct HandshakeWaiter(Arc<Coordinator<bool>>);

impl MapViewListener for HandshakeWaiter {
    fn calculated_distance(&self, _meters: u64, _seconds: u64) {}

    fn received_callback(&self, _port: u16) {
        self.0.update(|acknowledged| *acknowledged = true);
    }
}

/// Keeps a rendering surface in sync with an edited route.
///
/// Construction only allocates; [`MapView::start`] brings up the update
/// threads and the callback channel, [`MapView::stop`] tears them down.
pub struct MapView {
    shared: Arc<Shared>,
    updaters: Mutex<Vec<TaskHandle>>,
    listener: Mutex<Option<CallbackListener>>,
    init_cause: Mutex<Option<Arc<MapViewError>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl MapView {
    /// A map view with placeholder enrichment and in-memory preferences.
    pub fn new(config: MapViewConfig, surface: Arc<dyn RenderSurface>) -> Result<Self, MapViewError> {
        Self::with_services(
            config,
            surface,
            Arc::new(LocalEnricher),
            Arc::new(MemoryPreferences::default()),
        )
    }

    pub fn with_services(
        config: MapViewConfig,
        surface: Arc<dyn RenderSurface>,
        enricher: Arc<dyn Enricher>,
        preferences: Arc<dyn Preferences>,
    ) -> Result<Self, MapViewError> {
        let pool = WorkerPool::new(WORKER_POOL, config.worker_threads, config.max_pending_jobs)?;
        let state = MapState {
            travel: config.travel,
            recenter_after_zooming: config.recenter_after_zooming,
            ..MapState::default()
        };
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| Shared {
            config,
            state: Coordinator::new(state),
            significance: Mutex::new(SignificanceCache::new()),
            surface,
            enricher,
            preferences,
            listeners: Listeners::new(),
            pending: PendingInsertions::new(),
            token: CancellationToken::new(),
            pool,
            dispatcher: Dispatcher::new(CallbackRouter::new(weak.clone())),
            listener_port: AtomicU32::new(0),
            poller: Mutex::new(None),
        });
        Ok(Self {
            shared,
            updaters: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            init_cause: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Initializes the surface and starts updaters and callback channel.
    ///
    /// A failure is also kept for [`MapView::initialization_cause`]; nothing
    /// is left running in that case.
    pub fn start(&self) -> Result<(), Arc<MapViewError>> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Arc::new(MapViewError::Disposed));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return self.initialization_cause().map_or(Ok(()), Err);
        }

        if let Err(err) = self.shared.surface.initialize() {
            return Err(self.fail(err.into()));
        }
        self.shared.state.update(|s| s.initialized = true);

        if let Err(err) = self.spawn_updaters() {
            self.shared.token.cancel();
            self.shared.state.update(|s| s.initialized = false);
            return Err(self.fail(err));
        }

        if self.shared.config.callback_listener {
            match self.bind_listener() {
                Ok(listener) => {
                    let port = listener.port();
                    self.shared.listener_port.store(u32::from(port), Ordering::SeqCst);
                    *self.listener.lock() = Some(listener);
                    self.shared.execute(RenderCommand::SetCallbackPort(i32::from(port)));
                    self.shared
                        .submit(PRIORITY_HANDSHAKE, "callback handshake", |shared| shared.handshake());
                }
                Err(err) => {
                    warn!(error = %err, "callback listener unavailable, polling instead");
                    self.shared.start_polling();
                }
            }
        } else {
            self.shared.start_polling();
        }

        self.shared.state.update(|s| {
            if s.request_update(true) {
                self.shared.significance.lock().clear();
            }
        });
        info!(
            listener_port = self.shared.listener_port(),
            workers = self.shared.config.worker_threads,
            "map view started"
        );
        Ok(())
    }

    fn fail(&self, err: MapViewError) -> Arc<MapViewError> {
        let cause = Arc::new(err);
        error!(error = %cause, "cannot start map view");
        *self.init_cause.lock() = Some(Arc::clone(&cause));
        cause
    }

    fn spawn_updaters(&self) -> Result<(), MapViewError> {
        let mut updaters = self.updaters.lock();
        let route = {
            let shared = Arc::clone(&self.shared);
            TaskHandle::spawn(updater::ROUTE_UPDATER, move || updater::run_route_updater(shared))
        }
        .map_err(|source| MapViewError::Thread {
            name: updater::ROUTE_UPDATER.to_string(),
            source,
        })?;
        updaters.push(route);
        let selection = {
            let shared = Arc::clone(&self.shared);
            TaskHandle::spawn(updater::SELECTION_UPDATER, move || {
                updater::run_selection_updater(shared)
            })
        }
        .map_err(|source| MapViewError::Thread {
            name: updater::SELECTION_UPDATER.to_string(),
            source,
        })?;
        updaters.push(selection);
        Ok(())
    }

    fn bind_listener(&self) -> Result<CallbackListener, ListenerError> {
        let weak = Arc::downgrade(&self.shared);
        let sink: LineSink = Arc::new(move |lines: Vec<String>| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            shared.submit(PRIORITY_CALLBACK, "callback request", move |shared| {
                let port = shared.listener_port();
                shared.dispatcher.process_request(&lines, port);
            });
        });
        let config = &self.shared.config;
        CallbackListener::bind(
            ListenerSettings {
                thread_name: LISTENER_THREAD.to_string(),
                accept_timeout: config.accept_timeout(),
                max_connections: config.max_callback_connections,
                ..ListenerSettings::default()
            },
            sink,
        )
    }

    /// Stops every thread the engine owns. Idempotent and never panics.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = &self.shared;
        shared.token.cancel();
        shared.state.notify_all();
        let grace = shared.config.shutdown_grace();

        let updaters = std::mem::take(&mut *self.updaters.lock());
        for task in updaters {
            let name = task.name().to_string();
            let outcome = task.join_timeout(grace);
            debug!(task = %name, ?outcome, "updater stopped");
        }
        if let Some(mut listener) = self.listener.lock().take() {
            listener.stop();
        }
        shared.stop_polling();
        let dropped = shared.pool.shutdown_now(grace);
        shared.pending.clear();
        info!(dropped_jobs = dropped, "map view stopped");
    }

    pub fn dispose(&self) {
        self.stop();
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.read(|s| s.initialized)
    }

    /// Why [`MapView::start`] failed, if it did.
    pub fn initialization_cause(&self) -> Option<Arc<MapViewError>> {
        self.init_cause.lock().clone()
    }

    /// Port of the loopback listener, or `None` when it is not bound.
    pub fn callback_port(&self) -> Option<u16> {
        Some(self.shared.listener_port()).filter(|&port| port != 0)
    }

    /// Whether callbacks are currently fetched by polling.
    pub fn is_polling(&self) -> bool {
        self.shared.is_polling()
    }

    pub fn add_listener(&self, listener: Arc<dyn MapViewListener>) {
        self.shared.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn MapViewListener>) -> bool {
        self.shared.listeners.remove(listener)
    }

    /// Replaces the route, or clears it with `None`. The map recenters on the new route.
    pub fn set_route(&self, route: Option<Route>) {
        let shared = &self.shared;
        shared.state.update(|s| {
            let change = match route {
                Some(route) => s.store.set_route(route),
                None => s.store.clear_route(),
            };
            s.selection.clear();
            s.center = None;
            shared.commit(s, change);
        });
    }

    /// Inserts `position` at `row` (clamped); returns the row it landed on.
    pub fn add_position(&self, row: usize, position: Position) -> usize {
        let shared = &self.shared;
        shared.state.update(|s| {
            let change = s.store.add_position(row, position);
            let row = shifted(s, change).unwrap_or(row);
            shared.commit(s, change);
            row
        })
    }

    /// Inserts `positions` at `row`; returns `false` if there was nothing to insert.
    pub fn insert_positions(&self, row: usize, positions: Vec<Position>) -> bool {
        let shared = &self.shared;
        shared.state.update(|s| match s.store.insert_positions(row, positions) {
            Some(change) => {
                shifted(s, change);
                shared.commit(s, change);
                true
            }
            None => false,
        })
    }

    pub fn remove_positions(&self, rows: &[usize]) -> bool {
        let shared = &self.shared;
        shared.state.update(|s| {
            let len = s.store.len();
            let Some(change) = s.store.remove_positions(rows) else {
                return false;
            };
            let removed: Vec<usize> = rows.iter().copied().filter(|&r| r < len).collect();
            s.shift_selection_after_removal(&removed);
            shared.commit(s, change);
            true
        })
    }

    pub fn edit(&self, row: usize, edit: Edit) -> bool {
        let shared = &self.shared;
        shared.state.update(|s| match s.store.edit(row, edit) {
            Some(change) => {
                shared.commit(s, change);
                true
            }
            None => false,
        })
    }

    pub fn set_characteristic(&self, characteristic: Characteristic) {
        let shared = &self.shared;
        shared.state.update(|s| {
            if let Some(change) = s.store.set_characteristic(characteristic) {
                shared.commit(s, change);
            }
        });
    }

    /// Reacts to a change made to the route outside of this engine.
    pub fn apply_model_change(&self, change: ModelChange) {
        let shared = &self.shared;
        shared.state.update(|s| shared.commit(s, change));
    }

    pub fn positions(&self) -> Vec<Arc<Position>> {
        self.shared.state.read(|s| s.store.positions().to_vec())
    }

    pub fn position(&self, row: usize) -> Option<Arc<Position>> {
        self.shared.state.read(|s| s.store.position(row).cloned())
    }

    pub fn index_of(&self, id: PositionId) -> Option<usize> {
        self.shared.state.read(|s| s.store.index_of(id))
    }

    pub fn closest_position(&self, longitude: f64, latitude: f64, threshold_m: f64) -> Option<usize> {
        self.shared
            .state
            .read(|s| s.store.closest_position(longitude, latitude, threshold_m))
    }

    pub fn contained_positions(&self, north_east: (f64, f64), south_west: (f64, f64)) -> Vec<usize> {
        self.shared
            .state
            .read(|s| s.store.contained_positions(north_east, south_west))
    }

    pub fn characteristic(&self) -> Characteristic {
        self.shared.state.read(|s| s.store.characteristic())
    }

    pub fn set_selected_positions(&self, indices: &[usize], replace: bool) {
        let selection = self.shared.state.update(|s| {
            s.set_selection(indices, replace);
            s.selection.clone()
        });
        self.shared.listeners.selection_changed(&selection);
    }

    pub fn selected_positions(&self) -> Vec<usize> {
        self.shared.state.read(|s| s.selection.clone())
    }

    /// Centers the map on `position` with the next selection repaint.
    pub fn set_center(&self, position: &Position) {
        let Some(center) = position.coordinates() else {
            return;
        };
        self.shared.state.update(|s| {
            s.center = Some(center);
            s.flags.recenter_map = true;
            s.flags.selection_reason = "center map".to_string();
        });
    }

    pub fn travel_options(&self) -> TravelOptions {
        self.shared.state.read(|s| s.travel)
    }

    /// Re-renders a turn-by-turn route when its options change.
    pub fn set_travel_options(&self, options: TravelOptions) {
        self.update_travel(|travel| *travel = options);
    }

    pub fn set_travel_mode(&self, mode: TravelMode) {
        self.update_travel(|travel| travel.mode = mode);
    }

    pub fn set_avoid_highways(&self, avoid: bool) {
        self.update_travel(|travel| travel.avoid_highways = avoid);
    }

    pub fn set_avoid_tolls(&self, avoid: bool) {
        self.update_travel(|travel| travel.avoid_tolls = avoid);
    }

    fn update_travel(&self, f: impl FnOnce(&mut TravelOptions)) {
        self.shared.state.update(|s| {
            let before = s.travel;
            f(&mut s.travel);
            if s.travel != before && s.store.characteristic() == Characteristic::Route {
                s.request_update(false);
            }
        });
    }

    pub fn set_recenter_after_zooming(&self, recenter: bool) {
        self.shared.state.update(|s| s.recenter_after_zooming = recenter);
    }

    pub fn insert_all_waypoints(&self, start_rows: &[usize]) -> usize {
        self.insert_waypoints_between(start_rows, InsertionMode::AllWaypoints)
    }

    pub fn insert_only_turnpoints(&self, start_rows: &[usize]) -> usize {
        self.insert_waypoints_between(start_rows, InsertionMode::OnlyTurnpoints)
    }

    /// Asks the surface to fill the legs starting at `start_rows` with waypoints.
    ///
    /// Every start row but the last is paired with its successor. Returns the
    /// number of requested legs; results arrive later as callbacks.
    pub fn insert_waypoints_between(&self, start_rows: &[usize], mode: InsertionMode) -> usize {
        let shared = &self.shared;
        let (legs, travel) = shared.state.read(|s| {
            let positions = s.store.positions();
            let legs: Vec<(Arc<Position>, Arc<Position>)> = start_rows
                .iter()
                .take(start_rows.len().saturating_sub(1))
                .filter(|&&row| row + 1 < positions.len())
                .map(|&row| (Arc::clone(&positions[row]), Arc::clone(&positions[row + 1])))
                .collect();
            (legs, s.travel)
        });
        if legs.is_empty() {
            return 0;
        }

        let requests: Vec<RenderCommand> = legs
            .into_iter()
            .map(|(from, to)| {
                let key = shared.pending.register(PendingInsertion {
                    mode,
                    predecessor: Arc::clone(&from),
                    successor: Arc::clone(&to),
                });
                RenderCommand::InsertWaypoints {
                    mode,
                    key,
                    from,
                    to,
                    travel,
                }
            })
            .collect();
        let count = requests.len();
        let pause = shared.config.waypoint_request_pause();
        shared.submit(PRIORITY_WAYPOINTS, "insert waypoints", move |shared| {
            for (i, request) in requests.into_iter().enumerate() {
                if shared.token.is_cancelled() {
                    return;
                }
                if i > 0 {
                    std::thread::sleep(pause);
                }
                shared.execute(request);
            }
        });
        debug!(legs = count, mode = mode.header(), "requested waypoint insertion");
        count
    }

    pub fn print(&self, with_route: bool) {
        self.shared.execute(RenderCommand::Print { with_route });
    }

    /// Center of the map bounds the surface currently shows.
    pub fn center(&self) -> Option<Position> {
        match query_bounds(self.shared.surface.as_ref()) {
            Ok(bounds) => bounds.map(|b| {
                let (longitude, latitude) = b.center();
                Position::at(longitude, latitude)
            }),
            Err(err) => {
                warn!(error = %err, "cannot query map bounds");
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Drop for MapView {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MapView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapView")
            .field("initialized", &self.is_initialized())
            .field("callback_port", &self.callback_port())
            .field("polling", &self.is_polling())
            .finish()
    }
}

/// Moves the selection out of the way of an insertion; returns the first inserted row.
fn shifted(state: &mut MapState, change: ModelChange) -> Option<usize> {
    match change {
        ModelChange::Inserted { first, last } => {
            state.shift_selection_after_insert(first, last - first + 1);
            Some(first)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::time::Duration;

    use foundation::{Characteristic, Position, Route};
    use pretty_assertions::assert_eq;

    use super::MapView;
    use crate::config::MapViewConfig;
    use crate::error::{MapViewError, SurfaceError};
    use crate::listener::MapViewListener;
    use crate::store::Edit;
    use crate::surface::{RenderCommand, TravelMode};
    use crate::testing::{RecordingSurface, wait_until};

    fn fast_config() -> MapViewConfig {
        MapViewConfig {
            route_wait_ms: 20,
            route_min_interval_ms: 50,
            selection_wait_ms: 20,
            selection_min_interval_ms: 20,
            handshake_timeout_ms: 200,
            poll_interval_ms: 20,
            shutdown_grace_ms: 1_000,
            waypoint_request_pause_ms: 1,
            callback_listener: false,
            ..MapViewConfig::default()
        }
    }

    fn track(n: usize) -> Route {
        Route::new(
            Characteristic::Track,
            (0..n).map(|i| Position::at(10.0 + i as f64 * 0.01, 53.0)).collect(),
        )
    }

    #[derive(Default)]
    struct PortRecorder(AtomicU16);

    impl MapViewListener for PortRecorder {
        fn calculated_distance(&self, _meters: u64, _seconds: u64) {}

        fn received_callback(&self, port: u16) {
            self.0.store(port, Ordering::SeqCst);
        }
    }

    #[test]
    fn failed_initialization_is_kept() {
        let surface = Arc::new(RecordingSurface::failing());
        let view = MapView::new(fast_config(), surface.clone()).unwrap();
        let err = view.start().unwrap_err();
        assert!(matches!(*err, MapViewError::Surface(SurfaceError::Unavailable(_))));
        assert!(!view.is_initialized());
        assert!(view.initialization_cause().is_some());
        assert!(!view.is_polling());
        assert!(surface.commands().is_empty());
    }

    #[test]
    fn replaced_route_is_centered_and_drawn() {
        let surface = Arc::new(RecordingSurface::default());
        let view = MapView::new(fast_config(), surface.clone()).unwrap();
        view.start().unwrap();
        view.set_route(Some(track(5)));

        assert!(wait_until(Duration::from_secs(5), || {
            surface.names().contains(&"polyline")
        }));
        let names = surface.names();
        let fit = names.iter().position(|&n| n == "fit-bounds").unwrap();
        let polyline = names.iter().position(|&n| n == "polyline").unwrap();
        assert!(fit < polyline);
        assert_eq!(surface.commands()[0], RenderCommand::SetCallbackPort(-1));
        assert!(view.shared().state.read(|s| s.zoom_suppression.is_armed()));
        view.stop();
    }

    #[test]
    fn stop_is_idempotent_and_rejects_restart() {
        let surface = Arc::new(RecordingSurface::default());
        let view = MapView::new(fast_config(), surface).unwrap();
        view.start().unwrap();
        view.stop();
        view.stop();
        assert!(matches!(*view.start().unwrap_err(), MapViewError::Disposed));
    }

    #[test]
    fn silent_surface_falls_back_to_polling() {
        let surface = Arc::new(RecordingSurface::default());
        let view = MapView::new(
            MapViewConfig {
                callback_listener: true,
                ..fast_config()
            },
            surface.clone(),
        )
        .unwrap();
        view.start().unwrap();
        let port = view.callback_port().unwrap();
        assert!(wait_until(Duration::from_secs(5), || view.is_polling()));

        let commands = surface.commands();
        assert!(commands.contains(&RenderCommand::SetCallbackPort(i32::from(port))));
        assert!(commands.contains(&RenderCommand::CheckCallbackPort));
        assert!(commands.contains(&RenderCommand::SetCallbackPort(-1)));

        view.set_route(Some(track(3)));
        surface.push_callback("select-position/53.0/10.01/50/true");
        assert!(wait_until(Duration::from_secs(5), || {
            view.selected_positions() == vec![1]
        }));
        view.stop();
    }

    #[test]
    fn answering_surface_keeps_the_listener() {
        let surface = Arc::new(RecordingSurface::answering());
        let view = MapView::new(
            MapViewConfig {
                callback_listener: true,
                handshake_timeout_ms: 5_000,
                ..fast_config()
            },
            surface.clone(),
        )
        .unwrap();
        let recorder = Arc::new(PortRecorder::default());
        view.add_listener(recorder.clone());
        view.start().unwrap();
        let port = view.callback_port().unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            recorder.0.load(Ordering::SeqCst) == port
        }));
        std::thread::sleep(Duration::from_millis(100));
        assert!(!view.is_polling());
        assert!(!surface.commands().contains(&RenderCommand::SetCallbackPort(-1)));
        view.stop();
    }

    #[test]
    fn structural_edits_keep_selection_on_the_same_positions() {
        let surface = Arc::new(RecordingSurface::default());
        let view = MapView::new(fast_config(), surface).unwrap();
        view.set_route(Some(track(4)));
        view.set_selected_positions(&[1, 3], true);

        let row = view.add_position(0, Position::at(9.0, 53.0));
        assert_eq!(row, 0);
        assert_eq!(view.selected_positions(), vec![2, 4]);
        assert!(view.remove_positions(&[2]));
        assert_eq!(view.selected_positions(), vec![3]);
        assert!(view.edit(0, Edit::Comment(Some("start".to_string()))));
        assert_eq!(view.position(0).unwrap().comment.as_deref(), Some("start"));
    }

    #[test]
    fn travel_changes_only_matter_for_routes() {
        let surface = Arc::new(RecordingSurface::default());
        let view = MapView::new(fast_config(), surface).unwrap();
        view.set_route(Some(track(3)));
        view.shared().state.update(|s| s.flags = Default::default());

        view.set_travel_mode(TravelMode::Walking);
        assert!(!view.shared().state.read(|s| s.flags.update_route));

        view.set_characteristic(Characteristic::Route);
        view.shared().state.update(|s| s.flags = Default::default());
        view.set_avoid_tolls(true);
        assert!(view.shared().state.read(|s| s.flags.update_route));
        assert_eq!(view.travel_options().mode, TravelMode::Walking);
    }

    #[test]
    fn waypoint_requests_pair_each_leg() {
        let surface = Arc::new(RecordingSurface::default());
        let view = MapView::new(fast_config(), surface.clone()).unwrap();
        view.set_route(Some(track(4)));

        // The last start row has no leg of its own.
        assert_eq!(view.insert_all_waypoints(&[0, 2]), 1);
        assert_eq!(view.insert_only_turnpoints(&[3, 3]), 0);
        assert!(wait_until(Duration::from_secs(5), || {
            surface.names().contains(&"insert-waypoints")
        }));
        assert_eq!(view.shared().pending.len(), 1);
    }
}
