use std::sync::Arc;

use foundation::{GeoBounds, Position};

use crate::flags::DirtyFlags;
use crate::store::{ModelChange, PositionStore};
use crate::surface::TravelOptions;

/// Positions last rendered as selected, in marker order.
pub type SelectionSnapshot = Arc<[Arc<Position>]>;

/// Running totals reported by directions batches.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DistanceTotals {
    pub meters: u64,
    pub seconds: u64,
}

/// One-shot guard that swallows the zoom callback caused by our own recentering.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ZoomSuppression {
    armed: bool,
}

impl ZoomSuppression {
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Disarms and returns whether the guard was armed.
    pub fn consume(&mut self) -> bool {
        std::mem::take(&mut self.armed)
    }
}

/// Everything guarded by the coordination lock.
#[derive(Debug)]
pub struct MapState {
    pub store: PositionStore,
    /// Selected rows, in the order they were selected.
    pub selection: Vec<usize>,
    pub rendered_selection: SelectionSnapshot,
    pub flags: DirtyFlags,
    /// Explicit center for selection recentering, `(lon, lat)`.
    pub center: Option<(f64, f64)>,
    /// Bounds of the positions kept by the last viewport reduction.
    pub visible: Option<GeoBounds>,
    pub travel: TravelOptions,
    pub recenter_after_zooming: bool,
    pub initialized: bool,
    /// No route has been centered yet.
    pub first_start: bool,
    pub zoom_suppression: ZoomSuppression,
    pub last_zoom: Option<i32>,
    pub distance: DistanceTotals,
}

impl Default for MapState {
    fn default() -> Self {
        Self {
            store: PositionStore::new(),
            selection: Vec::new(),
            rendered_selection: Arc::from(Vec::new()),
            flags: DirtyFlags::default(),
            center: None,
            visible: None,
            travel: TravelOptions::default(),
            recenter_after_zooming: false,
            initialized: false,
            first_start: true,
            zoom_suppression: ZoomSuppression::default(),
            last_zoom: None,
            distance: DistanceTotals::default(),
        }
    }
}

impl MapState {
    /// Schedules a route update. Returns `true` if the significance cache must be cleared.
    pub fn request_update(&mut self, replace: bool) -> bool {
        self.flags.update_route = true;
        self.flags.route_reason = "update route".to_string();
        if replace {
            self.flags.replace_route = true;
            self.flags.route_reason = "replace route".to_string();
            self.flags.repaint_selection = true;
            self.flags.selection_reason = "replace route".to_string();
        }
        replace
    }

    /// Immediate repaint keeping the current map center. Always invalidates significance.
    pub fn request_update_without_recenter(&mut self) -> bool {
        self.flags.repaint_route_immediately = true;
        self.flags.route_reason = "update route but don't recenter".to_string();
        true
    }

    pub fn request_selection_repaint(&mut self, reason: &str) {
        self.flags.repaint_selection = true;
        self.flags.selection_reason = reason.to_string();
    }

    /// Replaces or extends the selection and schedules a recentering repaint.
    pub fn set_selection(&mut self, indices: &[usize], replace: bool) {
        if replace {
            self.selection = indices.to_vec();
        } else {
            self.selection.extend_from_slice(indices);
        }
        self.flags.recenter_map = true;
        self.flags.repaint_selection = true;
        self.flags.selection_reason = format!(
            "selected {} positions; replacing selection: {replace}",
            indices.len()
        );
    }

    /// Keeps selected rows pointing at the same positions after `count` rows were inserted at `row`.
    pub fn shift_selection_after_insert(&mut self, row: usize, count: usize) {
        for index in self.selection.iter_mut() {
            if *index >= row {
                *index += count;
            }
        }
    }

    /// Drops removed rows from the selection and shifts the rest down.
    pub fn shift_selection_after_removal(&mut self, removed: &[usize]) {
        let mut removed = removed.to_vec();
        removed.sort_unstable();
        removed.dedup();
        self.selection.retain(|index| removed.binary_search(index).is_err());
        for index in self.selection.iter_mut() {
            let current = *index;
            *index -= removed.partition_point(|&r| r < current);
        }
    }

    /// Raises the flags a change of the position list calls for.
    ///
    /// Returns `true` if the significance cache must be cleared.
    pub fn apply_model_change(&mut self, change: ModelChange) -> bool {
        match change {
            ModelChange::Inserted { .. } | ModelChange::Deleted { .. } => {
                self.request_update_without_recenter()
            }
            ModelChange::AllRowsChanged => self.request_update(true),
            ModelChange::CharacteristicChanged => self.request_update_without_recenter(),
            ModelChange::Updated {
                first,
                last,
                column,
            } => {
                if !column.is_rendered() {
                    return false;
                }
                self.request_update(false);
                if column.touches_coordinates()
                    && self.selection.iter().any(|&i| (first..=last).contains(&i))
                {
                    self.request_selection_repaint("update selection");
                }
                false
            }
        }
    }
}
