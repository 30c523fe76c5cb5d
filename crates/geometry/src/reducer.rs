use std::sync::Arc;
use std::time::Instant;

use foundation::{GeoBounds, Position};
use tracing::debug;

use crate::cache::SignificanceLookup;

/// Tuning knobs of the reduction pipeline.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ReductionSettings {
    /// Inputs above this length are strided down before anything else.
    pub hard_cap: usize,
    /// Viewport margin for route rendering, in viewport widths per side.
    pub render_viewport_factor: f64,
    /// Viewport margin for selection rendering.
    pub selection_viewport_factor: f64,
}

impl Default for ReductionSettings {
    fn default() -> Self {
        Self {
            hard_cap: 50_000,
            render_viewport_factor: 2.5,
            selection_viewport_factor: 1.25,
        }
    }
}

/// What the surface currently shows.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct MapViewport {
    pub zoom: Option<i32>,
    pub bounds: Option<GeoBounds>,
}

#[derive(Debug, Clone, Default)]
pub struct Reduction {
    pub positions: Vec<Arc<Position>>,
    /// Bounds of the positions kept by the viewport stage, if it ran.
    pub visible: Option<GeoBounds>,
}

/// Drops positions missing longitude or latitude.
pub fn filter_positions_without_coordinates(positions: &[Arc<Position>]) -> Vec<Arc<Position>> {
    positions
        .iter()
        .filter(|p| p.has_coordinates())
        .cloned()
        .collect()
}

/// Evenly spaced subsequence of exactly `max_count` positions keeping first and last.
pub fn filter_every_nth(positions: &[Arc<Position>], max_count: usize) -> Vec<Arc<Position>> {
    let n = positions.len();
    if n <= max_count {
        return positions.to_vec();
    }
    match max_count {
        0 => return Vec::new(),
        1 => return positions[..1].to_vec(),
        _ => {}
    }

    let interior = max_count - 2;
    let mut result = Vec::with_capacity(max_count);
    result.push(Arc::clone(&positions[0]));
    for k in 0..interior {
        result.push(Arc::clone(&positions[1 + k * (n - 2) / interior]));
    }
    result.push(Arc::clone(&positions[n - 1]));
    result
}

/// Keeps positions inside `bounds` grown by `factor`; optionally keeps first and last regardless.
fn filter_visible(
    positions: &[Arc<Position>],
    bounds: GeoBounds,
    factor: f64,
    keep_first_and_last: bool,
) -> Vec<Arc<Position>> {
    let area = bounds.expanded(factor);
    let last = positions.len().saturating_sub(1);
    positions
        .iter()
        .enumerate()
        .filter(|(index, p)| {
            (keep_first_and_last && (*index == 0 || *index == last)) || area.contains_position(p)
        })
        .map(|(_, p)| Arc::clone(p))
        .collect()
}

/// Bounded, representative subset of a route for rendering.
pub fn reduce_for_render(
    positions: &[Arc<Position>],
    viewport: MapViewport,
    max_count: usize,
    settings: &ReductionSettings,
    significance: &impl SignificanceLookup,
) -> Reduction {
    if positions.len() < 2 {
        return Reduction {
            positions: positions.to_vec(),
            visible: None,
        };
    }
    let start = Instant::now();
    let input = positions.len();

    let capped;
    let mut current: &[Arc<Position>] = positions;
    if current.len() > settings.hard_cap {
        capped = filter_every_nth(current, settings.hard_cap);
        current = &capped;
    }

    let significant = significance.significant(current, viewport.zoom);
    let mut reduced = significant.select(current);
    let after_significance = reduced.len();

    let mut visible = None;
    if reduced.len() > max_count
        && let Some(bounds) = viewport.bounds
    {
        reduced = filter_visible(&reduced, bounds, settings.render_viewport_factor, true);
        visible = GeoBounds::of_positions(reduced.iter().map(|p| p.as_ref()));
    }

    if reduced.len() > max_count {
        reduced = filter_every_nth(&reduced, max_count);
    }

    debug!(
        input,
        significant = after_significance,
        output = reduced.len(),
        max_count,
        zoom = viewport.zoom.unwrap_or(-1),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "reduced positions for rendering"
    );
    Reduction {
        positions: reduced,
        visible,
    }
}

/// Selected positions to render: out-of-range indices and positions without
/// coordinates are dropped, then viewport and stride filters bound the count.
pub fn reduce_for_selection(
    positions: &[Arc<Position>],
    selected_indices: &[usize],
    viewport: Option<GeoBounds>,
    max_count: usize,
    settings: &ReductionSettings,
) -> Vec<Arc<Position>> {
    let mut selected: Vec<Arc<Position>> = selected_indices
        .iter()
        .filter_map(|&index| positions.get(index))
        .filter(|p| p.has_coordinates())
        .cloned()
        .collect();

    if selected.len() > max_count
        && let Some(bounds) = viewport
    {
        selected = filter_visible(&selected, bounds, settings.selection_viewport_factor, false);
    }
    if selected.len() > max_count {
        selected = filter_every_nth(&selected, max_count);
    }
    selected
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use foundation::{GeoBounds, Position};
    use pretty_assertions::assert_eq;

    use super::{
        MapViewport, ReductionSettings, filter_every_nth, filter_positions_without_coordinates,
        reduce_for_render, reduce_for_selection,
    };
    use crate::cache::Uncached;

    fn track(n: usize) -> Vec<Arc<Position>> {
        (0..n)
            .map(|i| Arc::new(Position::at(i as f64 * 0.0001, (i % 7) as f64 * 0.0001)))
            .collect()
    }

    fn ids(positions: &[Arc<Position>]) -> Vec<u64> {
        positions.iter().map(|p| p.id().get()).collect()
    }

    #[test]
    fn stride_is_exact_and_keeps_endpoints() {
        let input = track(1_000);
        let out = filter_every_nth(&input, 37);
        assert_eq!(out.len(), 37);
        assert_eq!(out[0].id(), input[0].id());
        assert_eq!(out[36].id(), input[999].id());

        let mut seen = ids(&out);
        seen.dedup();
        assert_eq!(seen.len(), 37);
    }

    #[test]
    fn short_inputs_pass_through() {
        let one = track(1);
        let out = reduce_for_render(&one, MapViewport::default(), 10, &ReductionSettings::default(), &Uncached);
        assert_eq!(ids(&out.positions), ids(&one));
        assert!(out.visible.is_none());
    }

    #[test]
    fn hard_cap_limits_huge_inputs() {
        let input = track(60_000);
        let out = reduce_for_render(
            &input,
            MapViewport::default(),
            100_000,
            &ReductionSettings::default(),
            &Uncached,
        );
        assert_eq!(out.positions.len(), 50_000);
        assert_eq!(out.positions[0].id(), input[0].id());
        assert_eq!(out.positions[49_999].id(), input[59_999].id());
        assert!(out.visible.is_none());
    }

    #[test]
    fn viewport_stage_keeps_first_and_last_and_records_corners() {
        let input = track(500);
        let viewport = MapViewport {
            zoom: None,
            bounds: Some(GeoBounds::new(0.001, 0.0101, 0.0, 0.01)),
        };
        let out = reduce_for_render(&input, viewport, 50, &ReductionSettings::default(), &Uncached);

        assert!(out.positions.len() <= 50);
        assert_eq!(out.positions.first().unwrap().id(), input[0].id());
        assert_eq!(out.positions.last().unwrap().id(), input[499].id());
        let visible = out.visible.unwrap();
        assert_eq!(visible.west, 0.0);
        assert!((visible.east - 499.0 * 0.0001).abs() < 1e-12);
    }

    #[test]
    fn unknown_bounds_leave_no_visible_corners() {
        let input = track(500);
        let out = reduce_for_render(&input, MapViewport::default(), 50, &ReductionSettings::default(), &Uncached);
        assert_eq!(out.positions.len(), 50);
        assert!(out.visible.is_none());
    }

    #[test]
    fn selection_drops_stale_and_coordinate_less_entries() {
        let mut input = track(5);
        input[2] = Arc::new(Position::new(None, Some(1.0)));
        let out = reduce_for_selection(&input, &[4, 2, 0, 9], None, 50, &ReductionSettings::default());
        assert_eq!(ids(&out), vec![input[4].id().get(), input[0].id().get()]);
    }

    #[test]
    fn selection_viewport_does_not_force_endpoints() {
        let input = track(100);
        let indices: Vec<usize> = (0..100).collect();
        let bounds = GeoBounds::new(0.001, 0.0051, 0.0, 0.0049);
        let out = reduce_for_selection(&input, &indices, Some(bounds), 50, &ReductionSettings::default());
        assert!(!out.is_empty());
        assert!(out.len() < 50);
        assert_ne!(out[0].id(), input[0].id());
        assert_ne!(out.last().unwrap().id(), input[99].id());
    }

    #[test]
    fn positions_without_coordinates_are_filtered() {
        let input = vec![
            Arc::new(Position::at(1.0, 1.0)),
            Arc::new(Position::new(Some(1.0), None)),
            Arc::new(Position::new(None, None)),
        ];
        assert_eq!(filter_positions_without_coordinates(&input).len(), 1);
    }
}
