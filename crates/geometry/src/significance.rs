use std::sync::Arc;

use foundation::Position;
use foundation::math::cross_track_distance;

/// Map scale per zoom level (index = zoom), used to derive the significance threshold.
pub const ZOOM_LEVEL_SCALE: [f64; 18] = [
    400_000_000.0,
    200_000_000.0,
    100_000_000.0,
    50_000_000.0,
    25_000_000.0,
    12_500_000.0,
    6_400_000.0,
    3_200_000.0,
    1_600_000.0,
    800_000.0,
    400_000.0,
    200_000.0,
    100_000.0,
    50_000.0,
    25_000.0,
    12_500.0,
    6_400.0,
    3_200.0,
];

/// Zoom levels above this keep every position.
pub const MAXIMUM_ZOOM_LEVEL_FOR_SIGNIFICANCE: i32 = 16;

const SCALE_TO_THRESHOLD_DIVISOR: f64 = 2500.0;

/// Douglas–Peucker threshold in meters, or `None` if every position is significant.
pub fn threshold_for_zoom(zoom: Option<i32>) -> Option<f64> {
    let zoom = zoom?;
    if !(0..=MAXIMUM_ZOOM_LEVEL_FOR_SIGNIFICANCE).contains(&zoom) {
        return None;
    }
    Some(ZOOM_LEVEL_SCALE[zoom as usize] / SCALE_TO_THRESHOLD_DIVISOR)
}

/// Bitset of significant indices over a fixed number of positions.
///
/// Iteration yields indices in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignificanceSet {
    words: Vec<u64>,
    universe: usize,
    len: usize,
}

impl SignificanceSet {
    /// Empty set over `universe` positions.
    pub fn none(universe: usize) -> Self {
        Self {
            words: vec![0; universe.div_ceil(64)],
            universe,
            len: 0,
        }
    }

    /// Every one of `universe` positions is significant.
    pub fn all(universe: usize) -> Self {
        let mut set = Self::none(universe);
        for word in set.words.iter_mut() {
            *word = u64::MAX;
        }
        let tail = universe % 64;
        if tail != 0
            && let Some(last) = set.words.last_mut()
        {
            *last = (1u64 << tail) - 1;
        }
        set.len = universe;
        set
    }

    /// Number of positions this set was computed for.
    pub fn universe(&self) -> usize {
        self.universe
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        let (word, bit) = word_bit(index);
        self.words
            .get(word)
            .is_some_and(|w| (w & (1u64 << bit)) != 0)
    }

    /// Returns `true` if the set changed. Indices outside the universe are ignored.
    pub fn insert(&mut self, index: usize) -> bool {
        if index >= self.universe {
            return false;
        }
        let (word, bit) = word_bit(index);
        let mask = 1u64 << bit;
        let w = &mut self.words[word];
        if (*w & mask) != 0 {
            return false;
        }
        *w |= mask;
        self.len += 1;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(word_idx * 64 + tz)
            })
        })
    }

    /// Keeps the positions whose index is in the set, in order.
    pub fn select(&self, positions: &[Arc<Position>]) -> Vec<Arc<Position>> {
        self.iter()
            .filter_map(|index| positions.get(index).cloned())
            .collect()
    }
}

fn word_bit(index: usize) -> (usize, u32) {
    (index / 64, (index % 64) as u32)
}

/// Douglas–Peucker over cross-track distance: indices whose removal would move
/// the line by more than `threshold_m` meters. First and last are always kept.
///
/// Positions without coordinates are never significant unless they are an endpoint.
pub fn significant_positions(positions: &[Arc<Position>], threshold_m: f64) -> SignificanceSet {
    let n = positions.len();
    let mut set = SignificanceSet::none(n);
    if n == 0 {
        return set;
    }
    set.insert(0);
    set.insert(n - 1);
    if n < 3 {
        return set;
    }

    let mut ranges = vec![(0usize, n - 1)];
    while let Some((start, end)) = ranges.pop() {
        if end <= start + 1 {
            continue;
        }
        let (Some(a), Some(b)) = (positions[start].coordinates(), positions[end].coordinates()) else {
            continue;
        };

        let mut max_distance = 0.0;
        let mut max_index = None;
        for (index, position) in positions.iter().enumerate().take(end).skip(start + 1) {
            let Some(p) = position.coordinates() else {
                continue;
            };
            let distance = cross_track_distance(a, b, p);
            if distance > max_distance {
                max_distance = distance;
                max_index = Some(index);
            }
        }

        if let Some(index) = max_index
            && max_distance > threshold_m
        {
            set.insert(index);
            ranges.push((start, index));
            ranges.push((index, end));
        }
    }
    set
}

/// Significance of `positions` at `zoom`; all positions for zoom levels above 16 or an unknown zoom.
pub fn significance_for_zoom(positions: &[Arc<Position>], zoom: Option<i32>) -> SignificanceSet {
    match threshold_for_zoom(zoom) {
        Some(threshold) => significant_positions(positions, threshold),
        None => SignificanceSet::all(positions.len()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use foundation::Position;
    use pretty_assertions::assert_eq;

    use super::{SignificanceSet, significance_for_zoom, significant_positions, threshold_for_zoom};

    fn line(coords: &[(f64, f64)]) -> Vec<Arc<Position>> {
        coords
            .iter()
            .map(|&(lon, lat)| Arc::new(Position::at(lon, lat)))
            .collect()
    }

    #[test]
    fn thresholds_follow_the_scale_table() {
        assert_eq!(threshold_for_zoom(Some(0)), Some(160_000.0));
        assert_eq!(threshold_for_zoom(Some(16)), Some(2.56));
        assert_eq!(threshold_for_zoom(Some(17)), None);
        assert_eq!(threshold_for_zoom(Some(-1)), None);
        assert_eq!(threshold_for_zoom(None), None);
    }

    #[test]
    fn all_sets_exactly_universe_bits() {
        let set = SignificanceSet::all(70);
        assert_eq!(set.len(), 70);
        assert!(set.contains(69));
        assert!(!set.contains(70));
        assert_eq!(set.iter().count(), 70);
    }

    #[test]
    fn straight_line_keeps_only_endpoints() {
        let positions = line(&[(0.0, 0.0), (0.25, 0.0), (0.5, 0.0), (0.75, 0.0), (1.0, 0.0)]);
        let set = significant_positions(&positions, 1.0);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 4]);
    }

    #[test]
    fn detour_beyond_threshold_is_kept() {
        // 0.01 degrees of latitude is roughly 1.1 km.
        let positions = line(&[(0.0, 0.0), (0.5, 0.0), (1.0, 0.01), (1.5, 0.0), (2.0, 0.0)]);
        let coarse = significant_positions(&positions, 5_000.0);
        let fine = significant_positions(&positions, 100.0);
        assert_eq!(coarse.iter().collect::<Vec<_>>(), vec![0, 4]);
        assert!(fine.contains(2));
        assert!(fine.contains(0) && fine.contains(4));
    }

    #[test]
    fn high_zoom_keeps_everything() {
        let positions = line(&[(0.0, 0.0), (0.5, 0.0), (1.0, 0.0)]);
        assert_eq!(significance_for_zoom(&positions, Some(17)).len(), 3);
        assert_eq!(significance_for_zoom(&positions, Some(2)).len(), 2);
    }

    #[test]
    fn select_keeps_order() {
        let positions = line(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let mut set = SignificanceSet::none(3);
        set.insert(2);
        set.insert(0);
        let picked = set.select(&positions);
        assert_eq!(picked[0].id(), positions[0].id());
        assert_eq!(picked[1].id(), positions[2].id());
    }
}
