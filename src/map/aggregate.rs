//! Reduces runs of raw cluster states to one display state per cell.
//!
//! The highest-priority state in a run wins. Majority voting would let a
//! mostly-free region hide the single fragmented cluster inside it.

use super::layout::GridGeometry;
use super::palette::Palette;
use crate::models::{CellState, ClusterState, VolumeSnapshot};
use rayon::prelude::*;
use std::ops::Range;

/// Grids smaller than this are aggregated on the calling thread.
const PARALLEL_MIN_CELLS: usize = 4_096;

/// What cells past the last real cluster display.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TailPolicy {
    /// Reserved out-of-range state (renders blank).
    #[default]
    Blank,
    /// Repeat the state of the last real cell.
    ExtendLast,
}

pub struct StateAggregator<'p> {
    palette: &'p Palette,
    tail: TailPolicy,
}

impl<'p> StateAggregator<'p> {
    pub fn new(palette: &'p Palette, tail: TailPolicy) -> Self {
        Self { palette, tail }
    }

    /// Highest-priority state of `run`. An empty run is out of range.
    pub fn reduce(&self, run: &[ClusterState]) -> CellState {
        let top = self.palette.top_rank();
        let mut winner: Option<ClusterState> = None;
        for &state in run {
            if winner.map_or(true, |best| self.palette.outranks(state, best)) {
                winner = Some(state);
                if self.palette.rank(state) == top {
                    break;
                }
            }
        }
        winner.map_or(CellState::OutOfRange, CellState::Cluster)
    }

    /// Reduce `clusters[range]`.
    ///
    /// A range past the end of the snapshot is a geometry bug; debug builds
    /// assert on it, release builds clamp to the valid clusters.
    pub fn reduce_range(&self, clusters: &[ClusterState], range: Range<usize>) -> CellState {
        debug_assert!(
            range.end <= clusters.len(),
            "run {range:?} exceeds snapshot of {} clusters",
            clusters.len()
        );
        let end = range.end.min(clusters.len());
        let start = range.start.min(end);
        self.reduce(&clusters[start..end])
    }

    /// Aggregate a whole snapshot into `geometry.cell_count()` cells, row-major.
    pub fn aggregate(&self, snapshot: &VolumeSnapshot, geometry: &GridGeometry) -> Vec<CellState> {
        let clusters = snapshot.as_slice();
        let mut cells = vec![CellState::OutOfRange; geometry.cell_count()];
        let used = geometry.used_cells();

        let fill = |(i, cell): (usize, &mut CellState)| {
            *cell = self.reduce_range(clusters, geometry.cluster_range(i));
        };
        if used >= PARALLEL_MIN_CELLS {
            cells[..used].par_iter_mut().enumerate().for_each(fill);
        } else {
            cells[..used].iter_mut().enumerate().for_each(fill);
        }

        if self.tail == TailPolicy::ExtendLast && used > 0 {
            let last = cells[used - 1];
            cells[used..].fill(last);
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::layout::{CellPos, GridLayoutEngine, ScaleMode, SurfaceSize};
    use ClusterState::*;

    fn layout(n: usize, cols: u16, rows: u16) -> GridGeometry {
        GridLayoutEngine::new(ScaleMode::Compress, CellPos::default())
            .compute(n, SurfaceSize::new(cols, rows))
            .unwrap()
    }

    #[test]
    fn test_highest_priority_wins() {
        let palette = Palette::standard();
        let agg = StateAggregator::new(&palette, TailPolicy::Blank);
        assert_eq!(agg.reduce(&[Free, Free, Free, Busy]), CellState::Cluster(Busy));
        assert_eq!(
            agg.reduce(&[Free, Free, Fragmented, Busy]),
            CellState::Cluster(Fragmented)
        );
    }

    #[test]
    fn test_single_fragment_beats_majority() {
        let palette = Palette::standard();
        let agg = StateAggregator::new(&palette, TailPolicy::Blank);
        let mut run = vec![Free; 100];
        run[63] = Fragmented;
        assert_eq!(agg.reduce(&run), CellState::Cluster(Fragmented));
    }

    #[test]
    fn test_empty_run_is_out_of_range() {
        let palette = Palette::standard();
        let agg = StateAggregator::new(&palette, TailPolicy::Blank);
        assert_eq!(agg.reduce(&[]), CellState::OutOfRange);
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let palette = Palette::standard();
        let agg = StateAggregator::new(&palette, TailPolicy::Blank);
        let run = [Directory, Compressed, Busy, Unmovable, Free, Unknown];
        let first = agg.reduce(&run);
        assert_eq!(first, agg.reduce(&run));
        assert_eq!(first, CellState::Cluster(Unmovable));
    }

    #[test]
    fn test_aggregate_four_to_one() {
        let palette = Palette::standard();
        let agg = StateAggregator::new(&palette, TailPolicy::Blank);
        let mut clusters = vec![Free; 400];
        clusters[3] = Busy;
        clusters[6] = Fragmented;
        clusters[7] = Busy;
        let snapshot = VolumeSnapshot::new(clusters);
        let cells = agg.aggregate(&snapshot, &layout(400, 10, 10));
        assert_eq!(cells.len(), 100);
        assert_eq!(cells[0], CellState::Cluster(Busy));
        assert_eq!(cells[1], CellState::Cluster(Fragmented));
        assert!(cells[2..].iter().all(|&c| c == CellState::Cluster(Free)));
    }

    #[test]
    fn test_tiny_volume_leaves_blank_tail() {
        let palette = Palette::standard();
        let agg = StateAggregator::new(&palette, TailPolicy::Blank);
        let snapshot = VolumeSnapshot::new(vec![Free; 5]);
        let cells = agg.aggregate(&snapshot, &layout(5, 10, 10));
        assert!(cells[..5].iter().all(|&c| c == CellState::Cluster(Free)));
        assert_eq!(
            cells[5..].iter().filter(|&&c| c == CellState::OutOfRange).count(),
            95
        );
    }

    #[test]
    fn test_extend_last_fills_tail() {
        let palette = Palette::standard();
        let agg = StateAggregator::new(&palette, TailPolicy::ExtendLast);
        let snapshot = VolumeSnapshot::new(vec![Free, Busy, Free, Free, Directory]);
        let cells = agg.aggregate(&snapshot, &layout(5, 10, 10));
        assert_eq!(cells[4], CellState::Cluster(Directory));
        assert!(cells[5..].iter().all(|&c| c == CellState::Cluster(Directory)));
    }

    #[test]
    fn test_partial_last_cell_only_sees_real_clusters() {
        let palette = Palette::standard();
        let agg = StateAggregator::new(&palette, TailPolicy::Blank);
        let mut clusters = vec![Busy; 401];
        clusters[400] = Free;
        let snapshot = VolumeSnapshot::new(clusters);
        let geometry = layout(401, 10, 10);
        let cells = agg.aggregate(&snapshot, &geometry);
        assert_eq!(cells[80], CellState::Cluster(Free));
        assert!(cells[81..].iter().all(|&c| c == CellState::OutOfRange));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let palette = Palette::standard();
        let agg = StateAggregator::new(&palette, TailPolicy::Blank);
        let clusters: Vec<ClusterState> = (0..200_000)
            .map(|i| ClusterState::ALL[(i * 7 + i / 13) % ClusterState::COUNT])
            .collect();
        let snapshot = VolumeSnapshot::new(clusters.clone());
        let geometry = layout(clusters.len(), 100, 80);
        let cells = agg.aggregate(&snapshot, &geometry);
        for (i, cell) in cells.iter().enumerate() {
            let range = geometry.cluster_range(i);
            assert_eq!(*cell, agg.reduce(&clusters[range]));
        }
        assert_eq!(cells, agg.aggregate(&snapshot, &geometry));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "exceeds snapshot")]
    fn test_run_past_snapshot_is_a_defect() {
        let palette = Palette::standard();
        let agg = StateAggregator::new(&palette, TailPolicy::Blank);
        agg.reduce_range(&[Free, Busy], 1..3);
    }
}
