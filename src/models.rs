use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Allocation state of one logical cluster, as reported by the volume engine.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterState {
    Free,       // Unallocated space
    Busy,       // Allocated, contiguous file data
    Fragmented, // Belongs to a fragmented file
    Directory,
    Compressed,
    Unmovable,  // System files the engine cannot relocate
    MftZone,    // Reserved for MFT growth
    Unusable,   // Bad clusters
    Unknown,
}

impl ClusterState {
    /// Number of distinct cluster states.
    pub const COUNT: usize = 9;

    /// Every state, in declaration order (matches `index()`).
    pub const ALL: [ClusterState; Self::COUNT] = [
        ClusterState::Free,
        ClusterState::Busy,
        ClusterState::Fragmented,
        ClusterState::Directory,
        ClusterState::Compressed,
        ClusterState::Unmovable,
        ClusterState::MftZone,
        ClusterState::Unusable,
        ClusterState::Unknown,
    ];

    /// Dense index used for per-state tables.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ClusterState::Free => "free",
            ClusterState::Busy => "busy",
            ClusterState::Fragmented => "fragmented",
            ClusterState::Directory => "directory",
            ClusterState::Compressed => "compressed",
            ClusterState::Unmovable => "unmovable",
            ClusterState::MftZone => "mft-zone",
            ClusterState::Unusable => "unusable",
            ClusterState::Unknown => "unknown",
        }
    }

    /// Whether the cluster holds data (used for fragmentation ratios).
    pub fn is_allocated(self) -> bool {
        matches!(
            self,
            ClusterState::Busy
                | ClusterState::Fragmented
                | ClusterState::Directory
                | ClusterState::Compressed
        )
    }
}

/// What one map cell displays after aggregation.
///
/// `OutOfRange` marks cells past the end of the volume; it renders blank,
/// never as free space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CellState {
    OutOfRange,
    Cluster(ClusterState),
}

impl CellState {
    pub fn cluster(self) -> Option<ClusterState> {
        match self {
            CellState::Cluster(state) => Some(state),
            CellState::OutOfRange => None,
        }
    }
}

impl From<ClusterState> for CellState {
    fn from(state: ClusterState) -> Self {
        CellState::Cluster(state)
    }
}

/// Immutable, consistent read of every cluster on a volume, indexed by LCN.
///
/// Cloning is cheap: the cluster array is shared. A new snapshot always
/// replaces the old one wholesale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeSnapshot {
    clusters: Arc<[ClusterState]>,
}

impl VolumeSnapshot {
    pub fn new(clusters: Vec<ClusterState>) -> Self {
        Self {
            clusters: clusters.into(),
        }
    }

    /// Total cluster count of the volume at scan time.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn as_slice(&self) -> &[ClusterState] {
        &self.clusters
    }

    pub fn get(&self, lcn: usize) -> Option<ClusterState> {
        self.clusters.get(lcn).copied()
    }

    pub fn counts(&self) -> ClusterCounts {
        ClusterCounts::tally(&self.clusters)
    }
}

impl From<Vec<ClusterState>> for VolumeSnapshot {
    fn from(clusters: Vec<ClusterState>) -> Self {
        Self::new(clusters)
    }
}

/// Per-state cluster tallies for one snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClusterCounts {
    counts: [usize; ClusterState::COUNT],
}

impl ClusterCounts {
    pub fn tally(clusters: &[ClusterState]) -> Self {
        let mut counts = [0usize; ClusterState::COUNT];
        for &cluster in clusters {
            counts[cluster.index()] += 1;
        }
        Self { counts }
    }

    pub fn get(&self, state: ClusterState) -> usize {
        self.counts[state.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Fragmented clusters as a percentage of all allocated clusters.
    pub fn fragmentation_percent(&self) -> f32 {
        let allocated: usize = ClusterState::ALL
            .iter()
            .filter(|s| s.is_allocated())
            .map(|&s| self.get(s))
            .sum();
        if allocated == 0 {
            return 0.0;
        }
        self.get(ClusterState::Fragmented) as f32 / allocated as f32 * 100.0
    }
}
