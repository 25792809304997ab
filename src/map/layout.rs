//! Grid layout: decides how many clusters each map cell stands for.
//!
//! The map is a linear, row-major layout matching the engine's scan order:
//! cluster `lcn` lands in cell `lcn / clusters_per_cell`, which sits at
//! `row = cell / cols`, `col = cell % cols`. The grid always fills the usable
//! surface; only the scale changes with volume size.

use std::ops::Range;
use tracing::debug;

/// Addressable size of a drawing surface, in cells.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct SurfaceSize {
    pub cols: u16,
    pub rows: u16,
}

impl SurfaceSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    pub fn area(&self) -> usize {
        self.cols as usize * self.rows as usize
    }
}

/// Absolute position of a cell on the surface.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct CellPos {
    pub x: u16,
    pub y: u16,
}

impl CellPos {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// Ratio between clusters and cells.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Scale {
    /// Each cell aggregates this many clusters (always >= 1).
    ClustersPerCell(usize),
    /// Each cluster is repeated over this many cells (always >= 2).
    CellsPerCluster(usize),
}

/// How small volumes are laid out on large surfaces.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ScaleMode {
    /// One cluster per cell at most; spare cells are out of range.
    #[default]
    Compress,
    /// Repeat each cluster over several cells to fill the surface.
    Stretch,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct GridGeometry {
    pub rows: u16,
    pub cols: u16,
    pub scale: Scale,
    /// Surface position of cell (0, 0).
    pub origin: CellPos,
    /// Cluster count the geometry was computed for.
    pub clusters: usize,
}

impl GridGeometry {
    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Clusters represented by one cell; below 1.0 in stretch mode.
    pub fn clusters_per_cell(&self) -> f64 {
        match self.scale {
            Scale::ClustersPerCell(n) => n as f64,
            Scale::CellsPerCluster(k) => 1.0 / k as f64,
        }
    }

    /// `rows * cols * clusters_per_cell >= n`, in integer arithmetic.
    pub fn covers(&self, n: usize) -> bool {
        match self.scale {
            Scale::ClustersPerCell(per) => self.cell_count().saturating_mul(per) >= n,
            Scale::CellsPerCluster(k) => self.cell_count() >= n.saturating_mul(k),
        }
    }

    /// Number of leading cells that map to at least one real cluster.
    pub fn used_cells(&self) -> usize {
        let used = match self.scale {
            Scale::ClustersPerCell(per) => self.clusters.div_ceil(per),
            Scale::CellsPerCluster(k) => self.clusters.saturating_mul(k),
        };
        used.min(self.cell_count())
    }

    /// Clusters reduced into `cell`, clamped to the volume. Empty past the end.
    pub fn cluster_range(&self, cell: usize) -> Range<usize> {
        let n = self.clusters;
        match self.scale {
            Scale::ClustersPerCell(per) => {
                let start = cell.saturating_mul(per).min(n);
                let end = start.saturating_add(per).min(n);
                start..end
            }
            Scale::CellsPerCluster(k) => {
                let lcn = cell / k;
                if lcn < n {
                    lcn..lcn + 1
                } else {
                    n..n
                }
            }
        }
    }

    /// First cell that displays `lcn`, if the cluster exists.
    pub fn cell_of_lcn(&self, lcn: usize) -> Option<usize> {
        if lcn >= self.clusters {
            return None;
        }
        let cell = match self.scale {
            Scale::ClustersPerCell(per) => lcn / per,
            Scale::CellsPerCluster(k) => lcn * k,
        };
        Some(cell)
    }

    /// Surface position of a cell index.
    pub fn position(&self, cell: usize) -> CellPos {
        let cols = self.cols.max(1) as usize;
        CellPos {
            x: self.origin.x + (cell % cols) as u16,
            y: self.origin.y + (cell / cols) as u16,
        }
    }

    pub fn fits(&self, surface: SurfaceSize) -> bool {
        self.origin.x as usize + self.cols as usize <= surface.cols as usize
            && self.origin.y as usize + self.rows as usize <= surface.rows as usize
    }
}

/// Result of asking the engine for a layout.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Layout {
    /// Same inputs as last time; keep the current geometry.
    Unchanged(GridGeometry),
    /// A new geometry; buffers must be reallocated.
    Changed(GridGeometry),
    /// Surface has no usable area (minimised or hidden). Skip this cycle.
    Deferred,
}

/// Computes and caches the grid geometry for a cluster count and surface.
#[derive(Clone, Debug, Default)]
pub struct GridLayoutEngine {
    mode: ScaleMode,
    origin: CellPos,
    current: Option<(SurfaceSize, GridGeometry)>,
}

impl GridLayoutEngine {
    pub fn new(mode: ScaleMode, origin: CellPos) -> Self {
        Self {
            mode,
            origin,
            current: None,
        }
    }

    pub fn geometry(&self) -> Option<&GridGeometry> {
        self.current.as_ref().map(|(_, g)| g)
    }

    /// Forget the cached geometry so the next `update` reports `Changed`.
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    /// Recompute only when the surface size or cluster count changed.
    pub fn update(&mut self, clusters: usize, surface: SurfaceSize) -> Layout {
        if let Some((size, geometry)) = &self.current {
            if *size == surface && geometry.clusters == clusters {
                return Layout::Unchanged(*geometry);
            }
        }
        match self.compute(clusters, surface) {
            Some(geometry) => {
                debug!(
                    clusters,
                    rows = geometry.rows,
                    cols = geometry.cols,
                    scale = ?geometry.scale,
                    "grid geometry recomputed"
                );
                self.current = Some((surface, geometry));
                Layout::Changed(geometry)
            }
            None => {
                self.current = None;
                Layout::Deferred
            }
        }
    }

    /// Pure layout computation. `None` when the surface has no usable cells.
    pub fn compute(&self, clusters: usize, surface: SurfaceSize) -> Option<GridGeometry> {
        let cols = surface.cols.saturating_sub(self.origin.x);
        let rows = surface.rows.saturating_sub(self.origin.y);
        if cols == 0 || rows == 0 {
            return None;
        }
        let cells = cols as usize * rows as usize;

        let scale = if clusters <= cells {
            let k = if clusters == 0 { 1 } else { cells / clusters };
            if self.mode == ScaleMode::Stretch && k >= 2 {
                Scale::CellsPerCluster(k)
            } else {
                Scale::ClustersPerCell(1)
            }
        } else {
            Scale::ClustersPerCell(clusters.div_ceil(cells))
        };

        Some(GridGeometry {
            rows,
            cols,
            scale,
            origin: self.origin,
            clusters,
        })
    }
}
