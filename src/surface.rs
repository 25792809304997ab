//! Minimal drawing capability a presentation shell provides to the renderer.
//!
//! Terminal grids and graphical canvases both implement `Surface`; the
//! renderer never touches a concrete toolkit.

use crate::map::layout::{CellPos, SurfaceSize};
use crate::map::palette::{Palette, Swatch};
use crate::map::pump::DrawBatch;

pub trait Surface {
    /// Addressable cells, columns by rows.
    fn surface_size(&self) -> SurfaceSize;

    /// Draw one cell. Positions outside the surface are ignored.
    fn draw_cell(&mut self, pos: CellPos, swatch: Swatch);
}

/// Draw every dirty cell of a batch. Returns the number of cells drawn,
/// or `None` when the batch was laid out for a different surface size.
pub fn paint<S: Surface + ?Sized>(surface: &mut S, palette: &Palette, batch: &DrawBatch) -> Option<usize> {
    if batch.surface != surface.surface_size() {
        return None;
    }
    for cell in &batch.cells {
        surface.draw_cell(cell.pos, palette.swatch(cell.state));
    }
    Some(batch.cells.len())
}

/// In-memory surface: a plain grid of swatches. Used by tests and as a
/// retained back buffer by shells that repaint whole frames.
#[derive(Clone, Debug)]
pub struct GridSurface {
    size: SurfaceSize,
    cells: Vec<Swatch>,
    draws: usize,
}

impl GridSurface {
    pub fn new(size: SurfaceSize, fill: Swatch) -> Self {
        Self {
            size,
            cells: vec![fill; size.area()],
            draws: 0,
        }
    }

    /// Resize and clear to `fill`.
    pub fn resize(&mut self, size: SurfaceSize, fill: Swatch) {
        self.size = size;
        self.cells = vec![fill; size.area()];
    }

    pub fn get(&self, pos: CellPos) -> Option<Swatch> {
        self.index(pos).map(|i| self.cells[i])
    }

    /// Total `draw_cell` calls that landed on the surface.
    pub fn draw_count(&self) -> usize {
        self.draws
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Swatch]> {
        self.cells.chunks(self.size.cols.max(1) as usize)
    }

    fn index(&self, pos: CellPos) -> Option<usize> {
        if pos.x < self.size.cols && pos.y < self.size.rows {
            Some(pos.y as usize * self.size.cols as usize + pos.x as usize)
        } else {
            None
        }
    }
}

impl Surface for GridSurface {
    fn surface_size(&self) -> SurfaceSize {
        self.size
    }

    fn draw_cell(&mut self, pos: CellPos, swatch: Swatch) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = swatch;
            self.draws += 1;
        }
    }
}
