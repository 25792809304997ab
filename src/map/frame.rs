//! Double-buffered cell grid with diff-only redraw.
//!
//! `commit` writes a freshly aggregated grid into the current frame and
//! reports the cells that differ from the last presented frame. Once the
//! caller has handed those cells to the surface it calls `present`, which
//! makes the current frame the new baseline.

use super::layout::{CellPos, GridGeometry};
use crate::error::FrameError;
use crate::models::CellState;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Cell {
    pub state: CellState,
    pub dirty: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            state: CellState::OutOfRange,
            dirty: true,
        }
    }
}

/// A cell that must be redrawn, at its absolute surface position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DirtyCell {
    pub pos: CellPos,
    pub state: CellState,
}

#[derive(Debug, Default)]
pub struct FrameBuffer {
    geometry: Option<GridGeometry>,
    current: Vec<Cell>,
    previous: Vec<CellState>,
    /// False until the first frame after (re)allocation is presented.
    has_previous: bool,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(&self) -> Option<&GridGeometry> {
        self.geometry.as_ref()
    }

    pub fn is_allocated(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.current
    }

    /// Discard both frames and size them for `geometry`. The next commit is a full redraw.
    pub fn reallocate(&mut self, geometry: GridGeometry) {
        let count = geometry.cell_count();
        self.current = vec![Cell::default(); count];
        self.previous = vec![CellState::OutOfRange; count];
        self.has_previous = false;
        self.geometry = Some(geometry);
    }

    /// Drop all buffers; the frame buffer must be reallocated before the next commit.
    pub fn release(&mut self) {
        self.geometry = None;
        self.current = Vec::new();
        self.previous = Vec::new();
        self.has_previous = false;
    }

    /// Write `states` into the current frame and return the dirty set.
    pub fn commit(&mut self, states: &[CellState]) -> Result<Vec<DirtyCell>, FrameError> {
        let geometry = self.geometry.ok_or(FrameError::Unallocated)?;
        if states.len() != self.current.len() {
            return Err(FrameError::GeometryMismatch {
                expected: self.current.len(),
                actual: states.len(),
            });
        }

        let mut dirty = Vec::new();
        for (i, ((cell, &state), &old)) in self
            .current
            .iter_mut()
            .zip(states)
            .zip(&self.previous)
            .enumerate()
        {
            cell.state = state;
            cell.dirty = !self.has_previous || state != old;
            if cell.dirty {
                dirty.push(DirtyCell {
                    pos: geometry.position(i),
                    state,
                });
            }
        }
        Ok(dirty)
    }

    /// The dirty cells were drawn: the current frame becomes the baseline.
    pub fn present(&mut self) {
        for (cell, prev) in self.current.iter_mut().zip(self.previous.iter_mut()) {
            *prev = cell.state;
            cell.dirty = false;
        }
        if self.geometry.is_some() {
            self.has_previous = true;
        }
    }

    /// The next commit reports every cell.
    pub fn needs_full_redraw(&self) -> bool {
        self.geometry.is_some() && !self.has_previous
    }

    pub fn dirty_count(&self) -> usize {
        self.current.iter().filter(|c| c.dirty).count()
    }
}
