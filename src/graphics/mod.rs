//! Graphical map shell.
//! Uses SDL2 to paint the cluster map into a resizable window.

use crate::map::{CellPos, SurfaceSize};

#[cfg(feature = "graphical")]
pub mod sdl_backend;

#[cfg(feature = "graphical")]
pub mod map_window;

#[cfg(feature = "graphical")]
pub use sdl_backend::SdlBackend;

#[cfg(feature = "graphical")]
pub use map_window::{run_map_window, CacheSurface};

/// Pixel layout of map cells: square blocks separated by grid lines,
/// with a grid line around the outside as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMetrics {
    pub block_size: u32,
    pub grid_line: u32,
}

impl CellMetrics {
    pub fn new(block_size: u32, grid_line: u32) -> Self {
        Self {
            block_size: block_size.max(1),
            grid_line,
        }
    }

    /// Distance between the top-left corners of neighbouring cells.
    pub fn pitch(&self) -> u32 {
        self.block_size + self.grid_line
    }

    /// How many whole cells fit in a window of `width` x `height` pixels.
    pub fn surface_for(&self, width: u32, height: u32) -> SurfaceSize {
        let fit = |pixels: u32| (pixels.saturating_sub(self.grid_line) / self.pitch()).min(u16::MAX as u32) as u16;
        SurfaceSize::new(fit(width), fit(height))
    }

    /// Top-left pixel of a cell's block.
    pub fn cell_origin(&self, pos: CellPos) -> (i32, i32) {
        let at = |i: u16| (self.grid_line + i as u32 * self.pitch()) as i32;
        (at(pos.x), at(pos.y))
    }
}
