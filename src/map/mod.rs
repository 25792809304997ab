//! Cluster map renderer: layout, legend, aggregation, frame diffing and the
//! live refresh loop that ties them together.
//!
//! Data flows `VolumeStateSource -> StateAggregator -> FrameBuffer -> DrawBatch`,
//! driven by the `RefreshPump` on its own thread. Shells apply batches to
//! their `Surface` on their own rendering thread.

pub mod aggregate;
pub mod frame;
pub mod layout;
pub mod palette;
pub mod pump;

pub use aggregate::{StateAggregator, TailPolicy};
pub use frame::{Cell, DirtyCell, FrameBuffer};
pub use layout::{CellPos, GridGeometry, GridLayoutEngine, Layout, Scale, ScaleMode, SurfaceSize};
pub use palette::{LegendEntry, Palette, Rgb, Swatch, BLANK_SWATCH};
pub use pump::{CycleOutcome, DrawBatch, PumpEvent, PumpState, RefreshPump};

/// Renderer settings chosen at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub scale_mode: ScaleMode,
    pub tail: TailPolicy,
    /// Surface position of the map's first cell.
    pub origin: CellPos,
}
