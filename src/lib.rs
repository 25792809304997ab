//! Live cluster map for a volume under defragmentation.
//!
//! The renderer core lives in [`map`]: it downsamples a volume's cluster
//! states onto a grid of cells, diffs each frame against the last one drawn
//! and streams the changed cells to a presentation shell from a background
//! refresh pump. [`ui`] and [`graphics`] are the terminal and SDL2 shells,
//! [`simulator`] a demo engine that produces the volume being mapped.

pub mod app;
pub mod constants;
pub mod error;
pub mod graphics;
pub mod map;
pub mod models;
pub mod simulator;
pub mod source;
pub mod surface;
pub mod ui;
