//! Error types for the cluster map renderer.

use crate::map::pump::PumpState;
use crate::models::ClusterState;
use thiserror::Error;

/// Failure reported by a `VolumeStateSource`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The volume handle was lost or closed.
    #[error("volume unavailable: {0}")]
    VolumeUnavailable(String),
    /// The cluster map could not be read this time.
    #[error("cannot read cluster map: {0}")]
    ReadFailure(String),
}

/// Why a refresh pump reached `Stopped`. Delivered to the shell for its status line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StopReason {
    #[error("stopped")]
    Requested,
    #[error("{0}")]
    SourceUnavailable(SourceError),
    #[error("display disconnected")]
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame buffer has no geometry")]
    Unallocated,
    #[error("frame has {actual} cells, geometry expects {expected}")]
    GeometryMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("cannot read legend file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid legend file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("legend has no entry for {}", .0.name())]
    MissingState(ClusterState),
    #[error("legend lists {} more than once", .0.name())]
    DuplicateState(ClusterState),
    #[error("legend priority {0} is used by more than one state")]
    DuplicatePriority(u8),
}

#[derive(Debug, Error)]
pub enum PumpError {
    #[error("pump cannot start while {0:?}")]
    AlreadyRunning(PumpState),
    #[error("refresh interval must be greater than zero")]
    InvalidInterval,
    #[error("failed to spawn refresh thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failure while bringing up a map session (volume engine plus refresh pump).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start volume engine: {0}")]
    Engine(#[source] std::io::Error),
    #[error(transparent)]
    Pump(#[from] PumpError),
    #[error(transparent)]
    Palette(#[from] PaletteError),
}
