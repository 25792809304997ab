//! Where cluster states come from.
//!
//! The renderer only consumes snapshots; producing them is the volume
//! engine's job. `SharedVolume` is the hand-off point: the engine publishes
//! whole snapshots into it and the refresh pump reads the latest one.

pub use crate::error::SourceError;
use crate::models::VolumeSnapshot;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Supplies the current cluster-state array of the active volume.
///
/// Treated as a blocking call by the refresh pump, which never holds its
/// frame lock while waiting on it.
pub trait VolumeStateSource: Send + Sync {
    fn snapshot(&self) -> Result<VolumeSnapshot, SourceError>;
}

/// Latest published snapshot of a volume, or `None` once the volume is closed.
#[derive(Debug)]
pub struct SharedVolume {
    label: String,
    latest: RwLock<Option<VolumeSnapshot>>,
    generation: AtomicU64,
}

impl SharedVolume {
    pub fn new(label: impl Into<String>, snapshot: VolumeSnapshot) -> Self {
        Self {
            label: label.into(),
            latest: RwLock::new(Some(snapshot)),
            generation: AtomicU64::new(1),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replace the current snapshot. Readers see either the old or the new one, never a mix.
    /// Returns `false` (and drops the snapshot) once the volume is closed.
    pub fn publish(&self, snapshot: VolumeSnapshot) -> bool {
        let mut latest = self.latest.write();
        if latest.is_none() {
            return false;
        }
        *latest = Some(snapshot);
        self.generation.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Invalidate the volume handle for good. Subsequent reads fail with `VolumeUnavailable`.
    pub fn close(&self) {
        *self.latest.write() = None;
    }

    pub fn is_open(&self) -> bool {
        self.latest.read().is_some()
    }

    /// Number of snapshots published so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}

impl VolumeStateSource for SharedVolume {
    fn snapshot(&self) -> Result<VolumeSnapshot, SourceError> {
        self.latest
            .read()
            .clone()
            .ok_or_else(|| SourceError::VolumeUnavailable(format!("{} is closed", self.label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClusterState;

    #[test]
    fn test_publish_replaces_snapshot() {
        let volume = SharedVolume::new("C:", VolumeSnapshot::new(vec![ClusterState::Free; 8]));
        assert_eq!(volume.snapshot().unwrap().len(), 8);
        volume.publish(VolumeSnapshot::new(vec![ClusterState::Busy; 16]));
        let snapshot = volume.snapshot().unwrap();
        assert_eq!(snapshot.len(), 16);
        assert_eq!(snapshot.get(0), Some(ClusterState::Busy));
        assert_eq!(volume.generation(), 2);
    }

    #[test]
    fn test_closed_volume_is_unavailable() {
        let volume = SharedVolume::new("D:", VolumeSnapshot::new(vec![ClusterState::Free; 8]));
        volume.close();
        assert!(!volume.is_open());
        assert!(!volume.publish(VolumeSnapshot::new(vec![ClusterState::Busy; 8])));
        assert_eq!(
            volume.snapshot(),
            Err(SourceError::VolumeUnavailable("D: is closed".into()))
        );
    }
}
