//! Demo volume engine.
//!
//! Generates a fragmented volume for one of the configured drives and
//! defragments it step by step on a background thread, publishing a full
//! snapshot into a `SharedVolume` after every step. The map renderer
//! never talks to the engine directly; it only reads the shared volume.

use crate::constants::{animation, disk::DriveConfig, ui as ui_const};
use crate::models::{ClusterState, VolumeSnapshot};
use crate::source::SharedVolume;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefragPhase {
    /// Scanning the volume; unscanned clusters read as `Unknown`.
    Analyzing,
    Defragmenting,
    Finished,
}

impl DefragPhase {
    pub fn label(&self) -> &'static str {
        match self {
            DefragPhase::Analyzing => "Analyzing disk...",
            DefragPhase::Defragmenting => "Defragmenting...",
            DefragPhase::Finished => "Complete",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DefragStats {
    pub total_to_defrag: usize,
    pub clusters_defragged: usize,
    pub start_time: Instant,
}

/// Engine progress as seen from the shell.
#[derive(Debug, Clone, Copy)]
pub struct EngineStatus {
    pub phase: DefragPhase,
    pub stats: DefragStats,
    pub paused: bool,
}

impl EngineStatus {
    pub fn progress_percent(&self) -> f32 {
        if self.stats.total_to_defrag == 0 {
            return 100.0;
        }
        (self.stats.clusters_defragged as f32 / self.stats.total_to_defrag as f32) * 100.0
    }

    pub fn estimated_time_remaining(&self) -> Option<Duration> {
        if self.stats.clusters_defragged == 0 || self.phase != DefragPhase::Defragmenting {
            return None;
        }

        let remaining = self
            .stats
            .total_to_defrag
            .saturating_sub(self.stats.clusters_defragged);
        if remaining == 0 {
            return Some(Duration::ZERO);
        }

        let elapsed = self.stats.start_time.elapsed();
        let rate = self.stats.clusters_defragged as f64 / elapsed.as_secs_f64();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}

/// Lay out a fresh volume: unmovable system area at LCN 0, the MFT zone
/// right after it, then shuffled data, bad and free clusters.
pub fn generate_volume(total: usize, fill_percent: f32, rng: &mut StdRng) -> Vec<ClusterState> {
    let fill = fill_percent.clamp(0.0, 0.95);
    let mut clusters = vec![ClusterState::Free; total];
    if total == 0 {
        return clusters;
    }

    let system = ((total as f32 * ui_const::SYSTEM_AREA_PERCENT) as usize).clamp(1, total);
    let mft_end = (system + (total as f32 * ui_const::MFT_ZONE_PERCENT) as usize).min(total);
    clusters[..system].fill(ClusterState::Unmovable);
    clusters[system..mft_end].fill(ClusterState::MftZone);

    let data_len = total - mft_end;
    let num_data = (data_len as f32 * fill) as usize;
    let num_fragmented = (num_data as f32 * ui_const::FRAGMENTED_PERCENT) as usize;
    let num_directories = num_data / 20;
    let num_compressed = num_data / 15;
    let num_busy = num_data.saturating_sub(num_fragmented + num_directories + num_compressed);
    let num_bad = (total as f32 * ui_const::BAD_BLOCK_PERCENT) as usize;

    let mut body: Vec<ClusterState> = Vec::with_capacity(data_len);
    body.extend(std::iter::repeat(ClusterState::Fragmented).take(num_fragmented));
    body.extend(std::iter::repeat(ClusterState::Directory).take(num_directories));
    body.extend(std::iter::repeat(ClusterState::Compressed).take(num_compressed));
    body.extend(std::iter::repeat(ClusterState::Busy).take(num_busy));
    body.extend(std::iter::repeat(ClusterState::Unusable).take(num_bad));
    body.truncate(data_len);
    body.resize(data_len, ClusterState::Free);
    body.shuffle(rng);

    clusters[mft_end..].copy_from_slice(&body);
    clusters
}

/// Simulated defragmentation engine for one volume.
pub struct DefragSimulator {
    clusters: Vec<ClusterState>,
    phase: DefragPhase,
    ticks: u64,
    stats: DefragStats,
    moves_per_step: usize,
    /// Lowest LCN that may still be free.
    free_cursor: usize,
    /// Fragmented clusters are taken from the end of the volume downwards.
    fragment_cursor: usize,
}

impl DefragSimulator {
    pub fn new(drive: DriveConfig, fill_percent: f32, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let clusters = generate_volume(drive.cluster_count as usize, fill_percent, &mut rng);
        Self::from_clusters(clusters, drive.iops as usize)
    }

    /// Engine over an existing cluster layout.
    pub fn from_clusters(clusters: Vec<ClusterState>, moves_per_step: usize) -> Self {
        let total_to_defrag = clusters
            .iter()
            .filter(|&&c| c == ClusterState::Fragmented)
            .count();
        let fragment_cursor = clusters.len();
        Self {
            clusters,
            phase: DefragPhase::Analyzing,
            ticks: 0,
            stats: DefragStats {
                total_to_defrag,
                clusters_defragged: 0,
                start_time: Instant::now(),
            },
            moves_per_step: moves_per_step.max(1),
            free_cursor: 0,
            fragment_cursor,
        }
    }

    pub fn clusters(&self) -> &[ClusterState] {
        &self.clusters
    }

    pub fn phase(&self) -> DefragPhase {
        self.phase
    }

    pub fn stats(&self) -> DefragStats {
        self.stats
    }

    pub fn status(&self, paused: bool) -> EngineStatus {
        EngineStatus {
            phase: self.phase,
            stats: self.stats,
            paused,
        }
    }

    /// Clusters the analysis has reached so far.
    fn scanned(&self) -> usize {
        match self.phase {
            DefragPhase::Analyzing => {
                let ticks = self.ticks.min(animation::ANALYZE_DURATION_TICKS);
                (self.clusters.len() as u64 * ticks / animation::ANALYZE_DURATION_TICKS) as usize
            }
            _ => self.clusters.len(),
        }
    }

    /// What the engine currently reports for the volume.
    pub fn snapshot(&self) -> VolumeSnapshot {
        let scanned = self.scanned();
        if scanned == self.clusters.len() {
            return VolumeSnapshot::new(self.clusters.clone());
        }
        let mut clusters = self.clusters[..scanned].to_vec();
        clusters.resize(self.clusters.len(), ClusterState::Unknown);
        VolumeSnapshot::new(clusters)
    }

    /// Advance one tick. Returns whether the reported volume changed.
    pub fn step(&mut self) -> bool {
        self.ticks += 1;
        match self.phase {
            DefragPhase::Analyzing => {
                if self.ticks >= animation::ANALYZE_DURATION_TICKS {
                    self.phase = DefragPhase::Defragmenting;
                    self.ticks = 0;
                    self.stats.start_time = Instant::now();
                    info!(
                        clusters = self.clusters.len(),
                        fragmented = self.stats.total_to_defrag,
                        "analysis complete"
                    );
                }
                true
            }
            DefragPhase::Defragmenting => {
                let mut moved = 0;
                while moved < self.moves_per_step && self.move_one() {
                    moved += 1;
                }
                if moved < self.moves_per_step {
                    self.phase = DefragPhase::Finished;
                    info!(moved = self.stats.clusters_defragged, "defragmentation complete");
                }
                moved > 0
            }
            DefragPhase::Finished => false,
        }
    }

    /// Move the highest fragmented cluster to the lowest free LCN below it,
    /// or mark it contiguous in place when nothing below is free.
    fn move_one(&mut self) -> bool {
        let Some(src) = self.next_fragmented() else {
            return false;
        };
        match self.lowest_free(src) {
            Some(dst) => {
                self.clusters[dst] = ClusterState::Busy;
                self.clusters[src] = ClusterState::Free;
            }
            None => self.clusters[src] = ClusterState::Busy,
        }
        self.stats.clusters_defragged += 1;
        true
    }

    fn next_fragmented(&mut self) -> Option<usize> {
        while self.fragment_cursor > 0 {
            self.fragment_cursor -= 1;
            if self.clusters[self.fragment_cursor] == ClusterState::Fragmented {
                return Some(self.fragment_cursor);
            }
        }
        None
    }

    fn lowest_free(&mut self, limit: usize) -> Option<usize> {
        let found = self.clusters[self.free_cursor.min(limit)..limit]
            .iter()
            .position(|&c| c == ClusterState::Free)
            .map(|offset| self.free_cursor + offset);
        if let Some(dst) = found {
            self.free_cursor = dst + 1;
        }
        found
    }

    /// Run the engine on its own thread, publishing into `volume` after every change.
    pub fn spawn(self, volume: Arc<SharedVolume>, tick: Duration) -> io::Result<EngineHandle> {
        let control = Arc::new(EngineControl {
            paused: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            status: Mutex::new(self.status(false)),
        });
        volume.publish(self.snapshot());

        let thread_control = Arc::clone(&control);
        let thread = thread::Builder::new()
            .name("cmap-engine".into())
            .spawn(move || run_engine(self, volume, tick, thread_control))?;

        Ok(EngineHandle {
            control,
            thread: Some(thread),
        })
    }
}

struct EngineControl {
    paused: AtomicBool,
    cancel: AtomicBool,
    status: Mutex<EngineStatus>,
}

fn run_engine(
    mut engine: DefragSimulator,
    volume: Arc<SharedVolume>,
    tick: Duration,
    control: Arc<EngineControl>,
) {
    info!(volume = volume.label(), clusters = engine.clusters.len(), "engine started");
    while !control.cancel.load(Ordering::Relaxed) {
        let paused = control.paused.load(Ordering::Relaxed);
        if !paused {
            if engine.step() && !volume.publish(engine.snapshot()) {
                info!(volume = volume.label(), "volume closed, engine stopping");
                break;
            }
            if engine.phase() == DefragPhase::Finished {
                *control.status.lock() = engine.status(false);
                break;
            }
        }
        *control.status.lock() = engine.status(paused);
        thread::sleep(tick);
    }
    debug!("engine thread exiting");
}

/// Handle to a running engine thread. Dropping it cancels the engine.
pub struct EngineHandle {
    control: Arc<EngineControl>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EngineHandle {
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.control.paused.load(Ordering::Relaxed);
        self.control.paused.store(paused, Ordering::Relaxed);
        paused
    }

    pub fn is_paused(&self) -> bool {
        self.control.paused.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> EngineStatus {
        *self.control.status.lock()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn cancel(&self) {
        self.control.cancel.store(true, Ordering::Relaxed);
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.cancel();
        self.join();
    }
}
