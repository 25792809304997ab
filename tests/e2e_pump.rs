/// End-to-end tests for the refresh pump: the live path from a volume source
/// through layout, aggregation and frame diffing to a shell's surface.
///
/// The real `SharedVolume` source and `GridSurface` are used; only failure
/// injection needs a hand-written source.
use cluster_map::error::{PumpError, SourceError, StopReason};
use cluster_map::map::{
    CellPos, DrawBatch, Palette, PumpEvent, PumpState, RefreshPump, RenderOptions, Scale,
    StateAggregator, SurfaceSize, TailPolicy, BLANK_SWATCH,
};
use cluster_map::models::{ClusterState, VolumeSnapshot};
use cluster_map::source::{SharedVolume, VolumeStateSource};
use cluster_map::surface::{paint, GridSurface};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const INTERVAL: Duration = Duration::from_millis(5);

// ── Helpers ───────────────────────────────────────────────────────────────────

fn volume(clusters: Vec<ClusterState>) -> Arc<SharedVolume> {
    Arc::new(SharedVolume::new("T:", VolumeSnapshot::new(clusters)))
}

fn pump_over(
    source: Arc<dyn VolumeStateSource>,
    surface: SurfaceSize,
) -> (RefreshPump, Receiver<PumpEvent>) {
    RefreshPump::new(
        source,
        Arc::new(Palette::standard()),
        RenderOptions::default(),
        surface,
    )
}

/// Receive until a frame matching `accept` arrives, or fail after 10 seconds.
fn frame_where(rx: &Receiver<PumpEvent>, mut accept: impl FnMut(&DrawBatch) -> bool) -> DrawBatch {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(PumpEvent::Frame(batch)) if accept(&batch) => return batch,
            Ok(PumpEvent::Frame(_)) => {}
            Ok(PumpEvent::Stopped(reason)) => panic!("pump stopped unexpectedly: {reason}"),
            Err(err) => panic!("no matching frame within 10 seconds: {err}"),
        }
    }
}

fn next_frame(rx: &Receiver<PumpEvent>) -> DrawBatch {
    frame_where(rx, |_| true)
}

/// Receive until the pump reports `Stopped`, skipping frames.
fn stop_reason(rx: &Receiver<PumpEvent>) -> StopReason {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(PumpEvent::Stopped(reason)) => return reason,
            Ok(PumpEvent::Frame(_)) => {}
            Err(err) => panic!("pump did not stop within 10 seconds: {err}"),
        }
    }
}

/// Source that fails while `failing` is set.
struct FlakySource {
    inner: SharedVolume,
    failing: AtomicBool,
}

impl VolumeStateSource for FlakySource {
    fn snapshot(&self) -> Result<VolumeSnapshot, SourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::ReadFailure("device not ready".into()));
        }
        self.inner.snapshot()
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// The first frame after `start` redraws every cell; `stop` ends in `Stopped`
/// with the buffers released.
#[test]
fn start_draws_full_frame_and_stop_releases_buffers() {
    let (mut pump, rx) = pump_over(volume(vec![ClusterState::Busy; 200]), SurfaceSize::new(10, 5));
    assert_eq!(pump.state(), PumpState::Idle);
    pump.start(INTERVAL).unwrap();

    let first = next_frame(&rx);
    assert!(first.full);
    assert_eq!(first.cells.len(), 50);
    assert_eq!(first.geometry.scale, Scale::ClustersPerCell(4));
    assert_eq!(first.counts.get(ClusterState::Busy), 200);

    pump.stop();
    assert_eq!(stop_reason(&rx), StopReason::Requested);
    pump.join();
    assert_eq!(pump.state(), PumpState::Stopped);
    assert_eq!(pump.geometry(), None);
    assert_eq!(pump.stop_reason(), Some(StopReason::Requested));
}

#[test]
fn start_while_running_is_rejected() {
    let (mut pump, _rx) = pump_over(volume(vec![ClusterState::Free; 10]), SurfaceSize::new(5, 2));
    pump.start(INTERVAL).unwrap();
    assert!(matches!(
        pump.start(INTERVAL),
        Err(PumpError::AlreadyRunning(PumpState::Running))
    ));
}

/// A stopped pump can be started again and begins with a full redraw.
#[test]
fn restart_after_stop_redraws_everything() {
    let (mut pump, rx) = pump_over(volume(vec![ClusterState::Free; 12]), SurfaceSize::new(4, 3));
    pump.start(INTERVAL).unwrap();
    next_frame(&rx);
    pump.stop();
    stop_reason(&rx);

    pump.start(INTERVAL).unwrap();
    let frame = next_frame(&rx);
    assert!(frame.full);
    assert_eq!(frame.cells.len(), 12);
}

// ── Diff-only redraw ──────────────────────────────────────────────────────────

/// A single changed cluster produces a batch with exactly its cell.
#[test]
fn changed_cluster_redraws_only_its_cell() {
    let source = volume(vec![ClusterState::Free; 100]);
    let (mut pump, rx) = pump_over(source.clone(), SurfaceSize::new(10, 10));
    pump.start(INTERVAL).unwrap();
    next_frame(&rx);

    let mut clusters = vec![ClusterState::Free; 100];
    clusters[37] = ClusterState::Fragmented;
    source.publish(VolumeSnapshot::new(clusters));

    let batch = frame_where(&rx, |b| !b.cells.is_empty());
    assert!(!batch.full);
    assert_eq!(batch.cells.len(), 1);
    assert_eq!(batch.cells[0].pos, CellPos::new(7, 3));
    assert_eq!(batch.counts.get(ClusterState::Fragmented), 1);
}

/// Painting every batch onto a retained surface yields exactly what a fresh
/// aggregation of the latest snapshot would draw.
#[test]
fn painted_surface_matches_aggregation() {
    let n = 1_000_000;
    let surface_size = SurfaceSize::new(80, 25);
    let mut clusters = vec![ClusterState::Busy; n];
    for lcn in (0..n).step_by(7919) {
        clusters[lcn] = ClusterState::Fragmented;
    }
    clusters[..4000].fill(ClusterState::MftZone);
    let source = volume(clusters.clone());
    let (mut pump, rx) = pump_over(source.clone(), surface_size);
    let palette = Palette::standard();
    let mut surface = GridSurface::new(surface_size, BLANK_SWATCH);

    pump.start(INTERVAL).unwrap();
    let first = next_frame(&rx);
    assert_eq!(first.geometry.scale, Scale::ClustersPerCell(500));
    assert_eq!(paint(&mut surface, &palette, &first), Some(2000));

    clusters[..4000].fill(ClusterState::Free);
    source.publish(VolumeSnapshot::new(clusters.clone()));
    let update = frame_where(&rx, |b| !b.cells.is_empty());
    // MFT zone covered cells 0..8; cell 0 has a fragmented cluster at LCN 0.
    assert!(update.cells.len() <= 8);
    paint(&mut surface, &palette, &update).unwrap();

    let expected = StateAggregator::new(&palette, TailPolicy::Blank)
        .aggregate(&VolumeSnapshot::new(clusters), &update.geometry);
    for (i, state) in expected.iter().enumerate() {
        let pos = update.geometry.position(i);
        assert_eq!(surface.get(pos), Some(palette.swatch(*state)), "cell {i}");
    }
}

// ── Resize ────────────────────────────────────────────────────────────────────

#[test]
fn resize_recomputes_geometry_with_full_redraw() {
    let (mut pump, rx) = pump_over(volume(vec![ClusterState::Busy; 48]), SurfaceSize::new(8, 6));
    pump.start(INTERVAL).unwrap();
    next_frame(&rx);

    pump.resize(SurfaceSize::new(4, 3));
    let frame = frame_where(&rx, |b| b.surface == SurfaceSize::new(4, 3));
    assert!(frame.full);
    assert_eq!(frame.cells.len(), 12);
    assert_eq!(frame.geometry.scale, Scale::ClustersPerCell(4));
}

/// A minimised surface defers cycles; restoring it redraws everything.
#[test]
fn zero_area_surface_defers_until_restored() {
    let (mut pump, rx) = pump_over(volume(vec![ClusterState::Busy; 24]), SurfaceSize::new(6, 4));
    pump.start(INTERVAL).unwrap();
    next_frame(&rx);

    pump.resize(SurfaceSize::new(0, 4));
    std::thread::sleep(Duration::from_millis(50));
    while rx.try_recv().is_ok() {}
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(pump.state(), PumpState::Running);

    pump.resize(SurfaceSize::new(6, 4));
    let frame = next_frame(&rx);
    assert!(frame.full);
    assert_eq!(frame.cells.len(), 24);
}

// ── Failure paths ─────────────────────────────────────────────────────────────

/// A source failure stops the pump with the reason; a restart once the
/// source recovers resumes with a full redraw.
#[test]
fn source_failure_stops_and_restart_recovers() {
    let source = Arc::new(FlakySource {
        inner: SharedVolume::new("T:", VolumeSnapshot::new(vec![ClusterState::Free; 16])),
        failing: AtomicBool::new(false),
    });
    let (mut pump, rx) = pump_over(source.clone(), SurfaceSize::new(4, 4));
    pump.start(INTERVAL).unwrap();
    next_frame(&rx);

    source.failing.store(true, Ordering::SeqCst);
    assert_eq!(
        stop_reason(&rx),
        StopReason::SourceUnavailable(SourceError::ReadFailure("device not ready".into()))
    );
    pump.join();
    assert_eq!(pump.state(), PumpState::Stopped);

    source.failing.store(false, Ordering::SeqCst);
    pump.start(INTERVAL).unwrap();
    let frame = next_frame(&rx);
    assert!(frame.full);
    assert_eq!(frame.cells.len(), 16);
}

#[test]
fn closed_volume_reports_unavailable() {
    let source = volume(vec![ClusterState::Busy; 16]);
    let (mut pump, rx) = pump_over(source.clone(), SurfaceSize::new(4, 4));
    pump.start(INTERVAL).unwrap();
    next_frame(&rx);

    source.close();
    assert!(matches!(
        stop_reason(&rx),
        StopReason::SourceUnavailable(SourceError::VolumeUnavailable(_))
    ));
}

/// Dropping the event receiver stops the pump instead of leaving it spinning.
#[test]
fn dropped_receiver_stops_pump() {
    let (mut pump, rx) = pump_over(volume(vec![ClusterState::Busy; 16]), SurfaceSize::new(4, 4));
    pump.start(INTERVAL).unwrap();
    next_frame(&rx);
    drop(rx);

    let deadline = Instant::now() + Duration::from_secs(10);
    while pump.state() != PumpState::Stopped {
        assert!(Instant::now() < deadline, "pump still running after receiver dropped");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(pump.stop_reason(), Some(StopReason::Disconnected));
}
