//! Refresh pump: the live loop that keeps the map in step with the volume.
//!
//! Each cycle pulls a snapshot, recomputes the grid if the surface or the
//! cluster count changed, aggregates every cell, diffs against the frame
//! buffer and hands the dirty cells to the shell as a `DrawBatch` over a
//! bounded crossbeam channel. The shell draws them on its own thread.
//!
//! # Concurrency
//!
//! - At most one cycle runs at a time. A tick (or a manual `run_cycle`)
//!   that arrives while a cycle is in flight is dropped, never queued.
//! - The source read happens without the renderer lock held, so `resize`
//!   never waits on a slow volume.
//! - A cycle finishes with the geometry it started with; the next cycle
//!   picks up a resize.
//! - `stop` is cooperative: the in-flight cycle completes (a timer cycle
//!   or one from `run_cycle`), then the pump releases its buffers and
//!   reports `PumpEvent::Stopped`.

use super::aggregate::StateAggregator;
use super::frame::{DirtyCell, FrameBuffer};
use super::layout::{GridGeometry, GridLayoutEngine, Layout, SurfaceSize};
use super::palette::Palette;
use super::RenderOptions;
use crate::constants::refresh;
use crate::error::{PumpError, SourceError, StopReason};
use crate::models::ClusterCounts;
use crate::source::VolumeStateSource;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PumpState {
    Idle,
    Running,
    Cancelling,
    Stopped,
}

/// Cells to redraw after one refresh cycle.
#[derive(Clone, Debug)]
pub struct DrawBatch {
    /// Sequence number of the cycle that produced the batch.
    pub cycle: u64,
    /// Surface size the batch was laid out for.
    pub surface: SurfaceSize,
    pub geometry: GridGeometry,
    /// Every cell of the grid is included (first frame after a geometry change).
    pub full: bool,
    pub cells: Vec<DirtyCell>,
    pub counts: ClusterCounts,
}

/// Messages from the pump to the presentation shell.
#[derive(Clone, Debug)]
pub enum PumpEvent {
    Frame(DrawBatch),
    Stopped(StopReason),
}

/// What a single refresh cycle did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Drawn { dirty: usize, full: bool },
    /// The surface has no usable area; retried next cycle.
    Deferred,
    /// Another cycle was in flight; this one was dropped.
    Busy,
    /// The pump is not running, or stopped while the cycle was in flight.
    NotRunning,
    /// The shell has not drained earlier frames; changes carry over to the next cycle.
    Backpressure,
    Failed(SourceError),
    /// The shell dropped its event receiver.
    Disconnected,
}

struct Renderer {
    layout: GridLayoutEngine,
    frame: FrameBuffer,
}

struct Shared {
    source: Arc<dyn VolumeStateSource>,
    palette: Arc<Palette>,
    options: RenderOptions,
    state: Mutex<PumpState>,
    busy: AtomicBool,
    idle_lock: Mutex<()>,
    idle: Condvar,
    surface: Mutex<SurfaceSize>,
    geometry_stale: AtomicBool,
    renderer: Mutex<Renderer>,
    events: Sender<PumpEvent>,
    cycles: AtomicU64,
    last_stop: Mutex<Option<StopReason>>,
}

/// Clears the busy flag when a cycle ends, whichever way it ends, and
/// wakes a pump waiting to stop.
struct CycleGuard<'a>(&'a Shared);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::Release);
        let _idle = self.0.idle_lock.lock();
        self.0.idle.notify_all();
    }
}

impl Shared {
    fn state(&self) -> PumpState {
        *self.state.lock()
    }

    /// The pump holds buffers only while `Running` or `Cancelling`.
    fn is_live(&self) -> bool {
        matches!(self.state(), PumpState::Running | PumpState::Cancelling)
    }

    fn cycle(&self) -> CycleOutcome {
        if self.state() != PumpState::Running {
            return CycleOutcome::NotRunning;
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("refresh tick dropped, cycle already in flight");
            return CycleOutcome::Busy;
        }
        let _guard = CycleGuard(self);
        // `finish` may have begun between the check above and claiming the flag.
        if self.state() != PumpState::Running {
            return CycleOutcome::NotRunning;
        }
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;

        let surface = *self.surface.lock();
        let stale = self.geometry_stale.swap(false, Ordering::AcqRel);

        let snapshot = match self.source.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(cycle, %err, "volume source failed");
                return CycleOutcome::Failed(err);
            }
        };
        let counts = snapshot.counts();

        let geometry = {
            let mut renderer = self.renderer.lock();
            if !self.is_live() {
                return CycleOutcome::NotRunning;
            }
            if stale {
                renderer.layout.invalidate();
            }
            match renderer.layout.update(snapshot.len(), surface) {
                Layout::Deferred => {
                    trace!(cycle, ?surface, "surface too small, cycle skipped");
                    return CycleOutcome::Deferred;
                }
                Layout::Changed(geometry) => {
                    renderer.frame.reallocate(geometry);
                    geometry
                }
                Layout::Unchanged(geometry) => {
                    if !renderer.frame.is_allocated() {
                        renderer.frame.reallocate(geometry);
                    }
                    geometry
                }
            }
        };

        let cells = StateAggregator::new(&self.palette, self.options.tail).aggregate(&snapshot, &geometry);

        let mut renderer = self.renderer.lock();
        if !self.is_live() || renderer.frame.geometry() != Some(&geometry) {
            return CycleOutcome::NotRunning;
        }
        let full = renderer.frame.needs_full_redraw();
        let dirty = match renderer.frame.commit(&cells) {
            Ok(dirty) => dirty,
            Err(err) => {
                debug!(cycle, %err, "frame commit rejected");
                return CycleOutcome::NotRunning;
            }
        };

        let count = dirty.len();
        debug_assert_eq!(count, renderer.frame.dirty_count());
        let batch = DrawBatch {
            cycle,
            surface,
            geometry,
            full,
            cells: dirty,
            counts,
        };
        match self.events.try_send(PumpEvent::Frame(batch)) {
            Ok(()) => {
                renderer.frame.present();
                trace!(cycle, dirty = count, full, "frame delivered");
                CycleOutcome::Drawn { dirty: count, full }
            }
            Err(TrySendError::Full(_)) => {
                debug!(cycle, "display is behind, frame held back");
                CycleOutcome::Backpressure
            }
            Err(TrySendError::Disconnected(_)) => CycleOutcome::Disconnected,
        }
    }

    /// Block until no cycle is in flight.
    fn wait_idle(&self) {
        let mut idle = self.idle_lock.lock();
        while self.busy.load(Ordering::Acquire) {
            self.idle.wait(&mut idle);
        }
    }

    fn finish(&self, reason: StopReason) {
        {
            let mut state = self.state.lock();
            if *state == PumpState::Running {
                *state = PumpState::Cancelling;
            }
        }
        self.wait_idle();
        {
            let mut renderer = self.renderer.lock();
            renderer.frame.release();
            renderer.layout.invalidate();
            *self.last_stop.lock() = Some(reason.clone());
            *self.state.lock() = PumpState::Stopped;
        }
        info!(%reason, cycles = self.cycles.load(Ordering::Relaxed), "refresh pump stopped");
        let timeout = Duration::from_millis(refresh::STOP_NOTIFY_TIMEOUT_MS);
        if self.events.send_timeout(PumpEvent::Stopped(reason), timeout).is_err() {
            debug!("stop notification not delivered");
        }
    }
}

fn run(shared: Arc<Shared>, interval: Duration, stop_rx: Receiver<()>) {
    let ticker = crossbeam_channel::tick(interval);
    let reason = loop {
        match shared.cycle() {
            CycleOutcome::Failed(err) => break StopReason::SourceUnavailable(err),
            CycleOutcome::Disconnected => break StopReason::Disconnected,
            _ => {}
        }
        if shared.state() != PumpState::Running {
            break StopReason::Requested;
        }
        let stop = select! {
            recv(ticker) -> _ => false,
            recv(stop_rx) -> _ => true,
        };
        if stop {
            break StopReason::Requested;
        }
    };
    shared.finish(reason);
}

/// Periodic, cancellable refresh of a cluster map.
///
/// Created `Idle`; `start` spawns the refresh thread. Shells feed it surface
/// sizes through `resize` and consume `PumpEvent`s from the receiver handed
/// out by `new`. Dropping the pump stops it and waits for the thread.
pub struct RefreshPump {
    shared: Arc<Shared>,
    stop_tx: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RefreshPump {
    pub fn new(
        source: Arc<dyn VolumeStateSource>,
        palette: Arc<Palette>,
        options: RenderOptions,
        surface: SurfaceSize,
    ) -> (Self, Receiver<PumpEvent>) {
        let (events_tx, events_rx) = bounded(refresh::EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            source,
            palette,
            options,
            state: Mutex::new(PumpState::Idle),
            busy: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
            surface: Mutex::new(surface),
            geometry_stale: AtomicBool::new(true),
            renderer: Mutex::new(Renderer {
                layout: GridLayoutEngine::new(options.scale_mode, options.origin),
                frame: FrameBuffer::new(),
            }),
            events: events_tx,
            cycles: AtomicU64::new(0),
            last_stop: Mutex::new(None),
        });
        let pump = Self {
            shared,
            stop_tx: None,
            thread: None,
        };
        (pump, events_rx)
    }

    pub fn state(&self) -> PumpState {
        self.shared.state()
    }

    pub fn palette(&self) -> &Arc<Palette> {
        &self.shared.palette
    }

    pub fn options(&self) -> RenderOptions {
        self.shared.options
    }

    pub fn surface_size(&self) -> SurfaceSize {
        *self.shared.surface.lock()
    }

    /// Geometry of the frame currently held, if any.
    pub fn geometry(&self) -> Option<GridGeometry> {
        self.shared.renderer.lock().frame.geometry().copied()
    }

    /// Cycles attempted since creation (including failed and deferred ones).
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }

    /// Reason for the most recent stop.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.shared.last_stop.lock().clone()
    }

    /// Resize signal from the shell. Marks the geometry stale; the next
    /// cycle recomputes it and redraws everything.
    pub fn resize(&self, surface: SurfaceSize) {
        *self.shared.surface.lock() = surface;
        self.shared.geometry_stale.store(true, Ordering::Release);
        debug!(cols = surface.cols, rows = surface.rows, "surface resized");
    }

    /// `Idle`/`Stopped` -> `Running`. The first cycle runs immediately,
    /// then one per `interval`.
    pub fn start(&mut self, interval: Duration) -> Result<(), PumpError> {
        if interval.is_zero() {
            return Err(PumpError::InvalidInterval);
        }
        let previous = self.state();
        if matches!(previous, PumpState::Running | PumpState::Cancelling) {
            return Err(PumpError::AlreadyRunning(previous));
        }
        self.join();

        self.shared.renderer.lock().layout.invalidate();
        *self.shared.last_stop.lock() = None;
        *self.shared.state.lock() = PumpState::Running;

        let (stop_tx, stop_rx) = bounded(1);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("cmap-refresh".into())
            .spawn(move || run(shared, interval, stop_rx));
        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                self.stop_tx = Some(stop_tx);
                info!(interval_ms = interval.as_millis() as u64, "refresh pump started");
                Ok(())
            }
            Err(err) => {
                *self.shared.state.lock() = previous;
                Err(PumpError::Spawn(err))
            }
        }
    }

    /// `Running` -> `Cancelling`. Never interrupts a cycle; the thread
    /// reaches `Stopped` once the in-flight cycle (if any) is done.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        if *state != PumpState::Running {
            return;
        }
        *state = PumpState::Cancelling;
        drop(state);
        if let Some(stop_tx) = &self.stop_tx {
            let _ = stop_tx.try_send(());
        }
        info!("refresh pump cancelling");
    }

    /// Wait for the refresh thread to exit.
    pub fn join(&mut self) {
        self.stop_tx = None;
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("refresh thread panicked");
            }
        }
    }

    /// Run one cycle on the calling thread, subject to the same
    /// at-most-one-cycle rule as the timer.
    pub fn run_cycle(&self) -> CycleOutcome {
        self.shared.cycle()
    }
}

impl Drop for RefreshPump {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::layout::{CellPos, Scale};
    use crate::models::{CellState, ClusterState, VolumeSnapshot};
    use crate::source::SharedVolume;
    use std::time::Instant;

    const HOUR: Duration = Duration::from_secs(3600);

    /// Source whose reads block until the test lets them through.
    struct GatedSource {
        inner: SharedVolume,
        gate: Receiver<()>,
        entered: Sender<()>,
    }

    impl VolumeStateSource for GatedSource {
        fn snapshot(&self) -> Result<VolumeSnapshot, SourceError> {
            let _ = self.entered.send(());
            let _ = self.gate.recv_timeout(Duration::from_secs(10));
            self.inner.snapshot()
        }
    }

    fn volume(n: usize) -> Arc<SharedVolume> {
        Arc::new(SharedVolume::new("T:", VolumeSnapshot::new(vec![ClusterState::Free; n])))
    }

    /// Manual cycle, retried while the timer thread is still finishing its own.
    fn settled_cycle(pump: &RefreshPump) -> CycleOutcome {
        loop {
            match pump.run_cycle() {
                CycleOutcome::Busy => thread::yield_now(),
                outcome => return outcome,
            }
        }
    }

    fn next_frame(rx: &Receiver<PumpEvent>) -> DrawBatch {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(PumpEvent::Frame(batch)) => return batch,
                Ok(PumpEvent::Stopped(reason)) => panic!("pump stopped: {reason}"),
                Err(err) => panic!("no frame within 10 seconds: {err}"),
            }
        }
    }

    /// Pump over a gated source; returns the gate and the "read entered" signal.
    fn gated_pump(n: usize, surface: SurfaceSize) -> (RefreshPump, Receiver<PumpEvent>, Sender<()>, Receiver<()>) {
        let (gate_tx, gate_rx) = bounded(0);
        let (entered_tx, entered_rx) = bounded(4);
        let source = Arc::new(GatedSource {
            inner: SharedVolume::new("T:", VolumeSnapshot::new(vec![ClusterState::Busy; n])),
            gate: gate_rx,
            entered: entered_tx,
        });
        let (pump, rx) = RefreshPump::new(
            source,
            Arc::new(Palette::standard()),
            RenderOptions::default(),
            surface,
        );
        (pump, rx, gate_tx, entered_rx)
    }

    fn next_event(rx: &Receiver<PumpEvent>) -> PumpEvent {
        rx.recv_timeout(Duration::from_secs(10)).expect("no event within 10 seconds")
    }

    #[test]
    fn test_idle_pump_does_not_cycle() {
        let (pump, rx) = RefreshPump::new(
            volume(100),
            Arc::new(Palette::standard()),
            RenderOptions::default(),
            SurfaceSize::new(10, 10),
        );
        assert_eq!(pump.state(), PumpState::Idle);
        assert_eq!(pump.run_cycle(), CycleOutcome::NotRunning);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let (mut pump, _rx) = RefreshPump::new(
            volume(100),
            Arc::new(Palette::standard()),
            RenderOptions::default(),
            SurfaceSize::new(10, 10),
        );
        assert!(matches!(
            pump.start(Duration::ZERO),
            Err(PumpError::InvalidInterval)
        ));
        assert_eq!(pump.state(), PumpState::Idle);
    }

    #[test]
    fn test_tick_while_busy_is_dropped() {
        let (mut pump, rx, gate_tx, entered_rx) = gated_pump(400, SurfaceSize::new(10, 10));
        pump.start(HOUR).unwrap();

        // The immediate first cycle is now blocked inside the source.
        entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(pump.run_cycle(), CycleOutcome::Busy);

        // Resizing does not wait on the blocked read.
        pump.resize(SurfaceSize::new(20, 10));

        gate_tx.send(()).unwrap();
        let first = next_frame(&rx);
        // The in-flight cycle kept the geometry it started with.
        assert_eq!(first.surface, SurfaceSize::new(10, 10));
        assert_eq!(first.geometry.scale, Scale::ClustersPerCell(4));
        assert!(first.full);
        assert_eq!(first.cells.len(), 100);

        pump.stop();
        pump.join();
        assert_eq!(pump.state(), PumpState::Stopped);
    }

    #[test]
    fn test_stop_lets_timer_cycle_finish() {
        let (mut pump, rx, gate_tx, entered_rx) = gated_pump(400, SurfaceSize::new(10, 10));
        pump.start(HOUR).unwrap();
        entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();

        pump.stop();
        assert_eq!(pump.state(), PumpState::Cancelling);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        gate_tx.send(()).unwrap();
        match next_event(&rx) {
            PumpEvent::Frame(batch) => {
                assert!(batch.full);
                assert_eq!(batch.cells.len(), 100);
            }
            PumpEvent::Stopped(reason) => panic!("stopped before the cycle finished: {reason}"),
        }
        assert!(matches!(next_event(&rx), PumpEvent::Stopped(StopReason::Requested)));

        pump.join();
        assert_eq!(pump.state(), PumpState::Stopped);
        assert_eq!(pump.geometry(), None);
    }

    #[test]
    fn test_stop_waits_for_manual_cycle() {
        let (mut pump, rx, gate_tx, entered_rx) = gated_pump(16, SurfaceSize::new(4, 4));
        pump.start(HOUR).unwrap();
        entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        gate_tx.send(()).unwrap();
        next_frame(&rx);

        let outcome = thread::scope(|scope| {
            let manual = scope.spawn(|| settled_cycle(&pump));
            entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();

            pump.stop();
            // The refresh thread is parked until the manual cycle is done.
            assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
            assert_eq!(pump.state(), PumpState::Cancelling);

            gate_tx.send(()).unwrap();
            manual.join().unwrap()
        });
        assert_eq!(outcome, CycleOutcome::Drawn { dirty: 0, full: false });

        assert!(matches!(next_event(&rx), PumpEvent::Frame(_)));
        assert!(matches!(next_event(&rx), PumpEvent::Stopped(StopReason::Requested)));
        pump.join();
        assert_eq!(pump.state(), PumpState::Stopped);
        assert_eq!(pump.geometry(), None);
        assert_eq!(pump.run_cycle(), CycleOutcome::NotRunning);
    }

    #[test]
    fn test_backpressure_holds_frame_until_drained() {
        let source = volume(16);
        let (mut pump, rx) = RefreshPump::new(
            source.clone(),
            Arc::new(Palette::standard()),
            RenderOptions::default(),
            SurfaceSize::new(4, 4),
        );
        pump.start(HOUR).unwrap();
        let first = next_frame(&rx);
        assert_eq!(first.cells.len(), 16);

        // Fill the channel with unchanged frames.
        let mut outcome = settled_cycle(&pump);
        while outcome != CycleOutcome::Backpressure {
            assert_eq!(outcome, CycleOutcome::Drawn { dirty: 0, full: false });
            outcome = settled_cycle(&pump);
        }

        let mut clusters = vec![ClusterState::Free; 16];
        clusters[5] = ClusterState::Fragmented;
        source.publish(VolumeSnapshot::new(clusters));
        assert_eq!(settled_cycle(&pump), CycleOutcome::Backpressure);

        while rx.try_recv().is_ok() {}
        assert_eq!(settled_cycle(&pump), CycleOutcome::Drawn { dirty: 1, full: false });
        let batch = next_frame(&rx);
        assert_eq!(batch.cells[0].pos, CellPos::new(1, 1));
        assert_eq!(batch.cells[0].state, CellState::Cluster(ClusterState::Fragmented));
    }
}
