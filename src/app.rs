use crate::constants::{animation, disk, graphics as gfx_const, refresh, ShellStyle};
use crate::error::{PumpError, SessionError, StopReason};
use crate::map::{
    GridGeometry, Palette, PumpEvent, PumpState, RefreshPump, RenderOptions, ScaleMode,
    SurfaceSize, TailPolicy, BLANK_SWATCH,
};
use crate::models::ClusterCounts;
use crate::simulator::{DefragSimulator, EngineHandle, EngineStatus};
use crate::source::SharedVolume;
use crate::surface::{paint, GridSurface, Surface};
use crossbeam_channel::Receiver;
use std::{io::Result, path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info, trace, warn};

// -- CLI arguments ------------------------------------------------------------

#[derive(clap::Parser, Debug)]
#[command(
    name = "cmap",
    version = "0.1.0",
    about = "Live cluster map of a defragmenting volume"
)]
pub struct Args {
    /// Presentation shell: terminal or graphical
    #[arg(long, short = 'u', default_value = "terminal")]
    pub ui: String,

    /// Select disk drive (C, D, E, or F)
    #[arg(long, short = 'd', default_value = "C")]
    pub drive: char,

    /// Initial disk fill percentage
    #[arg(long, default_value_t = 0.65)]
    pub fill: f32,

    /// Engine speed: fast, normal, or slow
    #[arg(long, default_value = "normal")]
    pub speed: String,

    /// Seed for the generated volume (random if omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Map refresh interval in milliseconds
    #[arg(long, env = "UD_REFRESH_INTERVAL", default_value_t = refresh::DEFAULT_INTERVAL_MS)]
    pub refresh_ms: u64,

    /// Cells past the end of the volume: blank or extend
    #[arg(long, default_value = "blank")]
    pub tail: String,

    /// Repeat each cluster over several cells when the volume is smaller than the map
    #[arg(long, default_value_t = false)]
    pub stretch: bool,

    /// JSON legend overriding the built-in colours and priorities
    #[arg(long)]
    pub legend: Option<PathBuf>,

    /// Map cell size in pixels (graphical shell)
    #[arg(long, env = "UD_MAP_BLOCK_SIZE", default_value_t = gfx_const::DEFAULT_BLOCK_SIZE)]
    pub block_size: u32,

    /// Grid line width in pixels (graphical shell)
    #[arg(long, env = "UD_GRID_LINE_WIDTH", default_value_t = gfx_const::DEFAULT_GRID_LINE_WIDTH)]
    pub grid_line: u32,

    /// Write logs to this file
    #[arg(long, env = "CMAP_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    pub fn shell_style(&self) -> ShellStyle {
        ShellStyle::from_arg(&self.ui)
    }

    pub fn drive_config(&self) -> disk::DriveConfig {
        disk::get_drive_by_letter(self.drive).unwrap_or_else(|| {
            warn!(drive = %self.drive, "unknown drive, using default");
            disk::DEFAULT_DRIVE
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(refresh::clamp_interval_ms(self.refresh_ms))
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(animation::tick_rate_ms(&self.speed))
    }

    pub fn tail_policy(&self) -> TailPolicy {
        match self.tail.to_lowercase().as_str() {
            "extend" | "extend-last" | "last" => TailPolicy::ExtendLast,
            _ => TailPolicy::Blank,
        }
    }

    pub fn scale_mode(&self) -> ScaleMode {
        if self.stretch {
            ScaleMode::Stretch
        } else {
            ScaleMode::Compress
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            scale_mode: self.scale_mode(),
            tail: self.tail_policy(),
            ..RenderOptions::default()
        }
    }

    /// The legend file if one was given, the built-in legend otherwise.
    pub fn palette(&self) -> std::result::Result<Palette, crate::error::PaletteError> {
        match &self.legend {
            Some(path) => {
                let palette = Palette::load(path)?;
                info!(path = %path.display(), "legend loaded");
                Ok(palette)
            }
            None => Ok(Palette::standard()),
        }
    }
}

// -- Session ------------------------------------------------------------------

/// A volume, the engine working on it and the pump mapping it.
///
/// Shared by both shells; the shell owns the surface and drains `events()`.
pub struct Session {
    volume: Arc<SharedVolume>,
    engine: Option<EngineHandle>,
    pump: RefreshPump,
    events: Receiver<PumpEvent>,
    interval: Duration,
}

impl Session {
    /// Generate the demo volume for the configured drive, start its engine and the pump.
    pub fn launch(args: &Args, surface: SurfaceSize) -> std::result::Result<Self, SessionError> {
        let palette = args.palette()?;
        let drive = args.drive_config();
        info!(drive = %disk::describe(&drive), shell = args.shell_style().name(), "launching session");

        let engine = DefragSimulator::new(drive, args.fill, args.seed);
        let volume = Arc::new(SharedVolume::new(format!("{}:", drive.letter), engine.snapshot()));
        let handle = engine
            .spawn(Arc::clone(&volume), args.tick_rate())
            .map_err(SessionError::Engine)?;

        Self::start(
            volume,
            Some(handle),
            palette,
            args.render_options(),
            surface,
            args.refresh_interval(),
        )
    }

    /// Start a pump over an existing volume.
    pub fn start(
        volume: Arc<SharedVolume>,
        engine: Option<EngineHandle>,
        palette: Palette,
        options: RenderOptions,
        surface: SurfaceSize,
        interval: Duration,
    ) -> std::result::Result<Self, SessionError> {
        let (mut pump, events) = RefreshPump::new(volume.clone(), Arc::new(palette), options, surface);
        pump.start(interval)?;
        Ok(Self {
            volume,
            engine,
            pump,
            events,
            interval,
        })
    }

    pub fn pump(&self) -> &RefreshPump {
        &self.pump
    }

    pub fn palette(&self) -> &Palette {
        self.pump.palette()
    }

    pub fn volume(&self) -> &SharedVolume {
        &self.volume
    }

    pub fn events(&self) -> &Receiver<PumpEvent> {
        &self.events
    }

    pub fn engine_status(&self) -> Option<EngineStatus> {
        self.engine.as_ref().map(|engine| engine.status())
    }

    pub fn resize(&self, surface: SurfaceSize) {
        self.pump.resize(surface);
    }

    /// Pause or resume the engine. Returns the new paused state.
    pub fn toggle_pause(&self) -> Option<bool> {
        self.engine.as_ref().map(|engine| engine.toggle_pause())
    }

    /// Close the volume under the pump; its next cycle fails and it stops.
    pub fn eject(&self) {
        info!(volume = self.volume.label(), "ejecting volume");
        self.volume.close();
        if let Some(engine) = &self.engine {
            engine.cancel();
        }
    }

    /// Restart a stopped pump. Returns `false` if it was not stopped.
    pub fn restart(&mut self) -> std::result::Result<bool, PumpError> {
        if self.pump.state() != PumpState::Stopped {
            return Ok(false);
        }
        self.pump.start(self.interval)?;
        Ok(true)
    }

    pub fn shutdown(&mut self) {
        self.pump.stop();
        self.pump.join();
        if let Some(mut engine) = self.engine.take() {
            engine.cancel();
            engine.join();
        }
    }
}

// -- Terminal application -----------------------------------------------------

pub struct App {
    pub running: bool,
    pub session: Session,
    pub map: GridSurface,
    pub counts: Option<ClusterCounts>,
    pub geometry: Option<GridGeometry>,
    pub frames_drawn: u64,
    pub last_cycle: u64,
    pub stop_reason: Option<StopReason>,
    status_message: String,
}

impl App {
    pub fn new(session: Session, surface: SurfaceSize) -> Self {
        Self {
            running: true,
            session,
            map: GridSurface::new(surface, BLANK_SWATCH),
            counts: None,
            geometry: None,
            frames_drawn: 0,
            last_cycle: 0,
            stop_reason: None,
            status_message: "Initializing...".to_string(),
        }
    }

    /// Apply one pump event to the map.
    pub fn apply(&mut self, event: PumpEvent) {
        match event {
            PumpEvent::Frame(batch) => {
                match paint(&mut self.map, self.session.palette(), &batch) {
                    Some(drawn) => {
                        self.counts = Some(batch.counts);
                        self.geometry = Some(batch.geometry);
                        self.frames_drawn += 1;
                        self.last_cycle = batch.cycle;
                        trace!(cycle = batch.cycle, drawn, full = batch.full, "batch painted");
                    }
                    // Laid out for a surface we no longer have; a full redraw follows.
                    None => debug!(cycle = batch.cycle, "stale batch dropped"),
                }
            }
            PumpEvent::Stopped(reason) => {
                self.status_message = match &reason {
                    StopReason::Requested => "Map stopped".to_string(),
                    other => format!("Map stopped: {}", other),
                };
                self.stop_reason = Some(reason);
            }
        }
    }

    /// Apply every event already waiting. Returns how many were applied.
    pub fn drain_events(&mut self) -> usize {
        let pending: Vec<PumpEvent> = self.session.events().try_iter().collect();
        let count = pending.len();
        for event in pending {
            self.apply(event);
        }
        count
    }

    pub fn resize(&mut self, surface: SurfaceSize) {
        if surface != self.map.surface_size() {
            self.map.resize(surface, BLANK_SWATCH);
        }
        self.session.resize(surface);
    }

    pub fn handle_key(&mut self, code: crossterm::event::KeyCode) {
        use crossterm::event::KeyCode;

        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.running = false;
            }
            KeyCode::Char('p') | KeyCode::Char('P') | KeyCode::Char(' ') => {
                if let Some(paused) = self.session.toggle_pause() {
                    self.status_message = if paused { "Paused" } else { "Resumed" }.to_string();
                }
            }
            KeyCode::Char('e') | KeyCode::Char('E') => {
                self.session.eject();
                self.status_message = format!("{} ejected", self.session.volume().label());
            }
            KeyCode::Char('r') | KeyCode::Char('R') => match self.session.restart() {
                Ok(true) => {
                    self.stop_reason = None;
                    self.status_message = "Map restarted".to_string();
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(%err, "cannot restart refresh pump");
                    self.status_message = err.to_string();
                }
            },
            _ => {}
        }
    }

    pub fn run(
        &mut self,
        term: &mut crate::ui::TuiWrapper,
        ctrl_c: Receiver<()>,
    ) -> Result<()> {
        use crossterm::event::{self, Event, KeyEventKind};

        while self.running {
            self.drain_events();
            term.draw(|frame| crate::ui::render_app(&*self, frame))?;

            if ctrl_c.try_recv().is_ok() {
                self.running = false;
            }

            if event::poll(Duration::from_millis(animation::INPUT_POLL_MS))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        self.handle_key(key.code);
                    }
                    Event::Resize(cols, rows) => {
                        let area = ratatui::layout::Rect::new(0, 0, cols, rows);
                        self.resize(crate::ui::map_surface(area));
                    }
                    _ => {}
                }
            }
        }

        self.session.shutdown();
        Ok(())
    }

    /// Text for the action line.
    pub fn status_text(&self) -> String {
        if self.stop_reason.is_some() {
            return self.status_message.clone();
        }
        match self.session.engine_status() {
            Some(status) if status.paused => "[ PAUSED ]".to_string(),
            Some(status) => status.phase.label().to_string(),
            None => self.status_message.clone(),
        }
    }

    pub fn pump_state(&self) -> PumpState {
        self.session.pump().state()
    }
}
