//! SDL2 map window.
//!
//! Dirty cells are painted into an off-screen cache surface; every frame the
//! whole cache is blitted to the window, so partial updates never flicker.

use sdl2::keyboard::Keycode;
use sdl2::pixels::{Color, PixelFormatEnum};
use sdl2::rect::Rect;
use sdl2::surface::Surface as SdlSurface;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::sdl_backend::{colors, SdlBackend, SdlConfig, SdlEvent};
use super::CellMetrics;
use crate::app::Session;
use crate::constants::graphics as gfx_const;
use crate::error::StopReason;
use crate::map::{CellPos, PumpEvent, SurfaceSize, Swatch};
use crate::models::ClusterCounts;
use crate::surface::{paint, Surface};

/// Off-screen image of the map, sized to the window.
pub struct CacheSurface {
    cache: SdlSurface<'static>,
    metrics: CellMetrics,
    size: SurfaceSize,
}

impl CacheSurface {
    pub fn new(width: u32, height: u32, metrics: CellMetrics) -> Result<Self, String> {
        let mut cache = SdlSurface::new(width.max(1), height.max(1), PixelFormatEnum::RGB888)?;
        cache.fill_rect(None, colors::GRID_LINE)?;
        Ok(Self {
            cache,
            metrics,
            size: metrics.surface_for(width, height),
        })
    }

    pub fn image(&self) -> &SdlSurface<'static> {
        &self.cache
    }
}

impl Surface for CacheSurface {
    fn surface_size(&self) -> SurfaceSize {
        self.size
    }

    fn draw_cell(&mut self, pos: CellPos, swatch: Swatch) {
        if pos.x >= self.size.cols || pos.y >= self.size.rows {
            return;
        }
        let (x, y) = self.metrics.cell_origin(pos);
        let block = self.metrics.block_size;
        let color = Color::RGB(swatch.color.0, swatch.color.1, swatch.color.2);
        if let Err(err) = self.cache.fill_rect(Rect::new(x, y, block, block), color) {
            debug!(%err, "cell fill failed");
        }
    }
}

fn window_title(label: &str, counts: Option<&ClusterCounts>, stopped: Option<&StopReason>, paused: bool) -> String {
    let mut title = format!("Cluster Map - {}", label);
    if let Some(counts) = counts {
        title.push_str(&format!(
            " - {} clusters, {:.1}% fragmented",
            counts.total(),
            counts.fragmentation_percent()
        ));
    }
    if paused {
        title.push_str(" [paused]");
    }
    if let Some(reason) = stopped {
        title.push_str(&format!(" [{}]", reason));
    }
    title
}

/// Run the map window until it is closed. Takes ownership of the session
/// and shuts it down on exit.
pub fn run_map_window(mut session: Session, metrics: CellMetrics) -> Result<(), String> {
    let label = session.volume().label().to_string();
    let config = SdlConfig {
        width: gfx_const::WINDOW_WIDTH,
        height: gfx_const::WINDOW_HEIGHT,
        title: window_title(&label, None, None, false),
    };
    let mut backend = SdlBackend::new(&config)?;

    let (width, height) = backend.output_size()?;
    let mut cache = CacheSurface::new(width, height, metrics)?;
    session.resize(cache.surface_size());
    info!(cols = cache.size.cols, rows = cache.size.rows, "map window open");

    let mut counts: Option<ClusterCounts> = None;
    let mut stopped: Option<StopReason> = None;
    let mut title = config.title.clone();

    while backend.is_running() {
        for event in backend.poll_events() {
            match event {
                SdlEvent::Resized { width, height } => {
                    cache = CacheSurface::new(width, height, metrics)?;
                    session.resize(cache.surface_size());
                }
                SdlEvent::KeyDown(keycode) => match keycode {
                    Keycode::Q => backend.running = false,
                    Keycode::P | Keycode::Space => {
                        session.toggle_pause();
                    }
                    Keycode::E => session.eject(),
                    Keycode::R => match session.restart() {
                        Ok(true) => stopped = None,
                        Ok(false) => {}
                        Err(err) => warn!(%err, "cannot restart refresh pump"),
                    },
                    _ => {}
                },
                SdlEvent::Quit => {}
            }
        }

        let pending: Vec<PumpEvent> = session.events().try_iter().collect();
        for event in pending {
            match event {
                PumpEvent::Frame(batch) => {
                    if paint(&mut cache, session.palette(), &batch).is_some() {
                        counts = Some(batch.counts);
                    }
                }
                PumpEvent::Stopped(reason) => stopped = Some(reason),
            }
        }

        backend.clear(colors::SURFACE);
        {
            let texture = backend
                .texture_creator
                .create_texture_from_surface(cache.image())
                .map_err(|e| e.to_string())?;
            let (w, h) = (cache.image().width(), cache.image().height());
            backend.canvas.copy(&texture, None, Some(Rect::new(0, 0, w, h)))?;
        }
        backend.present();

        let paused = session.engine_status().map_or(false, |s| s.paused);
        let next_title = window_title(&label, counts.as_ref(), stopped.as_ref(), paused);
        if next_title != title {
            backend.set_title(&next_title);
            title = next_title;
        }

        thread::sleep(Duration::from_millis(gfx_const::FRAME_DELAY_MS));
    }

    session.shutdown();
    Ok(())
}
