//! SDL2 Backend for the graphical map window
//! Provides the core SDL2 initialization and event handling

use sdl2::event::{Event, WindowEvent};
use sdl2::keyboard::Keycode;
use sdl2::pixels::Color;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};

/// Window chrome colors
pub mod colors {
    use sdl2::pixels::Color;

    /// Background around the map and grid line color
    pub const SURFACE: Color = Color::RGB(192, 192, 192);
    pub const GRID_LINE: Color = Color::RGB(0, 0, 0);
}

/// Configuration for the SDL window
pub struct SdlConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for SdlConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Cluster Map".to_string(),
        }
    }
}

/// SDL2 Backend managing the window and rendering context
pub struct SdlBackend {
    pub sdl_context: sdl2::Sdl,
    pub video_subsystem: sdl2::VideoSubsystem,
    pub canvas: Canvas<Window>,
    pub texture_creator: TextureCreator<WindowContext>,
    pub event_pump: sdl2::EventPump,
    pub running: bool,
}

impl SdlBackend {
    /// Create a new SDL2 backend with the given configuration
    pub fn new(config: &SdlConfig) -> Result<Self, String> {
        let sdl_context = sdl2::init()?;
        let video_subsystem = sdl_context.video()?;

        let window = video_subsystem
            .window(&config.title, config.width, config.height)
            .position_centered()
            .resizable()
            .build()
            .map_err(|e| e.to_string())?;

        let canvas = window
            .into_canvas()
            .accelerated()
            .present_vsync()
            .build()
            .map_err(|e| e.to_string())?;

        let texture_creator = canvas.texture_creator();
        let event_pump = sdl_context.event_pump()?;

        Ok(Self {
            sdl_context,
            video_subsystem,
            canvas,
            texture_creator,
            event_pump,
            running: true,
        })
    }

    /// Clear the canvas with the window background
    pub fn clear(&mut self, color: Color) {
        self.canvas.set_draw_color(color);
        self.canvas.clear();
    }

    /// Present the canvas to the screen
    pub fn present(&mut self) {
        self.canvas.present();
    }

    /// Drawable size of the window in pixels
    pub fn output_size(&self) -> Result<(u32, u32), String> {
        self.canvas.output_size()
    }

    pub fn set_title(&mut self, title: &str) {
        if let Err(err) = self.canvas.window_mut().set_title(title) {
            tracing::debug!(%err, "cannot set window title");
        }
    }

    /// Drain pending window events
    pub fn poll_events(&mut self) -> Vec<SdlEvent> {
        let mut events = Vec::new();

        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => {
                    self.running = false;
                    events.push(SdlEvent::Quit);
                }
                Event::KeyDown {
                    keycode: Some(keycode),
                    ..
                } => {
                    events.push(SdlEvent::KeyDown(keycode));
                    if keycode == Keycode::Escape {
                        self.running = false;
                    }
                }
                Event::Window {
                    win_event: WindowEvent::SizeChanged(w, h),
                    ..
                } => {
                    events.push(SdlEvent::Resized {
                        width: w.max(0) as u32,
                        height: h.max(0) as u32,
                    });
                }
                _ => {}
            }
        }

        events
    }

    /// Check if still running
    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Simplified SDL event types
#[derive(Debug, Clone)]
pub enum SdlEvent {
    Quit,
    KeyDown(Keycode),
    Resized { width: u32, height: u32 },
}
