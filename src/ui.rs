use crate::app::App;
use crate::constants::ui as ui_const;
use crate::map::{Palette, PumpState, Scale, SurfaceSize, Swatch};
use crate::models::ClusterCounts;
use crate::simulator::EngineStatus;
use crate::surface::GridSurface;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    prelude::*,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

// -- UI Components ------------------------------------------------------------

pub struct TuiWrapper {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
}

impl TuiWrapper {
    pub fn new() -> Result<Self, std::io::Error> {
        use crossterm::{
            terminal::{enable_raw_mode, EnterAlternateScreen},
            ExecutableCommand,
        };

        std::io::stdout().execute(EnterAlternateScreen)?;
        enable_raw_mode()?;
        let backend = CrosstermBackend::new(std::io::stdout());
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    /// Whole terminal area.
    pub fn area(&self) -> Result<Rect, std::io::Error> {
        let size = self.terminal.size()?;
        Ok(Rect::new(0, 0, size.width, size.height))
    }

    pub fn draw(&mut self, f: impl FnOnce(&mut Frame)) -> Result<(), std::io::Error> {
        self.terminal.draw(f).map(|_| ())
    }

    pub fn cleanup(&mut self) -> Result<(), std::io::Error> {
        use crossterm::{
            terminal::{disable_raw_mode, LeaveAlternateScreen},
            ExecutableCommand,
        };

        self.terminal.backend_mut().execute(LeaveAlternateScreen)?;
        disable_raw_mode()?;
        Ok(())
    }
}

/// Header line, map window and footer.
fn screen_layout(area: Rect) -> [Rect; 3] {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(ui_const::FOOTER_HEIGHT),
        ])
        .split(area);
    [parts[0], parts[1], parts[2]]
}

fn map_window() -> Block<'static> {
    Block::new()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .style(Style::new().on_blue())
}

/// Map drawing area inside the window for a terminal of `area`.
pub fn map_rect(area: Rect) -> Rect {
    let [_, window, _] = screen_layout(area);
    map_window().inner(window)
}

/// Surface size the pump should lay the map out for.
pub fn map_surface(area: Rect) -> SurfaceSize {
    let inner = map_rect(area);
    SurfaceSize::new(inner.width, inner.height)
}

pub fn render_app(app: &App, frame: &mut Frame) {
    frame.render_widget(Block::new().style(Style::new().on_blue()), frame.area());

    let [header, window, footer] = screen_layout(frame.area());

    render_header(app, frame, header);

    let block = map_window();
    let grid_area = block.inner(window);
    frame.render_widget(block, window);
    frame.render_widget(MapWidget { surface: &app.map }, grid_area);

    render_footer(app, frame, footer);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = format!(" Cluster Map - Volume {}", app.session.volume().label());
    let keys = "P=Pause  E=Eject  R=Restart  Esc=Quit ";
    let padding = (area.width as usize).saturating_sub(title.len() + keys.len());
    let header = Paragraph::new(Line::from(vec![
        Span::styled(title, Style::new().black().on_white().bold()),
        Span::styled(" ".repeat(padding), Style::new().black().on_white()),
        Span::styled(keys, Style::new().black().on_white()),
    ]));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);
    let boxes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(rows[0]);

    let status_block = Block::new()
        .borders(Borders::ALL)
        .title(" Status ")
        .title_alignment(Alignment::Center)
        .style(Style::new().white().on_blue());
    let status_inner = status_block.inner(boxes[0]);
    frame.render_widget(status_block, boxes[0]);
    frame.render_widget(
        Paragraph::new(status_lines(app, status_inner.width as usize)),
        status_inner,
    );

    let legend_block = Block::new()
        .borders(Borders::ALL)
        .title(" Legend ")
        .title_alignment(Alignment::Center)
        .style(Style::new().white().on_blue());
    let legend_inner = legend_block.inner(boxes[1]);
    frame.render_widget(legend_block, boxes[1]);
    frame.render_widget(
        Paragraph::new(legend_lines(
            app.session.palette(),
            app.counts.as_ref(),
            legend_inner.height as usize,
        )),
        legend_inner,
    );

    render_action_line(app, frame, rows[1]);
}

fn status_lines(app: &App, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let scale = match app.geometry.map(|g| g.scale) {
        Some(Scale::ClustersPerCell(k)) => format!("{} clusters per cell", k),
        Some(Scale::CellsPerCluster(k)) => format!("{} cells per cluster", k),
        None => "map pending".to_string(),
    };
    let total = app.counts.map_or(0, |c| c.total());
    let generation = app.session.volume().generation();
    lines.push(Line::from(format!("{} clusters, {}, snapshot {}", total, scale, generation)));

    let fragmentation = app.counts.map_or(0.0, |c| c.fragmentation_percent());
    let engine = app.session.engine_status();
    let percent = engine.map_or(0.0, |s| s.progress_percent());
    lines.push(Line::from(format!(
        "Fragmentation {:>5.1}%   Done {:>3}%",
        fragmentation,
        percent.min(100.0) as u8
    )));

    let bar_width = width.min(ui_const::PROGRESS_BAR_WIDTH);
    lines.push(Line::from(create_progress_bar(percent, bar_width)));
    lines.push(Line::from(time_display(engine)));
    lines
}

fn time_display(engine: Option<EngineStatus>) -> String {
    let Some(status) = engine else {
        return String::new();
    };
    let elapsed = status.stats.start_time.elapsed();
    let remaining = status
        .estimated_time_remaining()
        .map(|d| format!(" ETA {}", hms(d.as_secs())))
        .unwrap_or_default();
    format!("Time: {}{}", hms(elapsed.as_secs()), remaining)
}

fn hms(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Legend entries, most important first, laid out in columns of `height` rows.
fn legend_lines(palette: &Palette, counts: Option<&ClusterCounts>, height: usize) -> Vec<Line<'static>> {
    let entries = palette.by_priority();
    let height = height.max(1);
    let mut lines: Vec<Vec<Span<'static>>> = vec![Vec::new(); height.min(entries.len())];
    for (i, entry) in entries.iter().enumerate() {
        let count = counts.map_or(String::new(), |c| format!(" {}", c.get(entry.state)));
        let row = &mut lines[i % height];
        row.push(Span::raw(" "));
        row.push(Span::styled(entry.glyph.to_string(), swatch_style(entry.swatch())));
        row.push(Span::raw(format!(" {:<13}", format!("{}{}", entry.label, count))));
    }
    lines.into_iter().map(Line::from).collect()
}

fn render_action_line(app: &App, frame: &mut Frame, area: Rect) {
    let pump = match app.pump_state() {
        PumpState::Idle => "idle",
        PumpState::Running => "live",
        PumpState::Cancelling => "stopping",
        PumpState::Stopped => "stopped",
    };
    let right = format!("[map {}] | frame {} ", pump, app.last_cycle);
    let left = format!("  {}", app.status_text());
    let padding = (area.width as usize).saturating_sub(left.chars().count() + right.len());

    let action_line = Paragraph::new(format!("{}{}{}", left, " ".repeat(padding), right))
        .style(Style::new().on_red().white().bold());
    frame.render_widget(action_line, area);
}

fn create_progress_bar(percent: f32, bar_width: usize) -> String {
    let clamped_percent = percent.clamp(0.0, 100.0);
    let filled_width = ((clamped_percent / 100.0) * bar_width as f32) as usize;
    let empty_width = bar_width.saturating_sub(filled_width);
    format!("{}{}", "█".repeat(filled_width), "░".repeat(empty_width))
}

fn swatch_style(swatch: Swatch) -> Style {
    let color = Color::Rgb(swatch.color.0, swatch.color.1, swatch.color.2);
    if swatch.glyph == ' ' {
        Style::new().bg(color)
    } else {
        Style::new().fg(color).bg(Color::Blue)
    }
}

// -- Map Widget ---------------------------------------------------------------

/// Draws the shell's retained map surface. ratatui's own buffer diff keeps
/// terminal output down to the cells the pump reported dirty.
struct MapWidget<'a> {
    surface: &'a GridSurface,
}

impl Widget for MapWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for (y, row) in self.surface.rows().enumerate() {
            let row_idx = y as u16;
            if row_idx >= area.height {
                break;
            }
            for (x, swatch) in row.iter().enumerate() {
                let col = x as u16;
                if col >= area.width {
                    break;
                }
                if let Some(cell) = buf.cell_mut((area.x + col, area.y + row_idx)) {
                    let mut glyph = [0u8; 4];
                    cell.set_symbol(swatch.glyph.encode_utf8(&mut glyph))
                        .set_style(swatch_style(*swatch));
                }
            }
        }
    }
}
