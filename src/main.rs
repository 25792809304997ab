use anyhow::{Context, Result};
use clap::Parser;
use cluster_map::app::{self, Args, Session};
use cluster_map::constants::ShellStyle;
use cluster_map::ui;
use std::fs::File;
use std::sync::Mutex;
use tracing::Level;

fn main() -> Result<()> {
    let args = Args::parse();
    let shell = args.shell_style();
    init_logging(&args, shell)?;

    match shell {
        ShellStyle::Graphical => run_graphical(&args),
        ShellStyle::Terminal => run_terminal(&args),
    }
}

/// The terminal shell owns the screen, so it only logs when given a file.
fn init_logging(args: &Args, shell: ShellStyle) -> Result<()> {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    match (&args.log_file, shell) {
        (Some(path), _) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        (None, ShellStyle::Graphical) => {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .init();
        }
        (None, ShellStyle::Terminal) => {}
    }
    Ok(())
}

fn run_terminal(args: &Args) -> Result<()> {
    // Setup terminal
    let mut tui = ui::TuiWrapper::new().context("cannot initialise terminal")?;
    let surface = ui::map_surface(tui.area()?);

    let session = match Session::launch(args, surface) {
        Ok(session) => session,
        Err(err) => {
            tui.cleanup()?;
            return Err(err).context("cannot start cluster map");
        }
    };

    // Setup Ctrl+C handler
    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("cannot set Ctrl-C handler")?;

    let mut app = app::App::new(session, surface);
    let result = app.run(&mut tui, rx);

    // Restore terminal
    tui.cleanup()?;
    result.context("terminal shell failed")
}

#[cfg(feature = "graphical")]
fn run_graphical(args: &Args) -> Result<()> {
    use cluster_map::constants::graphics as gfx_const;
    use cluster_map::graphics::{self, CellMetrics};
    use cluster_map::map::SurfaceSize;

    let metrics = CellMetrics::new(args.block_size, args.grid_line);
    // The window reports its real size once open; start from the default.
    let surface: SurfaceSize = metrics.surface_for(gfx_const::WINDOW_WIDTH, gfx_const::WINDOW_HEIGHT);
    let session = Session::launch(args, surface).context("cannot start cluster map")?;
    graphics::run_map_window(session, metrics)
        .map_err(|e| anyhow::anyhow!("graphical mode failed: {}", e))
}

#[cfg(not(feature = "graphical"))]
fn run_graphical(_args: &Args) -> Result<()> {
    anyhow::bail!("graphical shell not available: rebuild with `--features graphical`")
}
