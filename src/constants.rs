//! Tunables for the cluster map and its demo volume engine.
//!
//! Grouped by concern so shells and the renderer can pull in only what they use.

/// Demo volume configurations
pub mod disk {
    /// A simulated drive: its size and how many clusters the engine moves per step
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct DriveConfig {
        pub letter: char,
        pub capacity_mb: u32,
        pub cluster_count: u32,
        pub iops: u32,
    }

    /// Drive C: Standard hard disk
    pub const DRIVE_C: DriveConfig = DriveConfig {
        letter: 'C',
        capacity_mb: 2048,
        cluster_count: 524_288,
        iops: 64,
    };

    /// Drive D: Medium hard disk
    pub const DRIVE_D: DriveConfig = DriveConfig {
        letter: 'D',
        capacity_mb: 1024,
        cluster_count: 262_144,
        iops: 96,
    };

    /// Drive E: Small, slow volume (fewer clusters than a large terminal has cells)
    pub const DRIVE_E: DriveConfig = DriveConfig {
        letter: 'E',
        capacity_mb: 8,
        cluster_count: 2048,
        iops: 4,
    };

    /// Drive F: Fast SSD
    pub const DRIVE_F: DriveConfig = DriveConfig {
        letter: 'F',
        capacity_mb: 4096,
        cluster_count: 1_048_576,
        iops: 512,
    };

    /// All available drive configurations
    pub const ALL_DRIVES: [DriveConfig; 4] = [DRIVE_C, DRIVE_D, DRIVE_E, DRIVE_F];

    /// Default drive (Drive C)
    pub const DEFAULT_DRIVE: DriveConfig = DRIVE_C;

    /// Get drive by letter (case-insensitive)
    pub fn get_drive_by_letter(letter: char) -> Option<DriveConfig> {
        let letter = letter.to_ascii_uppercase();
        ALL_DRIVES.iter().find(|d| d.letter == letter).copied()
    }

    /// Human-readable drive description
    pub fn describe(drive: &DriveConfig) -> String {
        format!(
            "{}: {} MB, {} clusters",
            drive.letter, drive.capacity_mb, drive.cluster_count
        )
    }
}

/// Refresh pump timing
pub mod refresh {
    /// Default interval between refresh cycles (UD_REFRESH_INTERVAL)
    pub const DEFAULT_INTERVAL_MS: u64 = 100;

    /// Shortest accepted refresh interval
    pub const MIN_INTERVAL_MS: u64 = 10;

    /// Frames buffered between the pump and the shell before backpressure kicks in
    pub const EVENT_CHANNEL_CAPACITY: usize = 4;

    /// How long a stopping pump waits to hand its `Stopped` event to a full channel
    pub const STOP_NOTIFY_TIMEOUT_MS: u64 = 1000;

    /// Clamp a configured interval to the accepted minimum.
    pub fn clamp_interval_ms(ms: u64) -> u64 {
        ms.max(MIN_INTERVAL_MS)
    }
}

/// Demo engine step timing
pub mod animation {
    /// Default tick rate in milliseconds
    pub const DEFAULT_TICK_RATE_MS: u64 = 80;

    /// Fast engine tick rate
    pub const FAST_TICK_RATE_MS: u64 = 40;

    /// Slow engine tick rate
    pub const SLOW_TICK_RATE_MS: u64 = 150;

    /// Analysis phase duration (in ticks)
    pub const ANALYZE_DURATION_TICKS: u64 = 20;

    /// Poll interval of the terminal shell's input loop
    pub const INPUT_POLL_MS: u64 = 16;

    /// Map a `--speed` value to a tick rate; unknown values fall back to normal.
    pub fn tick_rate_ms(speed: &str) -> u64 {
        match speed.to_lowercase().as_str() {
            "fast" => FAST_TICK_RATE_MS,
            "slow" => SLOW_TICK_RATE_MS,
            _ => DEFAULT_TICK_RATE_MS,
        }
    }
}

/// Graphical shell sizing
pub mod graphics {
    /// Side of one map cell in pixels (UD_MAP_BLOCK_SIZE)
    pub const DEFAULT_BLOCK_SIZE: u32 = 4;

    /// Width of the grid lines between cells (UD_GRID_LINE_WIDTH)
    pub const DEFAULT_GRID_LINE_WIDTH: u32 = 1;

    /// Initial window size
    pub const WINDOW_WIDTH: u32 = 800;
    pub const WINDOW_HEIGHT: u32 = 600;

    /// Frame pacing of the window loop
    pub const FRAME_DELAY_MS: u64 = 16;
}

/// Terminal shell layout and demo volume composition
pub mod ui {
    /// Default share of the volume holding data
    pub const DEFAULT_FILL_PERCENT: f32 = 0.65;

    /// Share of data clusters that belong to fragmented files
    pub const FRAGMENTED_PERCENT: f32 = 0.30;

    /// Percentage of bad clusters
    pub const BAD_BLOCK_PERCENT: f32 = 0.02;

    /// Share of the volume reserved for the MFT zone
    pub const MFT_ZONE_PERCENT: f32 = 0.125;

    /// Share of the volume at the start occupied by unmovable system files
    pub const SYSTEM_AREA_PERCENT: f32 = 0.01;

    /// Height of the legend/status footer, borders included
    pub const FOOTER_HEIGHT: u16 = 7;

    /// Progress bar width in characters
    pub const PROGRESS_BAR_WIDTH: usize = 30;
}

/// Which presentation shell draws the map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellStyle {
    /// Full-screen terminal (ratatui)
    Terminal,
    /// SDL2 window
    Graphical,
}

impl ShellStyle {
    /// Parse a `--ui` value; unknown values fall back to the terminal shell.
    pub fn from_arg(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "graphical" | "gui" | "sdl" | "window" => ShellStyle::Graphical,
            _ => ShellStyle::Terminal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShellStyle::Terminal => "terminal",
            ShellStyle::Graphical => "graphical",
        }
    }
}
