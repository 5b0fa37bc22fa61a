//! Tilecascade: falling-tile connection-matching puzzle in the terminal.

mod app;
mod input;
mod theme;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tilecascade::{GameMode, GameSettings, logging};

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(path) = &args.log_file {
        logging::init_file(path, args.log_level.into())
            .with_context(|| format!("cannot open log file {}", path.display()))?;
    }
    let mut settings = GameSettings::load(args.settings.as_deref())
        .context("cannot load settings")?;
    args.apply_overrides(&mut settings);
    settings.validate().context("invalid settings")?;
    let theme = theme::Theme::for_palette(args.palette);
    let mut app = App::new(args, settings, theme)?;
    let result = app.run();
    logging::shutdown();
    result
}

/// Falling-tile matching puzzle in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "tilecascade",
    version,
    about = "Falling-tile matching puzzle in the terminal. Connect four of a colour to clear them.",
    long_about = "Tilecascade is a terminal puzzle game: pairs of coloured tiles fall into the grid. \
        Same-coloured neighbours connect; a group of --min-match or more clears, and the tiles above \
        it drop into the gap, possibly setting off a chain.\n\n\
        CONTROLS:\n  Left/Right or h/l  Shift    Up/k/Space  Rotate    Down/j  Fall faster\n  \
        P  Pause    R  Restart (after the match)    Q / Esc  Quit\n\n\
        In versus mode every opponent plays its own grid; the last grid standing wins."
)]
pub struct Args {
    /// Game mode: single (play until your grid tops out) or versus (last grid standing).
    #[arg(short, long, default_value = "single")]
    pub mode: ModeArg,

    /// Number of computer opponents in versus mode.
    #[arg(short, long, default_value = "1", value_name = "N")]
    pub opponents: u8,

    /// Grid rows (overrides the settings file).
    #[arg(long, value_name = "ROWS")]
    pub rows: Option<u16>,

    /// Grid columns (overrides the settings file); the spawn column is re-centred.
    #[arg(long, value_name = "COLS")]
    pub columns: Option<u16>,

    /// Minimum group size that clears.
    #[arg(long, value_name = "N")]
    pub min_match: Option<usize>,

    /// Settings file with `key = value` lines.
    #[arg(short, long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// RNG seed for spawns and opponents (random if not set).
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Simulation ticks per second.
    #[arg(long, default_value = "60.0", value_name = "RATE")]
    pub tick_rate: f64,

    /// Disable the fade when tiles clear.
    #[arg(long)]
    pub no_animation: bool,

    /// Colour palette: normal, high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Write a log to this file (the terminal is busy drawing the game).
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log level for --log-file.
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,
}

impl Args {
    /// CLI values win over the settings file.
    fn apply_overrides(&self, settings: &mut GameSettings) {
        if let Some(rows) = self.rows {
            settings.rows = rows;
        }
        if let Some(columns) = self.columns {
            settings.columns = columns;
            settings.spawn_column = columns.saturating_sub(1) / 2;
        }
        if let Some(min_match) = self.min_match {
            settings.min_match = min_match;
        }
    }

    pub fn game_mode(&self) -> GameMode {
        match self.mode {
            ModeArg::Single => GameMode::SinglePlayer,
            ModeArg::Versus => GameMode::Versus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ModeArg {
    #[default]
    Single,
    #[value(alias = "vs")]
    Versus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,

    #[value(alias = "colourblind")]
    Colorblind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}
