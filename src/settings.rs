//! Game settings: grid shape, rules, speeds and spawning, loaded from a `key = value` file.

use crate::board::CellLayout;
use crate::geometry::{GridCoord, WorldPos};
use crate::tile::{TileCatalog, TileColor};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: cannot parse `{key} = {value}`")]
    Parse {
        line: usize,
        key: String,
        value: String,
    },
    #[error("grid must have at least one column and two rows (got {columns}x{rows})")]
    GridTooSmall { columns: u16, rows: u16 },
    #[error("grid may have at most {max} columns and rows (got {columns}x{rows})")]
    GridTooLarge { columns: u16, rows: u16, max: u16 },
    #[error("spawn column {column} is outside 0..{columns}")]
    SpawnColumnOutOfRange { column: u16, columns: u16 },
    #[error("minimum match size must be at least 2 (got {0})")]
    MinMatchTooSmall(usize),
    #[error("tile catalog is empty")]
    EmptyCatalog,
    #[error("{name} must be positive (got {value})")]
    NonPositiveSpeed { name: &'static str, value: f32 },
}

/// Fall speeds in cells per second, plus the removal effect length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallSpeeds {
    pub fall: f32,
    /// While Accelerate is held.
    pub boosted: f32,
    /// Single tiles and cascade drops.
    pub single: f32,
    pub game_over: f32,
    pub removal_effect_ms: u32,
}

impl Default for FallSpeeds {
    fn default() -> Self {
        Self {
            fall: 2.0,
            boosted: 4.0,
            single: 6.0,
            game_over: 10.0,
            removal_effect_ms: 300,
        }
    }
}

/// Largest accepted column or row count.
pub const MAX_GRID_DIM: u16 = 256;

#[derive(Debug, Clone)]
pub struct GameSettings {
    pub rows: u16,
    pub columns: u16,
    pub spawn_column: u16,
    pub layout: CellLayout,
    pub min_match: usize,
    pub base_tile_score: u32,
    /// Pre-spawned pairs kept in the waiting queue.
    pub queue_len: usize,
    pub speeds: FallSpeeds,
    pub weights: BTreeMap<TileColor, f32>,
    pub catalog: TileCatalog,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            rows: 16,
            columns: 8,
            spawn_column: 3,
            layout: CellLayout::default(),
            min_match: 4,
            base_tile_score: 10,
            queue_len: 2,
            speeds: FallSpeeds::default(),
            weights: TileColor::ALL.into_iter().map(|c| (c, 0.2)).collect(),
            catalog: TileCatalog::terminal_default(),
        }
    }
}

impl GameSettings {
    /// Load from a settings file. Falls back to defaults if `path` is None or missing.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = match path {
            Some(p) if p.exists() => p,
            Some(p) => {
                log::warn!("settings file {} not found, using defaults", p.display());
                return Ok(Self::default());
            }
            None => return Ok(Self::default()),
        };
        let s = std::fs::read_to_string(path)?;
        let mut settings = Self::default();
        settings.apply_str(&s)?;
        Ok(settings)
    }

    /// Apply every `key = value` line of `s` on top of the current values.
    pub fn apply_str(&mut self, s: &str) -> Result<(), SettingsError> {
        for (i, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(SettingsError::Parse {
                    line: i + 1,
                    key: line.to_string(),
                    value: String::new(),
                });
            };
            let (key, value) = (key.trim(), value.trim().trim_matches('"'));
            if !self.apply(key, value).map_err(|()| SettingsError::Parse {
                line: i + 1,
                key: key.to_string(),
                value: value.to_string(),
            })? {
                log::warn!("settings line {}: unknown key `{key}` ignored", i + 1);
            }
        }
        Ok(())
    }

    /// Returns Ok(false) for unknown keys, Err(()) when the value does not parse.
    fn apply(&mut self, key: &str, value: &str) -> Result<bool, ()> {
        fn num<T: FromStr>(v: &str) -> Result<T, ()> {
            v.parse().map_err(|_| ())
        }
        match key {
            "rows" => self.rows = num(value)?,
            "columns" => self.columns = num(value)?,
            "spawn_column" => self.spawn_column = num(value)?,
            "cell_width" => self.layout.cell_width = num(value)?,
            "cell_height" => self.layout.cell_height = num(value)?,
            "cell_spacing_x" => self.layout.spacing_x = num(value)?,
            "cell_spacing_y" => self.layout.spacing_y = num(value)?,
            "origin_x" => self.layout.origin.x = num(value)?,
            "origin_y" => self.layout.origin.y = num(value)?,
            "min_match" => self.min_match = num(value)?,
            "base_tile_score" => self.base_tile_score = num(value)?,
            "queue_len" => self.queue_len = num(value)?,
            "fall_speed" => self.speeds.fall = num(value)?,
            "boosted_fall_speed" => self.speeds.boosted = num(value)?,
            "single_fall_speed" => self.speeds.single = num(value)?,
            "game_over_fall_speed" => self.speeds.game_over = num(value)?,
            "removal_effect_ms" => self.speeds.removal_effect_ms = num(value)?,
            "catalog" => {
                let colors = value
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(str::parse::<TileColor>)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| ())?;
                self.catalog = TileCatalog::with_colors(colors);
            }
            _ => {
                let Some(color) = key.strip_prefix("weight.") else {
                    return Ok(false);
                };
                let color: TileColor = color.parse().map_err(|_| ())?;
                self.weights.insert(color, num(value)?);
            }
        }
        Ok(true)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.columns == 0 || self.rows < 2 {
            return Err(SettingsError::GridTooSmall {
                columns: self.columns,
                rows: self.rows,
            });
        }
        if self.columns > MAX_GRID_DIM || self.rows > MAX_GRID_DIM {
            return Err(SettingsError::GridTooLarge {
                columns: self.columns,
                rows: self.rows,
                max: MAX_GRID_DIM,
            });
        }
        if self.spawn_column >= self.columns {
            return Err(SettingsError::SpawnColumnOutOfRange {
                column: self.spawn_column,
                columns: self.columns,
            });
        }
        if self.min_match < 2 {
            return Err(SettingsError::MinMatchTooSmall(self.min_match));
        }
        if self.catalog.is_empty() {
            return Err(SettingsError::EmptyCatalog);
        }
        let speeds = [
            ("fall_speed", self.speeds.fall),
            ("boosted_fall_speed", self.speeds.boosted),
            ("single_fall_speed", self.speeds.single),
            ("game_over_fall_speed", self.speeds.game_over),
        ];
        for (name, value) in speeds {
            if value.is_nan() || value <= 0.0 {
                return Err(SettingsError::NonPositiveSpeed { name, value });
            }
        }
        Ok(())
    }

    /// Entry cell of the root tile; an occupied root start after a landing tops the grid out.
    pub fn root_start(&self) -> GridCoord {
        GridCoord::new(i32::from(self.spawn_column), i32::from(self.rows) - 2)
    }

    pub fn child_start(&self) -> GridCoord {
        GridCoord::new(i32::from(self.spawn_column), i32::from(self.rows) - 1)
    }

    pub fn origin(&self) -> WorldPos {
        self.layout.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = GameSettings::default();
        s.validate().unwrap();
        assert_eq!(s.root_start(), GridCoord::new(3, 14));
        assert_eq!(s.child_start(), GridCoord::new(3, 15));
        assert_eq!(s.weights.len(), 5);
    }

    #[test]
    fn apply_str_overrides_known_keys() {
        let mut s = GameSettings::default();
        s.apply_str(
            "# small board\nrows = 10\ncolumns=6\n\nmin_match = 3\nweight.red = 0.5\ncatalog = red, blue\nfrobnicate = 1\n",
        )
        .unwrap();
        assert_eq!((s.rows, s.columns, s.min_match), (10, 6, 3));
        assert_eq!(s.weights.get(&TileColor::Red), Some(&0.5));
        assert_eq!(s.catalog.colors().collect::<Vec<_>>(), vec![TileColor::Red, TileColor::Blue]);
    }

    #[test]
    fn bad_values_report_the_line() {
        let mut s = GameSettings::default();
        let err = s.apply_str("rows = 4\nfall_speed = fast\n").unwrap_err();
        assert!(matches!(err, SettingsError::Parse { line: 2, .. }));
        assert!(s.apply_str("catalog = red, orange").is_err());
        assert!(s.apply_str("no equals sign").is_err());
    }

    #[test]
    fn validate_rejects_impossible_grids() {
        let mut s = GameSettings {
            rows: 1,
            ..GameSettings::default()
        };
        assert!(matches!(s.validate(), Err(SettingsError::GridTooSmall { .. })));
        s.rows = u16::MAX;
        assert!(matches!(s.validate(), Err(SettingsError::GridTooLarge { .. })));
        s.rows = MAX_GRID_DIM;
        s.validate().unwrap();
        s.rows = 16;
        s.spawn_column = 8;
        assert!(matches!(s.validate(), Err(SettingsError::SpawnColumnOutOfRange { .. })));
        s.spawn_column = 0;
        s.min_match = 1;
        assert!(matches!(s.validate(), Err(SettingsError::MinMatchTooSmall(1))));
        s.min_match = 4;
        s.speeds.single = 0.0;
        assert!(matches!(
            s.validate(),
            Err(SettingsError::NonPositiveSpeed { name: "single_fall_speed", .. })
        ));
        s.speeds.single = 6.0;
        s.catalog = TileCatalog::new();
        assert!(matches!(s.validate(), Err(SettingsError::EmptyCatalog)));
    }

    #[test]
    fn oversized_columns_are_rejected_before_any_board_is_built() {
        let mut s = GameSettings::default();
        s.apply_str("columns = 65535\nspawn_column = 0\n").unwrap();
        assert!(matches!(
            s.validate(),
            Err(SettingsError::GridTooLarge { columns: 65535, rows: 16, max: MAX_GRID_DIM })
        ));
    }

    #[test]
    fn example_file_matches_defaults() {
        let mut s = GameSettings::default();
        s.apply_str(include_str!("../settings.example.conf")).unwrap();
        s.validate().unwrap();
        let d = GameSettings::default();
        assert_eq!((s.rows, s.columns, s.spawn_column), (d.rows, d.columns, d.spawn_column));
        assert_eq!(s.speeds, d.speeds);
        assert_eq!(s.weights, d.weights);
        assert_eq!(s.catalog, d.catalog);
    }

    #[test]
    fn missing_file_means_defaults() {
        let s = GameSettings::load(Some(Path::new("/nonexistent/tilecascade.conf"))).unwrap();
        assert_eq!(s.rows, 16);
    }
}
