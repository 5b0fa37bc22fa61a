//! Built-in palettes: tile colours and UI colours as ratatui `Color`s.

use crate::Palette;
use ratatui::style::Color;
use tilecascade::TileColor;

/// One Dark based colours for tiles and chrome.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Tile colours indexed by `TileColor::index`: red, green, blue, yellow, purple.
    pub tiles: [Color; 5],
    /// Playfield background.
    pub bg: Color,
    /// Grid / border.
    pub div_line: Color,
    /// Text (score, labels).
    pub main_fg: Color,
    /// Highlight / titles.
    pub title: Color,
    /// Secondary text and eliminated grids.
    pub inactive_fg: Color,
}

const fn rgb(hex: u32) -> Color {
    Color::Rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

impl Default for Theme {
    fn default() -> Self {
        Self::onedark()
    }
}

impl Theme {
    /// One Dark hex values.
    pub const fn onedark() -> Self {
        Self {
            tiles: [
                rgb(0xE0_6C75), // red
                rgb(0x98_C379), // green
                rgb(0x61_AFEF), // blue
                rgb(0xE5_C07B), // yellow
                rgb(0xC6_78DD), // magenta
            ],
            bg: rgb(0x31_353F),
            div_line: rgb(0x3F_444F),
            main_fg: rgb(0xAB_B2BF),
            title: rgb(0xE5_C07B),
            inactive_fg: rgb(0x5C_6370),
        }
    }

    pub fn for_palette(palette: Palette) -> Self {
        let mut theme = Self::onedark();
        theme.apply_palette(palette);
        theme
    }

    /// Override tile colours for high-contrast or colorblind play.
    pub fn apply_palette(&mut self, palette: Palette) {
        match palette {
            Palette::Normal => {}
            Palette::HighContrast => {
                self.tiles = [
                    rgb(0xFF_0000),
                    rgb(0x00_FF00),
                    rgb(0x00_88FF),
                    rgb(0xFF_FF00),
                    rgb(0xFF_00FF),
                ];
            }
            Palette::Colorblind => {
                // Okabe-Ito style: no red/green pair relies on hue alone
                self.tiles = [
                    rgb(0xCC_3311),
                    rgb(0x00_9988),
                    rgb(0x00_77BB),
                    rgb(0xEE_7733),
                    rgb(0xEE_3377),
                ];
            }
        }
    }

    #[inline]
    pub fn tile_color(&self, color: TileColor) -> Color {
        self.tiles[color.index() % self.tiles.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_splits_channels() {
        assert_eq!(rgb(0x98_C379), Color::Rgb(0x98, 0xC3, 0x79));
    }

    #[test]
    fn palettes_keep_colours_distinct() {
        for palette in [Palette::Normal, Palette::HighContrast, Palette::Colorblind] {
            let theme = Theme::for_palette(palette);
            for (i, a) in TileColor::ALL.iter().enumerate() {
                for b in &TileColor::ALL[i + 1..] {
                    assert_ne!(theme.tile_color(*a), theme.tile_color(*b), "{palette:?}");
                }
            }
        }
    }
}
