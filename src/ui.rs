//! Layout and drawing: grids side by side, next pair, sidebar, pause and result popups.

use crate::app::Screen;
use crate::theme::Theme;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Widget};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};
use tilecascade::tile::{SpriteKey, TileState};
use tilecascade::{Controller, GameMode, GameSettings, GridCoord, GridEngine, GridId, MatchOutcome, Session};

/// Each grid cell is two terminal columns wide and one row high.
const CELL_WIDTH: u16 = 2;
const GRID_GAP: u16 = 1;
const SIDEBAR_WIDTH: u16 = 26;

/// What the frame needs from the app.
pub struct View<'a> {
    pub session: &'a Session,
    pub settings: &'a GameSettings,
    pub theme: &'a Theme,
    pub screen: Screen,
    pub paused: bool,
    pub best_score: u64,
    pub no_animation: bool,
}

struct Fade {
    cells: BTreeSet<GridCoord>,
    effect: Effect,
    last_process: Instant,
}

/// Running clear fades, one per grid.
#[derive(Default)]
pub struct Fades {
    active: BTreeMap<GridId, Fade>,
}

impl Fades {
    pub fn clear(&mut self) {
        self.active.clear();
    }
}

/// Grid panel size in terminal cells: border plus cells.
fn panel_size(settings: &GameSettings) -> (u16, u16) {
    (
        settings.columns.saturating_mul(CELL_WIDTH).saturating_add(2),
        settings.rows.saturating_add(2),
    )
}

fn grid_label(grid: &GridEngine) -> String {
    match grid.controller() {
        Controller::Player => "You".to_string(),
        Controller::Ai => format!("CPU {}", grid.id().0),
    }
}

/// Terminal cell of a grid coordinate, if it is on screen.
fn cell_origin(inner: Rect, rows: i32, c: GridCoord) -> Option<(u16, u16)> {
    if c.row < 0 || c.row >= rows || c.col < 0 {
        return None;
    }
    let x = inner.x + c.col as u16 * CELL_WIDTH;
    let y = inner.y + (rows - 1 - c.row) as u16;
    (x + CELL_WIDTH <= inner.right() && y < inner.bottom()).then_some((x, y))
}

/// Draw the current screen, with pause overlay or result popup on top.
pub fn draw(frame: &mut Frame, view: &View<'_>, fades: &mut Fades, now: Instant) {
    let area = frame.area();
    draw_game(frame, view, fades, area, now);
    match view.screen {
        Screen::Playing if view.paused => draw_pause_overlay(frame, view.theme, area),
        Screen::Playing => {}
        Screen::Result => draw_result(frame, view, area),
    }
}

/// Grids left to right, sidebar on the right; centred in the full area.
fn draw_game(frame: &mut Frame, view: &View<'_>, fades: &mut Fades, area: Rect, now: Instant) {
    let (pw, ph) = panel_size(view.settings);
    let grids: Vec<&GridEngine> = view.session.grids().collect();

    let mut constraints = vec![Constraint::Fill(1)];
    for _ in &grids {
        constraints.push(Constraint::Length(pw));
        constraints.push(Constraint::Length(GRID_GAP));
    }
    constraints.push(Constraint::Length(SIDEBAR_WIDTH));
    constraints.push(Constraint::Fill(1));
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    let vert = |rect: Rect, height: u16| {
        Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Fill(1), Constraint::Length(height), Constraint::Fill(1)])
            .split(rect)[1]
    };

    for (i, grid) in grids.iter().enumerate() {
        let panel = vert(columns[1 + 2 * i], ph);
        let inner = draw_grid(frame, view, grid, panel);
        if view.no_animation {
            continue;
        }
        apply_clear_fade(frame, view, grid, inner, fades, now);
    }
    fades
        .active
        .retain(|id, _| view.session.grid(*id).is_some());

    let sidebar = vert(columns[1 + 2 * grids.len()], ph.max(14));
    draw_sidebar(frame, view, sidebar);
}

/// Returns the cell area inside the border.
fn draw_grid(frame: &mut Frame, view: &View<'_>, grid: &GridEngine, area: Rect) -> Rect {
    let theme = view.theme;
    let mut title = format!(" {}  {} ", grid_label(grid), grid.score());
    if grid.is_game_over() {
        title.push_str("KO ");
    }
    let title_style = if grid.is_game_over() {
        Style::default().fg(theme.inactive_fg)
    } else {
        Style::default().fg(theme.title)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .style(Style::default().bg(theme.bg))
        .title(Span::styled(title, title_style))
        .title_bottom(next_pair_line(view, grid));
    let inner = block.inner(area);
    block.render(area, frame.buffer_mut());

    let rows = grid.board().rows();
    let buf = frame.buffer_mut();
    for tile in grid.tiles() {
        if matches!(tile.state(), TileState::Waiting) {
            continue;
        }
        let Some(at) = tile.grid_position().or(tile.temporary_position()) else {
            continue;
        };
        let Some((x, y)) = cell_origin(inner, rows, at) else {
            continue;
        };
        let fg = if grid.is_game_over() {
            theme.inactive_fg
        } else {
            theme.tile_color(tile.color())
        };
        let glyph = view
            .settings
            .catalog
            .sprite(tile.color(), tile.sprite())
            .unwrap_or("██");
        let style = Style::default().fg(fg).bg(theme.bg);
        for (dx, ch) in glyph.chars().take(CELL_WIDTH as usize).enumerate() {
            buf[(x + dx as u16, y)].set_char(ch).set_style(style);
        }
    }
    inner
}

/// "Next" and the first queued pair, root then child.
fn next_pair_line(view: &View<'_>, grid: &GridEngine) -> Line<'static> {
    let theme = view.theme;
    let mut spans = vec![Span::styled(" Next ", Style::default().fg(theme.main_fg))];
    if let Some((root, child)) = grid.waiting_colors().next() {
        for (color, key) in [(root, SpriteKey::Root), (child, SpriteKey::Default)] {
            let glyph = view.settings.catalog.sprite(color, key).unwrap_or("██");
            spans.push(Span::styled(
                glyph.to_string(),
                Style::default().fg(theme.tile_color(color)).bg(theme.bg),
            ));
        }
        spans.push(Span::raw(" "));
    }
    Line::from(spans)
}

/// Fade matched tiles to background (TachyonFX); restarted when a new group matches.
fn apply_clear_fade(
    frame: &mut Frame,
    view: &View<'_>,
    grid: &GridEngine,
    inner: Rect,
    fades: &mut Fades,
    now: Instant,
) {
    let cells: BTreeSet<GridCoord> = grid
        .tiles()
        .filter(|t| matches!(t.state(), TileState::Matched { .. }))
        .filter_map(|t| t.grid_position())
        .collect();
    if cells.is_empty() {
        fades.active.remove(&grid.id());
        return;
    }

    let stale = fades
        .active
        .get(&grid.id())
        .is_none_or(|fade| fade.cells != cells);
    if stale {
        let rows = grid.board().rows();
        let positions: HashSet<(u16, u16)> = cells
            .iter()
            .filter_map(|c| cell_origin(inner, rows, *c))
            .flat_map(|(x, y)| (0..CELL_WIDTH).map(move |dx| (x + dx, y)))
            .collect();
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| {
            positions.contains(&(pos.x, pos.y))
        }));
        let bg = view.theme.bg;
        let effect = fx::fade_to(
            bg,
            bg,
            (view.settings.speeds.removal_effect_ms, Interpolation::Linear),
        )
        .with_filter(filter)
        .with_area(inner);
        fades.active.insert(
            grid.id(),
            Fade {
                cells,
                effect,
                last_process: now,
            },
        );
    }

    if let Some(fade) = fades.active.get_mut(&grid.id()) {
        let delta = now.saturating_duration_since(fade.last_process);
        let delta_ms = delta.as_millis().min(u32::MAX as u128) as u32;
        fade.last_process = now;
        if !fade.effect.done() {
            frame.render_effect(&mut fade.effect, inner, TfxDuration::from_millis(delta_ms));
        }
    }
}

fn draw_sidebar(frame: &mut Frame, view: &View<'_>, area: Rect) {
    let theme = view.theme;
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let dim_style = Style::default().fg(theme.inactive_fg);
    let border_style = Style::default().fg(theme.div_line).bg(theme.bg);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),   // Match
            Constraint::Length(1), // gap
            Constraint::Length(8), // Controls
        ])
        .split(area);

    // --- Match (own border): mode, best, one line per grid ---
    let mode = match view.session.mode() {
        GameMode::SinglePlayer => "Single",
        GameMode::Versus => "Versus",
    };
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Mode: ", title_style),
            Span::styled(mode, fg_style),
        ]),
        Line::from(vec![
            Span::styled("Best: ", title_style),
            Span::styled(view.best_score.to_string(), fg_style),
        ]),
        Line::from(vec![
            Span::styled("Match ", title_style),
            Span::styled(
                format!("{}", view.settings.min_match),
                fg_style,
            ),
        ]),
        Line::from(""),
    ];
    for grid in view.session.grids() {
        let style = if grid.is_game_over() { dim_style } else { fg_style };
        lines.push(Line::from(vec![
            Span::styled(format!("{:<7}", grid_label(grid)), title_style),
            Span::styled(grid.score().to_string(), style),
        ]));
    }
    let match_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(Span::styled(" Tilecascade ", title_style));
    Paragraph::new(lines)
        .block(match_block)
        .render(chunks[0], frame.buffer_mut());

    // --- Controls ---
    let controls = vec![
        Line::from(Span::styled("←/→ h/l  Shift", fg_style)),
        Line::from(Span::styled("↑ k Spc  Rotate", fg_style)),
        Line::from(Span::styled("↓ j      Faster", fg_style)),
        Line::from(Span::styled("P        Pause", fg_style)),
        Line::from(Span::styled("Q Esc    Quit", fg_style)),
    ];
    let controls_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(Span::styled(" Keys ", title_style));
    Paragraph::new(controls)
        .block(controls_block)
        .render(chunks[2], frame.buffer_mut());
}

fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let popup = centered_popup(area, 28, 5);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " P: Resume    Q: Quit ",
            Style::default().fg(theme.main_fg),
        )),
    ];
    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
            .style(Style::default().bg(theme.bg)),
    );
    p.render(popup, frame.buffer_mut());
}

fn draw_result(frame: &mut Frame, view: &View<'_>, area: Rect) {
    let theme = view.theme;
    let Some(outcome) = view.session.outcome() else {
        return;
    };
    let (title, title_style) = match outcome {
        MatchOutcome::Won { .. } => (" You Win! ", Style::default().fg(Color::Black).bg(Color::Green)),
        MatchOutcome::Lost { .. } => (" You Lose ", Style::default().fg(Color::White).bg(Color::Red)),
        MatchOutcome::Finished { .. } => (" Game Over ", Style::default().fg(Color::White).bg(Color::Red)),
        MatchOutcome::Decided { .. } => (" Match Over ", Style::default().fg(Color::White).bg(Color::Red)),
    };
    let mut lines: Vec<Line> = vec![
        Line::from(""),
        Line::from(Span::styled(title, title_style)),
        Line::from(""),
    ];
    match outcome {
        MatchOutcome::Finished { score, .. }
        | MatchOutcome::Won { score }
        | MatchOutcome::Lost { score } => {
            lines.push(Line::from(Span::styled(
                format!(" Score: {score} "),
                Style::default().fg(theme.main_fg),
            )));
        }
        MatchOutcome::Decided { winner } => {
            let name = winner
                .and_then(|id| view.session.grid(id))
                .map_or_else(|| "nobody".to_string(), grid_label);
            lines.push(Line::from(Span::styled(
                format!(" Winner: {name} "),
                Style::default().fg(theme.main_fg),
            )));
        }
    }
    lines.push(Line::from(Span::styled(
        format!(" Best: {} ", view.best_score),
        Style::default().fg(theme.main_fg),
    )));
    if matches!(outcome, MatchOutcome::Finished { new_best: true, .. }) {
        lines.push(Line::from(Span::styled(
            " New record! ",
            Style::default().fg(Color::Yellow).bold(),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        " R: Restart    Q: Quit ",
        Style::default().fg(theme.main_fg),
    )));
    lines.push(Line::from(""));

    let height = lines.len() as u16 + 2;
    let popup = centered_popup(area, 32, height);
    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
            .style(Style::default().bg(theme.bg))
            .title(Span::styled(" Tilecascade ", theme.title)),
    );
    p.render(popup, frame.buffer_mut());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_count_up_from_the_bottom() {
        let inner = Rect::new(1, 1, 16, 16);
        assert_eq!(cell_origin(inner, 16, GridCoord::new(0, 0)), Some((1, 16)));
        assert_eq!(cell_origin(inner, 16, GridCoord::new(7, 15)), Some((15, 1)));
        assert_eq!(cell_origin(inner, 16, GridCoord::new(0, 16)), None);
        assert_eq!(cell_origin(inner, 16, GridCoord::new(0, -1)), None);
    }

    #[test]
    fn clipped_cells_are_skipped() {
        let inner = Rect::new(0, 0, 5, 3);
        assert_eq!(cell_origin(inner, 3, GridCoord::new(1, 0)), Some((2, 2)));
        assert_eq!(cell_origin(inner, 3, GridCoord::new(2, 0)), None);
    }

    #[test]
    fn panel_fits_border_and_cells() {
        let settings = GameSettings::default();
        assert_eq!(panel_size(&settings), (8 * 2 + 2, 16 + 2));
        let wide = GameSettings {
            columns: u16::MAX,
            ..GameSettings::default()
        };
        assert_eq!(panel_size(&wide).0, u16::MAX);
    }
}
