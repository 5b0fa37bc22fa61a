//! Tiles: colour catalog, sprite keys and the per-tile lifecycle state machine.
//!
//! A tile owns its own transitions. The grid engine only delivers [`Signal`]s;
//! whatever the tile's current state does not listen for is ignored. Reactions
//! the engine must act on come back as [`TileEffect`]s.

use crate::board::Board;
use crate::geometry::{ConnectionMask, Direction, GridCoord};
use crate::matching::compute_connections;
use crate::settings::FallSpeeds;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unique (per grid) tile identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u64);

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TileColor {
    Red,
    Green,
    Blue,
    Yellow,
    Purple,
}

impl TileColor {
    pub const ALL: [Self; 5] = [Self::Red, Self::Green, Self::Blue, Self::Yellow, Self::Purple];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Yellow => "yellow",
            Self::Purple => "purple",
        }
    }

    /// Palette slot used by the theme (0..5).
    pub const fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
            Self::Yellow => 3,
            Self::Purple => 4,
        }
    }
}

impl fmt::Display for TileColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tile colour: {0}")]
pub struct UnknownColor(pub String);

impl FromStr for TileColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownColor(s.to_string()))
    }
}

/// Which sprite a tile should currently show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpriteKey {
    Default,
    Root,
    Connected(ConnectionMask),
}

/// Sprite set for one colour: default, root marker, and one sprite per connection mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSprites {
    pub default: String,
    pub root: String,
    pub connected: [String; ConnectionMask::COMBINATIONS],
}

impl TileSprites {
    /// Two-column terminal glyphs: half blocks open towards unconnected sides.
    pub fn terminal() -> Self {
        let connected = std::array::from_fn(|bits| {
            let mask = ConnectionMask::from_bits(bits as u8);
            let left = if mask.contains(Direction::Left) { '█' } else { '▐' };
            let right = if mask.contains(Direction::Right) { '█' } else { '▌' };
            format!("{left}{right}")
        });
        Self {
            default: "▐▌".to_string(),
            root: "▓▓".to_string(),
            connected,
        }
    }

    pub fn get(&self, key: SpriteKey) -> &str {
        match key {
            SpriteKey::Default => &self.default,
            SpriteKey::Root => &self.root,
            SpriteKey::Connected(mask) => &self.connected[mask.bits() as usize],
        }
    }
}

/// Colour → sprite set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCatalog {
    entries: BTreeMap<TileColor, TileSprites>,
}

impl TileCatalog {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Every colour with terminal glyphs.
    pub fn terminal_default() -> Self {
        Self::with_colors(TileColor::ALL)
    }

    pub fn with_colors(colors: impl IntoIterator<Item = TileColor>) -> Self {
        let mut catalog = Self::new();
        for color in colors {
            catalog.insert(color, TileSprites::terminal());
        }
        catalog
    }

    pub fn insert(&mut self, color: TileColor, sprites: TileSprites) {
        self.entries.insert(color, sprites);
    }

    pub fn contains(&self, color: TileColor) -> bool {
        self.entries.contains_key(&color)
    }

    pub fn colors(&self) -> impl Iterator<Item = TileColor> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sprite(&self, color: TileColor, key: SpriteKey) -> Option<&str> {
        self.entries.get(&color).map(|s| s.get(key))
    }
}

impl Default for TileCatalog {
    fn default() -> Self {
        Self::terminal_default()
    }
}

/// Which arrival signal a single fall reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallKind {
    /// Half of a spawned pair whose partner already landed.
    Pair,
    /// Re-fall after a cascade, toward a target chosen by the engine.
    Drop,
}

/// Lifecycle state. Data a state needs lives in its variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TileState {
    Waiting,
    FallingRoot { boosted: bool },
    FallingChild { offset: Direction },
    FallingSingle { kind: FallKind, target: Option<GridCoord> },
    PlacedOnGrid,
    Matched { remaining_ms: u32 },
    GameOver,
}

impl TileState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::FallingRoot { .. } => "falling-root",
            Self::FallingChild { .. } => "falling-child",
            Self::FallingSingle { .. } => "falling-single",
            Self::PlacedOnGrid => "placed",
            Self::Matched { .. } => "matched",
            Self::GameOver => "game-over",
        }
    }

    pub const fn is_falling(&self) -> bool {
        matches!(
            self,
            Self::FallingRoot { .. } | Self::FallingChild { .. } | Self::FallingSingle { .. }
        )
    }
}

/// Horizontal shift direction for the controlled pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Left,
    Right,
}

impl Shift {
    pub const fn dcol(self) -> i32 {
        match self {
            Self::Left => -1,
            Self::Right => 1,
        }
    }
}

/// What a tile hears. Each state listens to a subset.
#[derive(Debug, Clone, Copy)]
pub enum Signal<'a> {
    PlacedAtStart,
    Tick { dt_secs: f32 },
    ShiftColumn(Shift),
    Rotate,
    Accelerate(bool),
    /// Re-derive position from the leading root (after it shifted).
    FollowRoot,
    PartnerLanded,
    /// The engine wrote this tile into the cell matrix.
    Committed(GridCoord),
    TilesAdded(&'a BTreeSet<GridCoord>),
    TilesMatched(&'a BTreeSet<GridCoord>),
    TilesDropped(&'a BTreeMap<GridCoord, GridCoord>),
    GridGameOver,
}

/// Reactions for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEffect {
    Arrived(GridCoord),
    DroppedArrived(GridCoord),
    ShouldFall(GridCoord),
    Shifted,
    VisualChanged,
    Destroyed,
}

/// The other half of the active pair, as seen by this tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartnerView {
    pub col: i32,
    pub height: f32,
    pub state: TileState,
}

/// Read-only world a tile reacts against.
#[derive(Debug, Clone, Copy)]
pub struct TileContext<'a> {
    pub board: &'a Board,
    pub speeds: &'a FallSpeeds,
    pub partner: Option<PartnerView>,
}

/// Row a continuous height belongs to (a tile is in the cell it still touches above).
#[inline]
fn row_of(height: f32) -> i32 {
    height.ceil() as i32
}

/// Rows a tile at `height` overlaps.
#[inline]
fn overlapped_rows(height: f32) -> [i32; 2] {
    [height.floor() as i32, height.ceil() as i32]
}

fn cells_free(board: &Board, col: i32, height: f32) -> bool {
    overlapped_rows(height)
        .into_iter()
        .all(|row| board.is_free(GridCoord::new(col, row)))
}

#[derive(Debug, Clone)]
pub struct Tile {
    id: TileId,
    color: TileColor,
    is_root: bool,
    partner: Option<TileId>,
    state: TileState,
    grid_position: Option<GridCoord>,
    temporary_position: Option<GridCoord>,
    /// Continuous row while moving; equals the cell row at rest.
    height: f32,
    connections: ConnectionMask,
    fall_target: Option<GridCoord>,
}

impl Tile {
    /// New tile waiting off-grid; `start` is the cell it enters the grid at.
    pub fn new(id: TileId, color: TileColor, is_root: bool, start: GridCoord) -> Self {
        Self {
            id,
            color,
            is_root,
            partner: None,
            state: TileState::Waiting,
            grid_position: None,
            temporary_position: Some(start),
            height: start.row as f32,
            connections: ConnectionMask::NONE,
            fall_target: None,
        }
    }

    /// Tile that has just landed at `at` and waits for the engine to commit it.
    pub fn landed(id: TileId, color: TileColor, at: GridCoord) -> Self {
        let mut tile = Self::new(id, color, false, at);
        tile.state = TileState::PlacedOnGrid;
        tile
    }

    pub fn set_partner(&mut self, partner: TileId) {
        self.partner = Some(partner);
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn color(&self) -> TileColor {
        self.color
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn partner(&self) -> Option<TileId> {
        self.partner
    }

    pub fn state(&self) -> &TileState {
        &self.state
    }

    pub fn grid_position(&self) -> Option<GridCoord> {
        self.grid_position
    }

    pub fn temporary_position(&self) -> Option<GridCoord> {
        self.temporary_position
    }

    pub fn connections(&self) -> ConnectionMask {
        self.connections
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Column the tile is drawn in, whichever position is current.
    pub fn column(&self) -> Option<i32> {
        self.grid_position
            .or(self.temporary_position)
            .map(|c| c.col)
    }

    /// Where the tile is heading while falling, if known.
    pub fn fall_target(&self) -> Option<GridCoord> {
        self.fall_target
    }

    pub fn sprite(&self) -> SpriteKey {
        match self.state {
            TileState::FallingRoot { .. } => SpriteKey::Root,
            TileState::PlacedOnGrid if self.grid_position.is_some() => {
                SpriteKey::Connected(self.connections)
            }
            _ => SpriteKey::Default,
        }
    }

    pub fn view(&self) -> PartnerView {
        PartnerView {
            col: self.column().unwrap_or(0),
            height: self.height,
            state: self.state,
        }
    }

    /// Single dispatch over (state, signal).
    pub fn handle(&mut self, signal: Signal<'_>, ctx: &TileContext<'_>) -> Vec<TileEffect> {
        if matches!(signal, Signal::GridGameOver) {
            return self.enter_game_over();
        }
        match self.state {
            TileState::Waiting => self.on_waiting(signal),
            TileState::FallingRoot { boosted } => self.on_falling_root(signal, boosted, ctx),
            TileState::FallingChild { offset } => self.on_falling_child(signal, offset, ctx),
            TileState::FallingSingle { kind, target } => {
                self.on_falling_single(signal, kind, target, ctx)
            }
            TileState::PlacedOnGrid => self.on_placed(signal, ctx),
            TileState::Matched { remaining_ms } => self.on_matched(signal, remaining_ms),
            TileState::GameOver => self.on_game_over(signal, ctx),
        }
    }

    fn on_waiting(&mut self, signal: Signal<'_>) -> Vec<TileEffect> {
        if !matches!(signal, Signal::PlacedAtStart) {
            return Vec::new();
        }
        if let Some(start) = self.temporary_position {
            self.height = start.row as f32;
        }
        self.state = if self.is_root {
            TileState::FallingRoot { boosted: false }
        } else {
            TileState::FallingChild {
                offset: Direction::Up,
            }
        };
        vec![TileEffect::VisualChanged]
    }

    fn on_falling_root(
        &mut self,
        signal: Signal<'_>,
        boosted: bool,
        ctx: &TileContext<'_>,
    ) -> Vec<TileEffect> {
        match signal {
            Signal::Accelerate(on) => {
                self.state = TileState::FallingRoot { boosted: on };
                Vec::new()
            }
            Signal::ShiftColumn(shift) => self.try_shift(shift, ctx),
            Signal::PartnerLanded => self.enter_single_fall(FallKind::Pair, None, ctx),
            Signal::Tick { dt_secs } => {
                let speed = if boosted {
                    ctx.speeds.boosted
                } else {
                    ctx.speeds.fall
                };
                self.fall_target = self.root_target(ctx);
                self.advance(dt_secs * speed);
                self.try_land(FallKind::Pair)
            }
            _ => Vec::new(),
        }
    }

    /// Lowest free cell in the root's column, one higher when its child hangs
    /// directly below it in the same column.
    fn root_target(&self, ctx: &TileContext<'_>) -> Option<GridCoord> {
        let temp = self.temporary_position?;
        let lowest = ctx.board.lowest_free_in_column(temp.col, row_of(self.height))?;
        let child_below = ctx.partner.is_some_and(|p| {
            matches!(p.state, TileState::FallingChild { .. })
                && p.col == temp.col
                && p.height < self.height
        });
        Some(if child_below {
            lowest.step(Direction::Up)
        } else {
            lowest
        })
    }

    fn try_shift(&mut self, shift: Shift, ctx: &TileContext<'_>) -> Vec<TileEffect> {
        let Some(temp) = self.temporary_position else {
            return Vec::new();
        };
        let col = temp.col + shift.dcol();
        if !cells_free(ctx.board, col, self.height) {
            return Vec::new();
        }
        if let Some(p) = ctx.partner {
            if matches!(p.state, TileState::FallingChild { .. })
                && !cells_free(ctx.board, p.col + shift.dcol(), p.height)
            {
                return Vec::new();
            }
        }
        self.temporary_position = Some(GridCoord::new(col, row_of(self.height)));
        self.fall_target = self.root_target(ctx);
        vec![TileEffect::Shifted]
    }

    fn on_falling_child(
        &mut self,
        signal: Signal<'_>,
        offset: Direction,
        ctx: &TileContext<'_>,
    ) -> Vec<TileEffect> {
        match signal {
            Signal::Rotate => self.try_rotate(offset, ctx),
            Signal::FollowRoot => {
                self.follow_root(offset, ctx);
                Vec::new()
            }
            Signal::PartnerLanded => self.enter_single_fall(FallKind::Pair, None, ctx),
            Signal::Tick { .. } => {
                self.follow_root(offset, ctx);
                self.fall_target = self.child_target(ctx);
                self.try_land(FallKind::Pair)
            }
            _ => Vec::new(),
        }
    }

    fn follow_root(&mut self, offset: Direction, ctx: &TileContext<'_>) {
        let Some(root) = ctx.partner else {
            return;
        };
        let (dc, dr) = offset.offset();
        self.height = root.height + dr as f32;
        self.temporary_position = Some(GridCoord::new(root.col + dc, row_of(self.height)));
    }

    /// Lowest free cell in the child's column, one higher when it sits above the
    /// root in the same column.
    fn child_target(&self, ctx: &TileContext<'_>) -> Option<GridCoord> {
        let temp = self.temporary_position?;
        let lowest = ctx.board.lowest_free_in_column(temp.col, row_of(self.height))?;
        let above_root = ctx
            .partner
            .is_some_and(|p| p.col == temp.col && p.height < self.height && p.state.is_falling());
        Some(if above_root {
            lowest.step(Direction::Up)
        } else {
            lowest
        })
    }

    /// Next clockwise offset whose cells are in bounds and free; the current offset
    /// is kept when none is.
    fn try_rotate(&mut self, offset: Direction, ctx: &TileContext<'_>) -> Vec<TileEffect> {
        let Some(root) = ctx.partner else {
            return Vec::new();
        };
        let mut candidate = offset.clockwise();
        while candidate != offset {
            let (dc, dr) = candidate.offset();
            if cells_free(ctx.board, root.col + dc, root.height + dr as f32) {
                self.state = TileState::FallingChild { offset: candidate };
                self.follow_root(candidate, ctx);
                self.fall_target = self.child_target(ctx);
                return vec![TileEffect::VisualChanged];
            }
            candidate = candidate.clockwise();
        }
        Vec::new()
    }

    fn enter_single_fall(
        &mut self,
        kind: FallKind,
        target: Option<GridCoord>,
        ctx: &TileContext<'_>,
    ) -> Vec<TileEffect> {
        self.state = TileState::FallingSingle { kind, target };
        let mut effects = vec![TileEffect::VisualChanged];
        self.fall_target = target.or_else(|| self.single_target(ctx));
        effects.extend(self.try_land(kind));
        effects
    }

    fn single_target(&self, ctx: &TileContext<'_>) -> Option<GridCoord> {
        let temp = self.temporary_position?;
        ctx.board
            .lowest_free_in_column(temp.col, row_of(self.height))
    }

    fn on_falling_single(
        &mut self,
        signal: Signal<'_>,
        kind: FallKind,
        target: Option<GridCoord>,
        ctx: &TileContext<'_>,
    ) -> Vec<TileEffect> {
        let Signal::Tick { dt_secs } = signal else {
            return Vec::new();
        };
        self.fall_target = target.or_else(|| self.single_target(ctx));
        self.advance(dt_secs * ctx.speeds.single);
        self.try_land(kind)
    }

    fn advance(&mut self, distance: f32) {
        self.height -= distance.max(0.0);
        if let Some(temp) = self.temporary_position {
            self.temporary_position = Some(GridCoord::new(temp.col, row_of(self.height)));
        }
    }

    /// Lands when the tile reached its target. A tile with nowhere to go lands
    /// where it is; the engine reads that as the grid topping out.
    fn try_land(&mut self, kind: FallKind) -> Vec<TileEffect> {
        let Some(temp) = self.temporary_position else {
            return Vec::new();
        };
        let at = match self.fall_target {
            Some(target) if self.height <= target.row as f32 => target,
            Some(_) => return Vec::new(),
            None => GridCoord::new(temp.col, row_of(self.height)),
        };
        self.height = at.row as f32;
        self.temporary_position = Some(at);
        self.fall_target = None;
        self.state = TileState::PlacedOnGrid;
        vec![match kind {
            FallKind::Pair => TileEffect::Arrived(at),
            FallKind::Drop => TileEffect::DroppedArrived(at),
        }]
    }

    fn on_placed(&mut self, signal: Signal<'_>, ctx: &TileContext<'_>) -> Vec<TileEffect> {
        match signal {
            Signal::Committed(at) => {
                self.grid_position = Some(at);
                self.temporary_position = None;
                self.height = at.row as f32;
                Vec::new()
            }
            Signal::TilesAdded(changed) => {
                let Some(at) = self.grid_position else {
                    return Vec::new();
                };
                if self.touches(at, |c| changed.contains(&c)) {
                    self.refresh_connections(at, ctx)
                } else {
                    Vec::new()
                }
            }
            Signal::TilesMatched(matched) => {
                let Some(at) = self.grid_position else {
                    return Vec::new();
                };
                if matched.contains(&at) {
                    self.state = TileState::Matched {
                        remaining_ms: ctx.speeds.removal_effect_ms,
                    };
                    return vec![TileEffect::VisualChanged];
                }
                let mut effects = Vec::new();
                if self.touches(at, |c| matched.contains(&c)) {
                    effects.extend(self.refresh_connections(at, ctx));
                }
                if matched.contains(&at.step(Direction::Down)) {
                    effects.push(TileEffect::ShouldFall(at));
                }
                effects
            }
            Signal::TilesDropped(moves) => {
                let Some(at) = self.grid_position else {
                    return Vec::new();
                };
                if let Some(target) = moves.get(&at).copied() {
                    self.grid_position = None;
                    self.temporary_position = Some(at);
                    self.connections = ConnectionMask::NONE;
                    return self.enter_single_fall(FallKind::Drop, Some(target), ctx);
                }
                let moved = |c: GridCoord| moves.contains_key(&c) || moves.values().any(|t| *t == c);
                if Direction::ALL.into_iter().any(|d| moved(at.step(d))) {
                    self.refresh_connections(at, ctx)
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    fn touches(&self, at: GridCoord, changed: impl Fn(GridCoord) -> bool) -> bool {
        changed(at) || Direction::ALL.into_iter().any(|d| changed(at.step(d)))
    }

    fn refresh_connections(&mut self, at: GridCoord, ctx: &TileContext<'_>) -> Vec<TileEffect> {
        let mask = compute_connections(ctx.board, at, self.color);
        if mask == self.connections {
            return Vec::new();
        }
        self.connections = mask;
        vec![TileEffect::VisualChanged]
    }

    fn on_matched(&mut self, signal: Signal<'_>, remaining_ms: u32) -> Vec<TileEffect> {
        let Signal::Tick { dt_secs } = signal else {
            return Vec::new();
        };
        if remaining_ms == 0 {
            return vec![TileEffect::Destroyed];
        }
        let elapsed = (dt_secs.max(0.0) * 1000.0).round() as u32;
        let remaining_ms = remaining_ms.saturating_sub(elapsed);
        self.state = TileState::Matched { remaining_ms };
        if remaining_ms == 0 {
            vec![TileEffect::Destroyed]
        } else {
            Vec::new()
        }
    }

    fn enter_game_over(&mut self) -> Vec<TileEffect> {
        if matches!(self.state, TileState::GameOver) {
            return Vec::new();
        }
        if let Some(at) = self.grid_position.take() {
            self.temporary_position = Some(at);
        }
        self.fall_target = None;
        self.state = TileState::GameOver;
        vec![TileEffect::VisualChanged]
    }

    /// Falls out of the grid and reports destruction once past the bottom edge.
    fn on_game_over(&mut self, signal: Signal<'_>, ctx: &TileContext<'_>) -> Vec<TileEffect> {
        let Signal::Tick { dt_secs } = signal else {
            return Vec::new();
        };
        self.advance(dt_secs * ctx.speeds.game_over);
        if self.height < -1.0 {
            vec![TileEffect::Destroyed]
        } else {
            Vec::new()
        }
    }
}
