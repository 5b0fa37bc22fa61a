//! Grid phase engine: one grid's cells, tiles, waiting queue and settling loop.
//!
//! A cycle runs spawn → fall → commit → match → cascade → commit → ... until a
//! commit produces no match, then the next waiting pair is activated. Each phase
//! waits on a pending set of tile ids that empties as tiles report back.

use crate::board::Board;
use crate::events::{ChangeReason, GridEvent, GridId};
use crate::geometry::{ConnectionMask, Direction, GridCoord};
use crate::matching::{ConnectionSource, find_matches, resolve_drop_targets};
use crate::settings::{GameSettings, SettingsError};
use crate::spawn::SpawnTable;
use crate::tile::{Shift, Signal, Tile, TileColor, TileContext, TileEffect, TileId, TileState};
use rand::prelude::*;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Who drives a grid's falling pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Player,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridStatus {
    Running,
    GameOver,
}

/// Phase whose pending set can be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Falling,
    Matching,
    Dropping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Rotate,
    ShiftColumn(Shift),
    Accelerate(bool),
}

/// Two pre-spawned tiles; the root leads, the child starts above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitingPair {
    pub root: TileId,
    pub child: TileId,
}

#[derive(Debug)]
pub struct GridEngine {
    id: GridId,
    settings: GameSettings,
    board: Board,
    tiles: BTreeMap<TileId, Tile>,
    next_tile: u64,
    queue: VecDeque<WaitingPair>,
    active: Option<WaitingPair>,
    falling: BTreeSet<TileId>,
    matching: BTreeSet<TileId>,
    dropping: BTreeSet<TileId>,
    /// Landed, not yet committed.
    arrivals: BTreeMap<GridCoord, TileId>,
    should_fall: Vec<GridCoord>,
    controller: Controller,
    input_enabled: bool,
    /// Accelerate as last requested; applied to every new root.
    accelerate: bool,
    status: GridStatus,
    score: u64,
    activations: u64,
    rng: StdRng,
    spawn: SpawnTable,
    outbox: Vec<GridEvent>,
}

impl GridEngine {
    pub fn new(
        id: GridId,
        settings: &GameSettings,
        controller: Controller,
        seed: u64,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        let mut engine = Self {
            id,
            board: Board::new(settings.columns, settings.rows, settings.layout),
            spawn: SpawnTable::load(&settings.catalog, &settings.weights),
            settings: settings.clone(),
            tiles: BTreeMap::new(),
            next_tile: 0,
            queue: VecDeque::new(),
            active: None,
            falling: BTreeSet::new(),
            matching: BTreeSet::new(),
            dropping: BTreeSet::new(),
            arrivals: BTreeMap::new(),
            should_fall: Vec::new(),
            controller,
            input_enabled: false,
            accelerate: false,
            status: GridStatus::Running,
            score: 0,
            activations: 0,
            rng: StdRng::seed_from_u64(seed),
            outbox: Vec::new(),
        };
        engine.refill_queue();
        log::debug!("{id}: created {}x{} ({controller:?})", settings.columns, settings.rows);
        Ok(engine)
    }

    pub fn id(&self) -> GridId {
        self.id
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(&id)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn controller(&self) -> Controller {
        self.controller
    }

    pub fn set_controller(&mut self, controller: Controller) {
        self.controller = controller;
    }

    pub fn status(&self) -> GridStatus {
        self.status
    }

    pub fn is_game_over(&self) -> bool {
        self.status == GridStatus::GameOver
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Pairs activated so far.
    pub fn activations(&self) -> u64 {
        self.activations
    }

    pub fn active_pair(&self) -> Option<WaitingPair> {
        self.active
    }

    /// Colours of the queued pairs, front first, as (root, child).
    pub fn waiting_colors(&self) -> impl Iterator<Item = (TileColor, TileColor)> + '_ {
        self.queue.iter().filter_map(|p| {
            Some((self.tiles.get(&p.root)?.color(), self.tiles.get(&p.child)?.color()))
        })
    }

    /// Tiles blocking a phase.
    pub fn pending(&self, phase: Phase) -> &BTreeSet<TileId> {
        match phase {
            Phase::Falling => &self.falling,
            Phase::Matching => &self.matching,
            Phase::Dropping => &self.dropping,
        }
    }

    /// Nothing in flight, nothing settling.
    pub fn is_idle(&self) -> bool {
        self.falling.is_empty()
            && self.matching.is_empty()
            && self.dropping.is_empty()
            && self.arrivals.is_empty()
    }

    /// Take the events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<GridEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn start(&mut self) {
        self.activate_next_waiting_pair();
    }

    fn alloc_id(&mut self) -> TileId {
        self.next_tile += 1;
        TileId(self.next_tile)
    }

    fn sample_color(&mut self) -> TileColor {
        self.spawn
            .sample(&mut self.rng)
            .unwrap_or(TileColor::Red)
    }

    fn refill_queue(&mut self) {
        while self.queue.len() < self.settings.queue_len {
            let (root_color, child_color) = (self.sample_color(), self.sample_color());
            let (root_id, child_id) = (self.alloc_id(), self.alloc_id());
            let mut root = Tile::new(root_id, root_color, true, self.settings.root_start());
            let mut child = Tile::new(child_id, child_color, false, self.settings.child_start());
            root.set_partner(child_id);
            child.set_partner(root_id);
            self.tiles.insert(root_id, root);
            self.tiles.insert(child_id, child);
            self.queue.push_back(WaitingPair {
                root: root_id,
                child: child_id,
            });
        }
    }

    /// Starts the front waiting pair falling and tops the queue back up.
    pub fn activate_next_waiting_pair(&mut self) {
        if self.is_game_over() {
            return;
        }
        let Some(pair) = self.queue.pop_front() else {
            log::warn!("{}: no waiting pair to activate", self.id);
            return;
        };
        self.active = Some(pair);
        self.falling.insert(pair.root);
        self.falling.insert(pair.child);
        self.input_enabled = true;
        self.activations += 1;
        self.outbox.push(GridEvent::PairActivated {
            grid: self.id,
            root: pair.root,
            child: pair.child,
        });
        log::debug!("{}: pair {} / {} activated", self.id, pair.root, pair.child);
        self.dispatch(pair.root, Signal::PlacedAtStart);
        self.dispatch(pair.child, Signal::PlacedAtStart);
        if self.accelerate {
            self.dispatch(pair.root, Signal::Accelerate(true));
        }
        self.refill_queue();
    }

    /// Applies a movement intent to the active pair. Returns false when ignored.
    /// Accelerate is a held state: it is recorded even while input is locked and
    /// carries over to later pairs.
    pub fn apply_intent(&mut self, intent: IntentKind) -> bool {
        if self.is_game_over() {
            return false;
        }
        if let IntentKind::Accelerate(on) = intent {
            self.accelerate = on;
            if let Some(pair) = self.active.filter(|_| self.input_enabled) {
                self.dispatch(pair.root, Signal::Accelerate(on));
            }
            return true;
        }
        if !self.input_enabled {
            return false;
        }
        let Some(pair) = self.active else {
            return false;
        };
        let before = self.tiles.get(&pair.child).map(|t| *t.state());
        let effects = match intent {
            IntentKind::ShiftColumn(shift) => self.dispatch(pair.root, Signal::ShiftColumn(shift)),
            IntentKind::Rotate => self.dispatch(pair.child, Signal::Rotate),
            IntentKind::Accelerate(_) => return true,
        };
        !effects.is_empty() || before != self.tiles.get(&pair.child).map(|t| *t.state())
    }

    /// Advances every tile by `dt_secs`.
    pub fn tick(&mut self, dt_secs: f32) {
        let ids: Vec<TileId> = self.tiles.keys().copied().collect();
        for id in ids {
            self.dispatch(id, Signal::Tick { dt_secs });
        }
    }

    /// Delivers `signal` to one tile and reacts to its effects.
    fn dispatch(&mut self, id: TileId, signal: Signal<'_>) -> Vec<TileEffect> {
        let effects = self.send(id, signal);
        for effect in &effects {
            self.react(id, *effect);
        }
        effects
    }

    fn send(&mut self, id: TileId, signal: Signal<'_>) -> Vec<TileEffect> {
        let partner = self
            .tiles
            .get(&id)
            .and_then(Tile::partner)
            .filter(|p| self.falling.contains(p))
            .and_then(|p| self.tiles.get(&p))
            .map(Tile::view);
        let Some(tile) = self.tiles.get_mut(&id) else {
            return Vec::new();
        };
        let ctx = TileContext {
            board: &self.board,
            speeds: &self.settings.speeds,
            partner,
        };
        tile.handle(signal, &ctx)
    }

    fn broadcast(&mut self, signal: Signal<'_>) {
        let ids: Vec<TileId> = self.tiles.keys().copied().collect();
        for id in ids {
            self.dispatch(id, signal);
        }
    }

    fn react(&mut self, id: TileId, effect: TileEffect) {
        match effect {
            TileEffect::Arrived(at) => self.on_tile_arrived(id, at),
            TileEffect::DroppedArrived(at) => self.on_dropped_tile_arrived(id, at),
            TileEffect::ShouldFall(at) => self.on_should_fall_from(at),
            TileEffect::Destroyed => self.on_tile_destroyed(id),
            TileEffect::VisualChanged => self.outbox.push(GridEvent::TileVisualChanged {
                grid: self.id,
                tile: id,
            }),
            TileEffect::Shifted => {
                if let Some(child) = self.active.map(|p| p.child) {
                    self.dispatch(child, Signal::FollowRoot);
                }
            }
        }
    }

    fn record_arrival(&mut self, id: TileId, at: GridCoord) {
        if let Some(other) = self.arrivals.insert(at, id) {
            log::error!("{}: tiles {other} and {id} both landed at {at}", self.id);
        }
        self.board.reserve(at);
        self.outbox.push(GridEvent::TileArrivedAtCell {
            grid: self.id,
            coord: at,
            tile: id,
        });
    }

    /// A pair tile reached its cell.
    pub fn on_tile_arrived(&mut self, id: TileId, at: GridCoord) {
        if self.is_game_over() {
            return;
        }
        if !self.falling.remove(&id) {
            log::error!("{}: arrival from {id} which was not falling", self.id);
            return;
        }
        self.input_enabled = false;
        self.record_arrival(id, at);
        if let Some(partner) = self.tiles.get(&id).and_then(Tile::partner) {
            if self.falling.contains(&partner) {
                self.dispatch(partner, Signal::PartnerLanded);
            }
        }
        if self.falling.is_empty() && self.dropping.is_empty() && !self.arrivals.is_empty() {
            self.commit_arrivals();
        }
    }

    /// A cascading tile reached its new cell.
    pub fn on_dropped_tile_arrived(&mut self, id: TileId, at: GridCoord) {
        if self.is_game_over() {
            return;
        }
        if !self.dropping.remove(&id) {
            log::error!("{}: drop arrival from {id} which was not dropping", self.id);
            return;
        }
        self.record_arrival(id, at);
        if self.dropping.is_empty() && self.falling.is_empty() && !self.arrivals.is_empty() {
            self.commit_arrivals();
        }
    }

    /// Places tiles straight into landed state and runs the settling loop from the
    /// commit step, as if they had just arrived.
    pub fn land_tiles(&mut self, tiles: &[(GridCoord, TileColor)]) -> Vec<TileId> {
        let mut ids = Vec::with_capacity(tiles.len());
        for &(at, color) in tiles {
            let id = self.alloc_id();
            self.tiles.insert(id, Tile::landed(id, color, at));
            self.record_arrival(id, at);
            ids.push(id);
        }
        if self.falling.is_empty() && self.dropping.is_empty() && !self.arrivals.is_empty() {
            self.commit_arrivals();
        }
        ids
    }

    /// Puts tiles directly on the board without matching or events. Cells that
    /// are out of bounds or taken are skipped.
    pub fn seed_tiles(&mut self, tiles: &[(GridCoord, TileColor)]) -> Vec<TileId> {
        let mut ids = Vec::with_capacity(tiles.len());
        let mut placed = BTreeSet::new();
        for &(at, color) in tiles {
            let id = self.alloc_id();
            if !self.board.occupy(at, id, color) {
                log::warn!("{}: cannot seed {color} at {at}", self.id);
                continue;
            }
            self.tiles.insert(id, Tile::landed(id, color, at));
            self.send(id, Signal::Committed(at));
            placed.insert(at);
            ids.push(id);
        }
        let all: Vec<TileId> = self.tiles.keys().copied().collect();
        for id in all {
            self.send(id, Signal::TilesAdded(&placed));
        }
        ids
    }

    /// Writes every landed tile into the cell matrix, then checks for top-out and matches.
    fn commit_arrivals(&mut self) {
        let arrivals = std::mem::take(&mut self.arrivals);
        let entry_row = self.settings.root_start().row;
        let mut added = BTreeSet::new();
        let mut topped_out = false;
        for (&at, &id) in &arrivals {
            self.board.release(at);
            let Some(color) = self.tiles.get(&id).map(Tile::color) else {
                continue;
            };
            if self.board.occupy(at, id, color) {
                self.send(id, Signal::Committed(at));
                added.insert(at);
            } else if at.row >= entry_row || !self.board.in_bounds(at) {
                topped_out = true;
            } else {
                log::error!("{}: cannot commit {id} at {at}: cell taken", self.id);
                self.tiles.remove(&id);
            }
        }
        log::debug!("{}: committed {} tile(s)", self.id, added.len());
        if !added.is_empty() {
            self.outbox.push(GridEvent::TilesChanged {
                grid: self.id,
                coords: added.iter().copied().collect(),
                reason: ChangeReason::Added,
            });
            self.broadcast(Signal::TilesAdded(&added));
        }
        if topped_out || !self.board.is_available(self.settings.root_start()) {
            self.game_over();
            return;
        }
        self.resolve_matches(added);
    }

    fn resolve_matches(&mut self, seeds: BTreeSet<GridCoord>) {
        let matched = find_matches(&*self, seeds, self.settings.min_match);
        if matched.is_empty() {
            self.go_idle();
            return;
        }
        for &c in &matched {
            if let Some(id) = self.board.vacate(c) {
                self.matching.insert(id);
            }
        }
        let points = matched.len() as u32 * self.settings.base_tile_score;
        self.score += u64::from(points);
        log::debug!("{}: matched {} tile(s) for {points}", self.id, matched.len());
        self.outbox.push(GridEvent::ScoreDelta {
            grid: self.id,
            matched: matched.len(),
            points,
        });
        self.outbox.push(GridEvent::TilesChanged {
            grid: self.id,
            coords: matched.iter().copied().collect(),
            reason: ChangeReason::Matched,
        });
        self.broadcast(Signal::TilesMatched(&matched));
    }

    /// Records `from` and every occupied cell stacked above it as needing to fall.
    pub fn on_should_fall_from(&mut self, from: GridCoord) {
        let mut c = from;
        while self.board.occupant(c).is_some() {
            if !self.should_fall.contains(&c) {
                self.should_fall.push(c);
            }
            c = c.step(Direction::Up);
        }
    }

    /// A matched tile finished its removal effect.
    pub fn on_tile_destroyed(&mut self, id: TileId) {
        self.tiles.remove(&id);
        if self.is_game_over() {
            return;
        }
        if self.matching.remove(&id) && self.matching.is_empty() && self.falling.is_empty() {
            if self.should_fall.is_empty() {
                self.go_idle();
            } else {
                self.cascade();
            }
        }
    }

    fn cascade(&mut self) {
        let waiting = std::mem::take(&mut self.should_fall);
        let plan = resolve_drop_targets(&self.board, waiting);
        for c in &plan.skipped {
            log::error!("{}: no drop target for tile at {c}, left in place", self.id);
        }
        if plan.moves.is_empty() {
            self.go_idle();
            return;
        }
        for &from in plan.moves.keys() {
            if let Some(id) = self.board.vacate(from) {
                self.dropping.insert(id);
            }
        }
        log::debug!("{}: dropping {} tile(s)", self.id, plan.moves.len());
        self.outbox.push(GridEvent::TilesChanged {
            grid: self.id,
            coords: plan.moves.keys().copied().collect(),
            reason: ChangeReason::Dropped,
        });
        self.broadcast(Signal::TilesDropped(&plan.moves));
    }

    fn go_idle(&mut self) {
        self.active = None;
        self.input_enabled = true;
        self.activate_next_waiting_pair();
    }

    fn game_over(&mut self) {
        if self.is_game_over() {
            return;
        }
        self.status = GridStatus::GameOver;
        self.input_enabled = false;
        self.active = None;
        self.falling.clear();
        self.matching.clear();
        self.dropping.clear();
        self.should_fall.clear();
        let occupied: Vec<GridCoord> = self.board.occupied().map(|(c, _)| c).collect();
        for c in occupied {
            self.board.vacate(c);
        }
        log::info!("{}: game over with score {}", self.id, self.score);
        self.outbox.push(GridEvent::GridGameOver { grid: self.id });
        self.broadcast(Signal::GridGameOver);
    }

    /// Column of the falling root, if a pair is under control.
    pub fn active_root_column(&self) -> Option<i32> {
        let pair = self.active?;
        let root = self.tiles.get(&pair.root)?;
        matches!(root.state(), TileState::FallingRoot { .. })
            .then(|| root.column())
            .flatten()
    }

    /// Lowest free cell of each column that still has one.
    pub fn first_free_per_column(&self) -> Vec<GridCoord> {
        (0..self.board.columns())
            .filter_map(|col| self.board.lowest_free_in_column(col, self.board.rows() - 1))
            .collect()
    }
}

impl ConnectionSource for GridEngine {
    fn connections_at(&self, c: GridCoord) -> Option<ConnectionMask> {
        let id = self.board.occupant(c)?;
        self.tiles.get(&id).map(Tile::connections)
    }
}
