//! Match controller: owns every grid of a match, the player registry, the event
//! bus and the AI opponents, and decides when the match is over.

use crate::ai::AiController;
use crate::engine::{Controller, GridEngine, IntentKind};
use crate::events::{EventBus, GridEvent, GridFilter, GridId, SubscriptionId};
use crate::settings::{GameSettings, SettingsError};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown {0}")]
    UnknownGrid(GridId),
    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    /// Play until the player's grid tops out.
    SinglePlayer,
    /// Last grid standing wins.
    Versus,
}

/// Movement request for one grid, tagged with who sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intent {
    pub grid: GridId,
    pub source: Controller,
    pub kind: IntentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Single player run ended.
    Finished { score: u64, new_best: bool },
    Won { score: u64 },
    Lost { score: u64 },
    /// No player grid; the last grid standing, if any.
    Decided { winner: Option<GridId> },
}

#[derive(Debug)]
pub struct Session {
    settings: GameSettings,
    mode: GameMode,
    seed: u64,
    grids: BTreeMap<GridId, GridEngine>,
    ais: BTreeMap<GridId, AiController>,
    alive: BTreeSet<GridId>,
    player: Option<GridId>,
    next_grid: u32,
    bus: EventBus,
    best_score: u64,
    outcome: Option<MatchOutcome>,
}

impl Session {
    pub fn new(settings: GameSettings, mode: GameMode, seed: u64) -> Result<Self, SessionError> {
        settings.validate()?;
        Ok(Self {
            settings,
            mode,
            seed,
            grids: BTreeMap::new(),
            ais: BTreeMap::new(),
            alive: BTreeSet::new(),
            player: None,
            next_grid: 0,
            bus: EventBus::new(),
            best_score: 0,
            outcome: None,
        })
    }

    /// Best score to beat in single player (persisted by the caller, if at all).
    pub fn with_best_score(mut self, best: u64) -> Self {
        self.best_score = best;
        self
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// Claims the player slot. Only the first caller asking for it gets it.
    pub fn try_sign_up(&mut self, grid: GridId, wants_player: bool) -> bool {
        if !wants_player {
            return true;
        }
        if self.player.is_some() {
            log::info!("{grid}: player slot taken, running as ai");
            return false;
        }
        self.player = Some(grid);
        true
    }

    /// Creates a grid; it becomes the player's grid if requested and still free.
    pub fn add_grid(&mut self, wants_player: bool) -> Result<GridId, SessionError> {
        let id = GridId(self.next_grid);
        self.next_grid += 1;
        let grid_seed = self
            .seed
            .wrapping_add(u64::from(id.0).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut engine = GridEngine::new(id, &self.settings, Controller::Ai, grid_seed)?;
        if self.try_sign_up(id, wants_player) && wants_player {
            engine.set_controller(Controller::Player);
        } else {
            self.ais.insert(id, AiController::new(id, grid_seed ^ 0xA1));
        }
        log::info!("{id}: joined as {:?}", engine.controller());
        self.grids.insert(id, engine);
        self.alive.insert(id);
        Ok(id)
    }

    pub fn player_grid(&self) -> Option<GridId> {
        self.player
    }

    pub fn grid(&self, id: GridId) -> Option<&GridEngine> {
        self.grids.get(&id)
    }

    pub fn grid_mut(&mut self, id: GridId) -> Option<&mut GridEngine> {
        self.grids.get_mut(&id)
    }

    pub fn grids(&self) -> impl Iterator<Item = &GridEngine> {
        self.grids.values()
    }

    pub fn ai_mut(&mut self, id: GridId) -> Option<&mut AiController> {
        self.ais.get_mut(&id)
    }

    /// Grids still playing.
    pub fn alive(&self) -> &BTreeSet<GridId> {
        &self.alive
    }

    pub fn subscribe(
        &mut self,
        filter: GridFilter,
        handler: impl FnMut(&GridEvent) + 'static,
    ) -> SubscriptionId {
        self.bus.subscribe(filter, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    /// Activates the first pair on every grid.
    pub fn start(&mut self) {
        for engine in self.grids.values_mut() {
            engine.start();
        }
        log::info!("match started with {} grid(s), {:?}", self.grids.len(), self.mode);
        self.pump();
    }

    /// Routes an intent. Returns Ok(false) when it was ignored (wrong source,
    /// input disabled, blocked move, or match over).
    pub fn apply_intent(&mut self, intent: Intent) -> Result<bool, SessionError> {
        let engine = self
            .grids
            .get_mut(&intent.grid)
            .ok_or(SessionError::UnknownGrid(intent.grid))?;
        if engine.controller() != intent.source || self.outcome.is_some() {
            return Ok(false);
        }
        let applied = engine.apply_intent(intent.kind);
        self.pump();
        Ok(applied)
    }

    /// Polls the AI opponents, advances every grid and publishes what happened.
    pub fn tick(&mut self, dt_secs: f32) {
        if self.outcome.is_none() {
            for (id, ai) in &mut self.ais {
                let Some(engine) = self.grids.get_mut(id) else {
                    continue;
                };
                if let Some(intent) = ai.poll(engine, dt_secs) {
                    engine.apply_intent(intent.kind);
                }
            }
        }
        for engine in self.grids.values_mut() {
            engine.tick(dt_secs);
        }
        self.pump();
    }

    /// Drains every grid's outbox into the bus, in grid order.
    fn pump(&mut self) {
        let mut over = Vec::new();
        for (id, engine) in &mut self.grids {
            for event in engine.drain_events() {
                if let Some(ai) = self.ais.get_mut(id) {
                    ai.observe(&event, engine);
                }
                if matches!(event, GridEvent::GridGameOver { .. }) {
                    over.push(*id);
                }
                self.bus.publish(&event);
            }
        }
        for id in over {
            self.on_grid_game_over(id);
        }
    }

    fn score_of(&self, id: GridId) -> u64 {
        self.grids.get(&id).map_or(0, GridEngine::score)
    }

    fn on_grid_game_over(&mut self, id: GridId) {
        if !self.alive.remove(&id) || self.outcome.is_some() {
            return;
        }
        let outcome = match (self.mode, self.player) {
            (GameMode::SinglePlayer, Some(player)) if player == id => {
                let score = self.score_of(player);
                Some(MatchOutcome::Finished {
                    score,
                    new_best: score > self.best_score,
                })
            }
            (GameMode::Versus, Some(player)) if player == id => Some(MatchOutcome::Lost {
                score: self.score_of(player),
            }),
            (GameMode::Versus, Some(player)) if self.alive.len() == 1 && self.alive.contains(&player) => {
                Some(MatchOutcome::Won {
                    score: self.score_of(player),
                })
            }
            (GameMode::SinglePlayer, None) if self.alive.is_empty() => {
                Some(MatchOutcome::Decided { winner: None })
            }
            (GameMode::Versus, None) if self.alive.len() <= 1 => Some(MatchOutcome::Decided {
                winner: self.alive.first().copied(),
            }),
            _ => None,
        };
        if let Some(outcome) = outcome {
            log::info!("match over: {outcome:?}");
            self.outcome = Some(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GridCoord;
    use crate::tile::TileColor;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn block_entry(session: &mut Session, grid: GridId) {
        let column: Vec<(GridCoord, TileColor)> = (0..15)
            .map(|row| {
                let color = if row % 2 == 0 { TileColor::Purple } else { TileColor::Green };
                (GridCoord::new(3, row), color)
            })
            .collect();
        session.grid_mut(grid).unwrap().seed_tiles(&column);
    }

    #[test]
    fn only_one_player_signs_up() {
        let mut s = Session::new(GameSettings::default(), GameMode::Versus, 1).unwrap();
        let a = s.add_grid(true).unwrap();
        let b = s.add_grid(true).unwrap();
        assert_eq!(s.player_grid(), Some(a));
        assert_eq!(s.grid(a).unwrap().controller(), Controller::Player);
        assert_eq!(s.grid(b).unwrap().controller(), Controller::Ai);
        assert!(s.ai_mut(b).is_some());
        assert!(s.ai_mut(a).is_none());
    }

    #[test]
    fn intents_are_routed_by_grid_and_source() {
        let mut s = Session::new(GameSettings::default(), GameMode::Versus, 1).unwrap();
        let player = s.add_grid(true).unwrap();
        let ai = s.add_grid(false).unwrap();
        s.start();
        let shift = IntentKind::ShiftColumn(crate::tile::Shift::Left);
        let err = s.apply_intent(Intent {
            grid: GridId(99),
            source: Controller::Player,
            kind: shift,
        });
        assert!(matches!(err, Err(SessionError::UnknownGrid(GridId(99)))));
        let ignored = s
            .apply_intent(Intent {
                grid: ai,
                source: Controller::Player,
                kind: shift,
            })
            .unwrap();
        assert!(!ignored);
        let applied = s
            .apply_intent(Intent {
                grid: player,
                source: Controller::Player,
                kind: shift,
            })
            .unwrap();
        assert!(applied);
        assert_eq!(s.grid(player).unwrap().active_root_column(), Some(2));
    }

    #[test]
    fn bus_delivers_filtered_events() {
        let mut s = Session::new(GameSettings::default(), GameMode::Versus, 3).unwrap();
        let a = s.add_grid(true).unwrap();
        let b = s.add_grid(false).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        s.subscribe(GridFilter::Only(b), move |e| sink.borrow_mut().push(e.grid()));
        s.start();
        assert!(!seen.borrow().is_empty());
        assert!(seen.borrow().iter().all(|g| *g == b));
        assert!(!seen.borrow().contains(&a));
    }

    #[test]
    fn single_player_ends_with_the_player_grid() {
        let mut s = Session::new(GameSettings::default(), GameMode::SinglePlayer, 9)
            .unwrap()
            .with_best_score(100);
        let p = s.add_grid(true).unwrap();
        block_entry(&mut s, p);
        s.start();
        for _ in 0..10 {
            s.tick(0.05);
        }
        assert_eq!(
            s.outcome(),
            Some(MatchOutcome::Finished {
                score: 0,
                new_best: false
            })
        );
        assert!(s.alive().is_empty());
    }

    #[test]
    fn versus_is_won_when_only_the_player_remains() {
        let mut s = Session::new(GameSettings::default(), GameMode::Versus, 4).unwrap();
        let p = s.add_grid(true).unwrap();
        let ai = s.add_grid(false).unwrap();
        block_entry(&mut s, ai);
        s.start();
        for _ in 0..10 {
            s.tick(0.05);
        }
        assert_eq!(s.outcome(), Some(MatchOutcome::Won { score: 0 }));
        assert!(s.alive().contains(&p));
        assert!(!s.alive().contains(&ai));
    }

    #[test]
    fn versus_is_lost_when_the_player_tops_out() {
        let mut s = Session::new(GameSettings::default(), GameMode::Versus, 4).unwrap();
        let p = s.add_grid(true).unwrap();
        s.add_grid(false).unwrap();
        s.add_grid(false).unwrap();
        block_entry(&mut s, p);
        s.start();
        for _ in 0..10 {
            s.tick(0.05);
        }
        assert_eq!(s.outcome(), Some(MatchOutcome::Lost { score: 0 }));
        assert_eq!(s.alive().len(), 2);
    }
}
