//! Computer opponent: picks a column for each new pair and walks the root there.

use crate::engine::{Controller, GridEngine, IntentKind};
use crate::events::{GridEvent, GridId};
use crate::session::Intent;
use crate::tile::Shift;
use rand::prelude::*;

/// Seconds between two column shifts.
pub const DEFAULT_MOVE_INTERVAL: f32 = 0.4;

#[derive(Debug, Clone)]
pub struct AiController {
    grid: GridId,
    rng: StdRng,
    target_col: Option<i32>,
    move_interval: f32,
    since_move: f32,
}

impl AiController {
    pub fn new(grid: GridId, seed: u64) -> Self {
        Self {
            grid,
            rng: StdRng::seed_from_u64(seed),
            target_col: None,
            move_interval: DEFAULT_MOVE_INTERVAL,
            since_move: 0.0,
        }
    }

    pub fn with_move_interval(mut self, secs: f32) -> Self {
        self.move_interval = secs.max(0.0);
        self
    }

    pub fn grid(&self) -> GridId {
        self.grid
    }

    pub fn target_column(&self) -> Option<i32> {
        self.target_col
    }

    /// Reacts to events from its own grid.
    pub fn observe(&mut self, event: &GridEvent, engine: &GridEngine) {
        if event.grid() != self.grid {
            return;
        }
        match event {
            GridEvent::PairActivated { .. } => {
                let columns = engine.first_free_per_column();
                self.target_col = columns.choose(&mut self.rng).map(|c| c.col);
                self.since_move = 0.0;
                log::debug!("{}: ai aims for column {:?}", self.grid, self.target_col);
            }
            GridEvent::TileArrivedAtCell { .. } | GridEvent::GridGameOver { .. } => {
                self.target_col = None;
            }
            _ => {}
        }
    }

    /// Next shift toward the target column, at most one per move interval.
    pub fn poll(&mut self, engine: &GridEngine, dt_secs: f32) -> Option<Intent> {
        let target = self.target_col?;
        self.since_move += dt_secs;
        if self.since_move < self.move_interval {
            return None;
        }
        let current = engine.active_root_column()?;
        if current == target {
            self.target_col = None;
            return None;
        }
        self.since_move = 0.0;
        let shift = if current > target {
            Shift::Left
        } else {
            Shift::Right
        };
        Some(Intent {
            grid: self.grid,
            source: Controller::Ai,
            kind: IntentKind::ShiftColumn(shift),
        })
    }
}
