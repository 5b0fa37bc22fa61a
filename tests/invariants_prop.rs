//! Board invariants under random play.
//!
//! - every occupied cell points at a live tile whose grid position is that cell
//! - no tile occupies two cells
//! - each tile has exactly one of grid position / temporary position
//! - connection masks of placed tiles agree with the board

use proptest::prelude::*;
use std::collections::BTreeSet;
use tilecascade::matching::compute_connections;
use tilecascade::tile::TileState;
use tilecascade::{Controller, GameSettings, GridEngine, GridId, IntentKind, Shift};

fn assert_invariants(e: &GridEngine) {
    let mut seen = BTreeSet::new();
    for (c, occ) in e.board().occupied() {
        assert!(seen.insert(occ.tile), "{} occupies two cells", occ.tile);
        let tile = e.tile(occ.tile).expect("occupant is a live tile");
        assert_eq!(tile.grid_position(), Some(c));
        assert_eq!(tile.color(), occ.color);
    }
    for tile in e.tiles() {
        assert!(
            tile.grid_position().is_some() != tile.temporary_position().is_some(),
            "{} in state {}",
            tile.id(),
            tile.state().name()
        );
        if let (TileState::PlacedOnGrid, Some(c)) = (tile.state(), tile.grid_position()) {
            assert_eq!(e.board().occupant(c), Some(tile.id()));
            if !e.is_game_over() {
                assert_eq!(
                    tile.connections(),
                    compute_connections(e.board(), c, tile.color()),
                    "stale mask at {c}"
                );
            }
        }
    }
}

fn intent(code: u8) -> Option<IntentKind> {
    match code % 6 {
        0 => Some(IntentKind::ShiftColumn(Shift::Left)),
        1 => Some(IntentKind::ShiftColumn(Shift::Right)),
        2 => Some(IntentKind::Rotate),
        3 => Some(IntentKind::Accelerate(true)),
        4 => Some(IntentKind::Accelerate(false)),
        _ => None,
    }
}

#[test]
fn long_rollout_keeps_invariants() {
    let mut e = GridEngine::new(GridId(0), &GameSettings::default(), Controller::Player, 20_261_017)
        .unwrap();
    e.start();
    for step in 0..3000u32 {
        if let Some(kind) = intent((step % 7) as u8) {
            e.apply_intent(kind);
        }
        e.tick(0.05);
        e.drain_events();
        assert_invariants(&e);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_play_respects_board_invariants(
        seed in any::<u64>(),
        min_match in 2usize..5,
        moves in proptest::collection::vec((any::<u8>(), 1usize..12), 1..120),
    ) {
        let settings = GameSettings {
            rows: 10,
            columns: 6,
            spawn_column: 2,
            min_match,
            ..GameSettings::default()
        };
        let mut e = GridEngine::new(GridId(1), &settings, Controller::Ai, seed).unwrap();
        e.start();
        for (code, ticks) in moves {
            if let Some(kind) = intent(code) {
                e.apply_intent(kind);
            }
            for _ in 0..ticks {
                e.tick(0.04);
                assert_invariants(&e);
            }
            prop_assert!(e.drain_events().len() < 10_000);
        }
    }
}
