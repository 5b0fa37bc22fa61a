//! Connectivity and match evaluation, plus cascade drop-target resolution.

use crate::board::Board;
use crate::geometry::{ConnectionMask, Direction, GridCoord};
use crate::tile::TileColor;
use std::collections::{BTreeMap, BTreeSet};

/// Source of per-cell connection masks. `None` means the cell is empty (or out of bounds).
///
/// Flood fill trusts these masks instead of comparing colours again.
pub trait ConnectionSource {
    fn connections_at(&self, c: GridCoord) -> Option<ConnectionMask>;
}

/// Mask for a tile of `color` sitting at `at`: bit D set iff the neighbour in
/// direction D is in bounds, occupied, and the same colour.
pub fn compute_connections(board: &Board, at: GridCoord, color: TileColor) -> ConnectionMask {
    let mut mask = ConnectionMask::NONE;
    for dir in Direction::ALL {
        if board.color_at(at.step(dir)) == Some(color) {
            mask.insert(dir);
        }
    }
    mask
}

/// Connected component containing `start`, following each visited cell's mask.
/// Empty when `start` holds no tile.
pub fn find_connected_group<S: ConnectionSource + ?Sized>(
    src: &S,
    start: GridCoord,
) -> BTreeSet<GridCoord> {
    let mut group = BTreeSet::new();
    if src.connections_at(start).is_none() {
        return group;
    }
    let mut stack = vec![start];
    group.insert(start);
    while let Some(c) = stack.pop() {
        let Some(mask) = src.connections_at(c) else {
            continue;
        };
        for dir in mask.directions() {
            let n = c.step(dir);
            if src.connections_at(n).is_some() && group.insert(n) {
                stack.push(n);
            }
        }
    }
    group
}

/// Union of the groups reached from `seeds` whose size is at least `min_group_size`.
/// Singletons never match.
pub fn find_matches<S, I>(src: &S, seeds: I, min_group_size: usize) -> BTreeSet<GridCoord>
where
    S: ConnectionSource + ?Sized,
    I: IntoIterator<Item = GridCoord>,
{
    let min = min_group_size.max(2);
    let mut matched = BTreeSet::new();
    for seed in seeds {
        if matched.contains(&seed) {
            continue;
        }
        let group = find_connected_group(src, seed);
        if group.len() >= min {
            matched.extend(group);
        }
    }
    matched
}

/// Result of assigning new rows to tiles that lost support.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropPlan {
    /// Old coordinate → new coordinate, one entry per tile that will move.
    pub moves: BTreeMap<GridCoord, GridCoord>,
    /// Coordinates with no valid target; those tiles stay where they are.
    pub skipped: Vec<GridCoord>,
}

/// Bottom-up, first-available drop targets for `waiting`.
///
/// Tiles are processed column by column from the lowest row upward so a tile
/// never lands above a tile it was resting on. A row counts as available when it
/// is empty on the board or was vacated earlier in this pass, and no other tile
/// claimed it. Targets are searched strictly below the tile's current row.
pub fn resolve_drop_targets<I>(board: &Board, waiting: I) -> DropPlan
where
    I: IntoIterator<Item = GridCoord>,
{
    let ordered: BTreeSet<GridCoord> = waiting.into_iter().collect();
    let mut ordered: Vec<GridCoord> = ordered.into_iter().collect();
    ordered.sort_by_key(|c| (c.col, c.row));

    let mut plan = DropPlan::default();
    let mut claimed: BTreeSet<GridCoord> = BTreeSet::new();
    let mut vacated: BTreeSet<GridCoord> = BTreeSet::new();

    for from in ordered {
        if board.occupant(from).is_none() {
            continue;
        }
        let target = (0..from.row)
            .map(|row| GridCoord::new(from.col, row))
            .find(|c| (board.is_available(*c) || vacated.contains(c)) && !claimed.contains(c));
        match target {
            Some(to) => {
                claimed.insert(to);
                vacated.insert(from);
                plan.moves.insert(from, to);
            }
            None => plan.skipped.push(from),
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::CellLayout;
    use crate::tile::TileId;

    /// Board-backed source that recomputes masks from colours (what placed tiles hold).
    struct Masks<'a>(&'a Board);

    impl ConnectionSource for Masks<'_> {
        fn connections_at(&self, c: GridCoord) -> Option<ConnectionMask> {
            let color = self.0.color_at(c)?;
            Some(compute_connections(self.0, c, color))
        }
    }

    fn board_from(rows: &[&str]) -> Board {
        // rows[0] is the top line; letters: R G B Y P, '.' empty
        let h = rows.len() as u16;
        let w = rows[0].len() as u16;
        let mut b = Board::new(w, h, CellLayout::default());
        let mut id = 0;
        for (i, line) in rows.iter().enumerate() {
            let row = i32::from(h) - 1 - i as i32;
            for (col, ch) in line.chars().enumerate() {
                let color = match ch {
                    'R' => TileColor::Red,
                    'G' => TileColor::Green,
                    'B' => TileColor::Blue,
                    'Y' => TileColor::Yellow,
                    'P' => TileColor::Purple,
                    _ => continue,
                };
                id += 1;
                b.occupy(GridCoord::new(col as i32, row), TileId(id), color);
            }
        }
        b
    }

    #[test]
    fn cross_pattern_masks() {
        let b = board_from(&[".R.", "RRR", ".R."]);
        let centre = compute_connections(&b, GridCoord::new(1, 1), TileColor::Red);
        assert_eq!(centre.directions().count(), 4);
        let top = compute_connections(&b, GridCoord::new(1, 2), TileColor::Red);
        assert_eq!(top, ConnectionMask::NONE.with(Direction::Down));
        let left = compute_connections(&b, GridCoord::new(0, 1), TileColor::Red);
        assert_eq!(left, ConnectionMask::NONE.with(Direction::Right));
        // an empty cell still reports what a red tile there would connect to
        let corner = compute_connections(&b, GridCoord::new(0, 0), TileColor::Red);
        assert_eq!(
            corner,
            ConnectionMask::NONE.with(Direction::Up).with(Direction::Right)
        );
    }

    #[test]
    fn masks_are_symmetric() {
        let b = board_from(&["RGB", "RRB", "GRB"]);
        for (c, occ) in b.occupied() {
            let m = compute_connections(&b, c, occ.color);
            for dir in m.directions() {
                let n = c.step(dir);
                let back = compute_connections(&b, n, b.color_at(n).unwrap());
                assert!(back.contains(dir.opposite()), "{c} -> {n}");
            }
        }
    }

    #[test]
    fn two_by_two_block_matches_at_four_not_five() {
        let b = board_from(&["....", ".GG.", ".GG.", "...."]);
        let src = Masks(&b);
        let block: Vec<GridCoord> = b.occupied().map(|(c, _)| c).collect();
        assert_eq!(block.len(), 4);
        for seed in &block {
            let g = find_connected_group(&src, *seed);
            assert_eq!(g.len(), 4);
            assert_eq!(find_matches(&src, [*seed], 4).len(), 4);
            assert!(find_matches(&src, [*seed], 5).is_empty());
        }
    }

    #[test]
    fn flood_fill_handles_cycles_and_ignores_other_colours() {
        let b = board_from(&["RRR", "RBR", "RRR"]);
        let src = Masks(&b);
        let ring = find_connected_group(&src, GridCoord::new(0, 0));
        assert_eq!(ring.len(), 8);
        assert!(!ring.contains(&GridCoord::new(1, 1)));
        assert_eq!(find_connected_group(&src, GridCoord::new(1, 1)).len(), 1);
    }

    #[test]
    fn empty_seed_and_singletons_never_match() {
        let b = board_from(&["R.", ".G"]);
        let src = Masks(&b);
        assert!(find_connected_group(&src, GridCoord::new(1, 1)).is_empty());
        assert!(find_matches(&src, [GridCoord::new(0, 1)], 1).is_empty());
    }

    #[test]
    fn find_matches_is_idempotent_and_unions_overlapping_seeds() {
        let b = board_from(&["YYYY", "BBB.", "B..."]);
        let src = Masks(&b);
        let seeds = [GridCoord::new(0, 2), GridCoord::new(3, 2), GridCoord::new(0, 0)];
        let first = find_matches(&src, seeds, 4);
        let second = find_matches(&src, seeds, 4);
        assert_eq!(first, second);
        assert_eq!(first.len(), 8);
    }

    #[test]
    fn drop_targets_fill_bottom_up_within_column() {
        // column 0: rows 0 and 2 empty, tiles at rows 1 and 3
        let b = board_from(&["R", ".", "G", "."]);
        let plan = resolve_drop_targets(&b, [GridCoord::new(0, 1)]);
        assert!(plan.skipped.is_empty());
        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves.get(&GridCoord::new(0, 1)), Some(&GridCoord::new(0, 0)));

        let plan = resolve_drop_targets(&b, [GridCoord::new(0, 3), GridCoord::new(0, 1)]);
        assert_eq!(plan.moves.get(&GridCoord::new(0, 1)), Some(&GridCoord::new(0, 0)));
        assert_eq!(plan.moves.get(&GridCoord::new(0, 3)), Some(&GridCoord::new(0, 1)));
        // empty coordinates have nothing to drop
        assert!(resolve_drop_targets(&b, [GridCoord::new(0, 2)]).moves.is_empty());
    }

    #[test]
    fn drop_targets_never_collide_and_skip_deterministically() {
        // column 0 has one free cell under two tiles; column 1 is packed solid.
        let b = board_from(&["RB", "GY", ".P"]);
        let waiting = [
            GridCoord::new(1, 2),
            GridCoord::new(0, 2),
            GridCoord::new(1, 1),
            GridCoord::new(0, 1),
        ];
        let plan = resolve_drop_targets(&b, waiting);
        let targets: BTreeSet<GridCoord> = plan.moves.values().copied().collect();
        assert_eq!(targets.len(), plan.moves.len());
        assert_eq!(plan.moves.get(&GridCoord::new(0, 1)), Some(&GridCoord::new(0, 0)));
        assert_eq!(plan.moves.get(&GridCoord::new(0, 2)), Some(&GridCoord::new(0, 1)));
        assert_eq!(plan.skipped, vec![GridCoord::new(1, 1), GridCoord::new(1, 2)]);

        let again = resolve_drop_targets(&b, waiting.into_iter().rev());
        assert_eq!(again, plan);
    }
}
