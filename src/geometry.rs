//! Grid coordinates, neighbour directions and the 4-bit connection mask.

use std::fmt;

/// Integer (column, row) pair. Row 0 is the bottom of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub col: i32,
    pub row: i32,
}

impl GridCoord {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    /// Neighbouring coordinate one step in `dir` (may be out of bounds).
    #[inline]
    pub fn step(self, dir: Direction) -> Self {
        let (dc, dr) = dir.offset();
        Self::new(self.col + dc, self.row + dr)
    }
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// The four orthogonal neighbour directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    /// (dcol, drow); Up increases the row.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::Up => (0, 1),
            Self::Down => (0, -1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Clockwise order the child tile walks around its root: Up → Right → Down → Left.
    pub const fn clockwise(self) -> Self {
        match self {
            Self::Up => Self::Right,
            Self::Right => Self::Down,
            Self::Down => Self::Left,
            Self::Left => Self::Up,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Right => 1 << 0,
            Self::Left => 1 << 1,
            Self::Up => 1 << 2,
            Self::Down => 1 << 3,
        }
    }
}

/// Which neighbour directions hold a same-colour occupied cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectionMask(u8);

impl ConnectionMask {
    pub const NONE: Self = Self(0);
    /// Number of distinct masks (index range of [`ConnectionMask::bits`]).
    pub const COMBINATIONS: usize = 16;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, dir: Direction) -> bool {
        self.0 & dir.bit() != 0
    }

    #[inline]
    pub fn insert(&mut self, dir: Direction) {
        self.0 |= dir.bit();
    }

    #[inline]
    pub const fn with(self, dir: Direction) -> Self {
        Self(self.0 | dir.bit())
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Directions set in this mask, in `Direction::ALL` order.
    pub fn directions(self) -> impl Iterator<Item = Direction> {
        Direction::ALL.into_iter().filter(move |d| self.contains(*d))
    }
}

/// Position of a cell centre in world units (rendering collaborator space).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPos {
    pub x: f32,
    pub y: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_moves_one_cell() {
        let c = GridCoord::new(3, 5);
        assert_eq!(c.step(Direction::Up), GridCoord::new(3, 6));
        assert_eq!(c.step(Direction::Down), GridCoord::new(3, 4));
        assert_eq!(c.step(Direction::Left), GridCoord::new(2, 5));
        assert_eq!(c.step(Direction::Right), GridCoord::new(4, 5));
    }

    #[test]
    fn clockwise_is_a_four_cycle() {
        let mut d = Direction::Up;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(d);
            d = d.clockwise();
        }
        assert_eq!(d, Direction::Up);
        assert_eq!(
            seen,
            vec![Direction::Up, Direction::Right, Direction::Down, Direction::Left]
        );
    }

    #[test]
    fn mask_bits_are_independent() {
        let m = ConnectionMask::NONE.with(Direction::Up).with(Direction::Left);
        assert!(m.contains(Direction::Up));
        assert!(m.contains(Direction::Left));
        assert!(!m.contains(Direction::Down));
        assert!(!m.contains(Direction::Right));
        assert_eq!(m.directions().count(), 2);
        assert!((m.bits() as usize) < ConnectionMask::COMBINATIONS);
    }
}
