//! Grid cell model: a fixed matrix of cells, each optionally holding one tile.
//!
//! Cells never move and are never created or destroyed after construction; only
//! their occupant changes. A separate reservation overlay marks cells that a tile
//! in flight has already landed on but that have not been committed yet.

use crate::geometry::{GridCoord, WorldPos};
use crate::tile::{TileColor, TileId};
use std::collections::BTreeSet;

/// Tile sitting in a cell together with its colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub tile: TileId,
    pub color: TileColor,
}

/// Single cell: world position plus optional occupant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub world: WorldPos,
    occupant: Option<Occupant>,
}

impl Cell {
    #[inline]
    pub fn occupant(&self) -> Option<TileId> {
        self.occupant.map(|o| o.tile)
    }

    /// Colour of the occupant; `None` iff the cell is empty.
    #[inline]
    pub fn color(&self) -> Option<TileColor> {
        self.occupant.map(|o| o.color)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.occupant.is_none()
    }
}

/// Layout of cells in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellLayout {
    pub origin: WorldPos,
    pub cell_width: f32,
    pub cell_height: f32,
    pub spacing_x: f32,
    pub spacing_y: f32,
}

impl Default for CellLayout {
    fn default() -> Self {
        Self {
            origin: WorldPos::default(),
            cell_width: 1.0,
            cell_height: 1.0,
            spacing_x: 0.0,
            spacing_y: 0.0,
        }
    }
}

/// Cell matrix for one grid. `cells[row * columns + col]`, row 0 at the bottom.
#[derive(Debug, Clone)]
pub struct Board {
    columns: i32,
    rows: i32,
    cells: Vec<Cell>,
    reserved: BTreeSet<GridCoord>,
}

impl Board {
    pub fn new(columns: u16, rows: u16, layout: CellLayout) -> Self {
        let (columns, rows) = (i32::from(columns), i32::from(rows));
        let mut cells = Vec::with_capacity((columns * rows).max(0) as usize);
        for row in 0..rows {
            for col in 0..columns {
                let x = layout.origin.x + (layout.cell_width + layout.spacing_x) * col as f32;
                let y = layout.origin.y + (layout.cell_height + layout.spacing_y) * row as f32;
                cells.push(Cell {
                    world: WorldPos { x, y },
                    occupant: None,
                });
            }
        }
        Self {
            columns,
            rows,
            cells,
            reserved: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn columns(&self) -> i32 {
        self.columns
    }

    #[inline]
    pub fn rows(&self) -> i32 {
        self.rows
    }

    #[inline]
    pub fn in_bounds(&self, c: GridCoord) -> bool {
        c.col >= 0 && c.col < self.columns && c.row >= 0 && c.row < self.rows
    }

    #[inline]
    fn index(&self, c: GridCoord) -> Option<usize> {
        self.in_bounds(c)
            .then(|| (c.row * self.columns + c.col) as usize)
    }

    #[inline]
    pub fn cell(&self, c: GridCoord) -> Option<&Cell> {
        self.index(c).and_then(|i| self.cells.get(i))
    }

    /// True iff `c` is in bounds and unoccupied.
    #[inline]
    pub fn is_available(&self, c: GridCoord) -> bool {
        self.cell(c).is_some_and(Cell::is_empty)
    }

    pub fn world_position_of(&self, c: GridCoord) -> Option<WorldPos> {
        self.cell(c).map(|cell| cell.world)
    }

    #[inline]
    pub fn occupant(&self, c: GridCoord) -> Option<TileId> {
        self.cell(c).and_then(Cell::occupant)
    }

    #[inline]
    pub fn color_at(&self, c: GridCoord) -> Option<TileColor> {
        self.cell(c).and_then(Cell::color)
    }

    /// Puts `tile` into `c`. Returns false (and changes nothing) when `c` is out of
    /// bounds or already occupied.
    pub fn occupy(&mut self, c: GridCoord, tile: TileId, color: TileColor) -> bool {
        let Some(i) = self.index(c) else {
            return false;
        };
        let cell = &mut self.cells[i];
        if cell.occupant.is_some() {
            return false;
        }
        cell.occupant = Some(Occupant { tile, color });
        true
    }

    /// Clears `c`, returning the previous occupant. No-op on empty or out-of-bounds cells.
    pub fn vacate(&mut self, c: GridCoord) -> Option<TileId> {
        let i = self.index(c)?;
        self.cells[i].occupant.take().map(|o| o.tile)
    }

    /// Marks `c` as claimed by a landed-but-uncommitted tile.
    pub fn reserve(&mut self, c: GridCoord) -> bool {
        self.in_bounds(c) && self.reserved.insert(c)
    }

    pub fn release(&mut self, c: GridCoord) {
        self.reserved.remove(&c);
    }

    pub fn is_reserved(&self, c: GridCoord) -> bool {
        self.reserved.contains(&c)
    }

    /// Available and not reserved: a tile in flight may still land here.
    #[inline]
    pub fn is_free(&self, c: GridCoord) -> bool {
        self.is_available(c) && !self.is_reserved(c)
    }

    /// Lowest free cell of `col` with row ≤ `max_row`, scanning bottom-up.
    pub fn lowest_free_in_column(&self, col: i32, max_row: i32) -> Option<GridCoord> {
        (0..=max_row.min(self.rows - 1))
            .map(|row| GridCoord::new(col, row))
            .find(|c| self.is_free(*c))
    }

    /// Every in-bounds coordinate, bottom row first.
    pub fn coords(&self) -> impl Iterator<Item = GridCoord> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.columns).map(move |col| GridCoord::new(col, row)))
    }

    /// Occupied coordinates with their occupants, bottom row first.
    pub fn occupied(&self) -> impl Iterator<Item = (GridCoord, Occupant)> + '_ {
        self.coords()
            .filter_map(|c| self.cell(c).and_then(|cell| cell.occupant).map(|o| (c, o)))
    }
}
