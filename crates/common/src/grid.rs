/*
 * Grid model for the toroidal Game of Life board.
 *
 * The grid is stored row-major with one byte per cell (0xFF alive, 0x00 dead),
 * which is also its wire encoding. Neighbour lookups wrap at all four edges.
 */

use crate::{GolError, Result};
use serde::{Deserialize, Serialize};

/// Byte value of an alive cell.
pub const ALIVE: u8 = 0xFF;
/// Byte value of a dead cell.
pub const DEAD: u8 = 0x00;

/// A cell coordinate: `x` is the column, `y` is the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

impl Cell {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Unordered collection of alive cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliveSet {
    cells: Vec<Cell>,
}

impl AliveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    pub fn extend(&mut self, other: AliveSet) {
        self.cells.extend(other.cells);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub fn contains(&self, cell: &Cell) -> bool {
        self.cells.contains(cell)
    }

    /// Sorted, deduplicated copy, for order-insensitive comparison.
    pub fn normalized(&self) -> AliveSet {
        let mut cells = self.cells.clone();
        cells.sort_unstable_by_key(|c| (c.y, c.x));
        cells.dedup();
        AliveSet { cells }
    }

    /// Translates every cell by (dx, dy) on a width x height torus.
    pub fn translated(&self, dx: i64, dy: i64, width: u32, height: u32) -> AliveSet {
        let cells = self
            .cells
            .iter()
            .map(|c| {
                Cell::new(
                    (c.x as i64 + dx).rem_euclid(width as i64) as u32,
                    (c.y as i64 + dy).rem_euclid(height as i64) as u32,
                )
            })
            .collect();
        AliveSet { cells }
    }

    pub fn into_vec(self) -> Vec<Cell> {
        self.cells
    }
}

impl From<Vec<Cell>> for AliveSet {
    fn from(cells: Vec<Cell>) -> Self {
        Self { cells }
    }
}

impl FromIterator<Cell> for AliveSet {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for AliveSet {
    type Item = Cell;
    type IntoIter = std::vec::IntoIter<Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

/// A contiguous row range `[offset, offset + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub offset: u32,
    pub height: u32,
}

impl RowRange {
    pub const fn new(offset: u32, height: u32) -> Self {
        Self { offset, height }
    }

    /// One past the last row, saturating at `u32::MAX`.
    pub fn end(&self) -> u32 {
        self.offset.saturating_add(self.height)
    }

    /// One past the last row, or None if the range overflows `u32`.
    pub fn checked_end(&self) -> Option<u32> {
        self.offset.checked_add(self.height)
    }

    pub fn contains(&self, row: u32) -> bool {
        row >= self.offset && row < self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }
}

/// Fixed-size toroidal grid of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<u8>,
}

impl Grid {
    /// Creates an all-dead grid.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GolError::InvalidGrid(format!(
                "dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            cells: vec![DEAD; width as usize * height as usize],
        })
    }

    /// Builds a grid from its row-major byte encoding. Any non-zero byte is alive.
    pub fn from_bytes(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self> {
        let mut grid = Self::new(width, height)?;
        if bytes.len() != grid.cells.len() {
            return Err(GolError::InvalidGrid(format!(
                "expected {} cell bytes for {}x{}, got {}",
                grid.cells.len(),
                width,
                height,
                bytes.len()
            )));
        }
        grid.cells = bytes
            .into_iter()
            .map(|b| if b == DEAD { DEAD } else { ALIVE })
            .collect();
        Ok(grid)
    }

    /// Builds a grid with exactly the given cells alive.
    pub fn from_alive(width: u32, height: u32, alive: &AliveSet) -> Result<Self> {
        let mut grid = Self::new(width, height)?;
        for cell in alive.iter() {
            grid.set_alive(*cell)?;
        }
        Ok(grid)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major cell bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Returns whether (x, y) is alive. Coordinates must be in bounds.
    pub fn is_alive(&self, x: u32, y: u32) -> bool {
        self.cells[self.index(x, y)] == ALIVE
    }

    pub fn set_alive(&mut self, cell: Cell) -> Result<()> {
        if cell.x >= self.width || cell.y >= self.height {
            return Err(GolError::InvalidGrid(format!(
                "cell ({}, {}) outside {}x{} grid",
                cell.x, cell.y, self.width, self.height
            )));
        }
        let idx = self.index(cell.x, cell.y);
        self.cells[idx] = ALIVE;
        Ok(())
    }

    /// Resets every cell to dead.
    pub fn clear(&mut self) {
        self.cells.fill(DEAD);
    }

    /// Counts the eight neighbours of (x, y), wrapping across every edge.
    pub fn live_neighbours(&self, x: u32, y: u32) -> u8 {
        let left = if x == 0 { self.width - 1 } else { x - 1 };
        let right = if x + 1 == self.width { 0 } else { x + 1 };
        let up = if y == 0 { self.height - 1 } else { y - 1 };
        let down = if y + 1 == self.height { 0 } else { y + 1 };

        [
            (left, up),
            (x, up),
            (right, up),
            (left, y),
            (right, y),
            (left, down),
            (x, down),
            (right, down),
        ]
        .iter()
        .filter(|&&(nx, ny)| self.is_alive(nx, ny))
        .count() as u8
    }

    /// Every alive cell, in row-major order.
    pub fn alive_cells(&self) -> AliveSet {
        let width = self.width as usize;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == ALIVE)
            .map(|(i, _)| Cell::new((i % width) as u32, (i / width) as u32))
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&b| b == ALIVE).count()
    }
}
