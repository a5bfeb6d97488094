/*
 * Strip engine - the Game of Life rule applied to one row range.
 *
 * The engine reads the whole grid (neighbour lookups wrap across edges and
 * into rows owned by other workers) but only emits cells for its own rows.
 * It touches nothing but the snapshot it is given, so any number of strips
 * of the same snapshot can be computed concurrently.
 */

use gol_common::{AliveSet, Cell, Grid, RowRange};

/// Applies the rule to a single cell given its state and live neighbour count.
#[inline]
pub fn next_state(alive: bool, neighbours: u8) -> bool {
    matches!((alive, neighbours), (true, 2) | (true, 3) | (false, 3))
}

/// Computes the next-generation alive cells for `rows`, in absolute coordinates.
///
/// Callers guarantee `rows.end() <= grid.height()`.
pub fn compute_strip(grid: &Grid, rows: RowRange) -> AliveSet {
    let mut alive = AliveSet::new();
    for y in rows.offset..rows.end() {
        for x in 0..grid.width() {
            if next_state(grid.is_alive(x, y), grid.live_neighbours(x, y)) {
                alive.push(Cell::new(x, y));
            }
        }
    }
    alive
}

/// Computes the whole next generation in-process.
pub fn next_generation(grid: &Grid) -> Grid {
    let alive = compute_strip(grid, RowRange::new(0, grid.height()));
    let mut next = grid.clone();
    next.clear();
    for cell in alive {
        // Cells come from the same grid's bounds
        let _ = next.set_alive(cell);
    }
    next
}

/// Runs `turns` generations in-process.
pub fn run_turns(grid: &Grid, turns: u32) -> Grid {
    (0..turns).fold(grid.clone(), |g, _| next_generation(&g))
}
