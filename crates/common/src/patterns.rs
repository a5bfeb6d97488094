/*
 * Named seed patterns.
 *
 * Coordinates are (x, y) offsets relative to the placement origin; placement
 * wraps around the torus.
 */

use crate::{AliveSet, Cell, GolError, Grid, Result};

/// A named arrangement of alive cells.
#[derive(Debug, Clone, Copy)]
pub struct Pattern {
    pub name: &'static str,
    pub cells: &'static [(u32, u32)],
}

pub const BLOCK: Pattern = Pattern {
    name: "block",
    cells: &[(0, 0), (1, 0), (0, 1), (1, 1)],
};

/// Horizontal phase of the period-2 blinker.
pub const BLINKER: Pattern = Pattern {
    name: "blinker",
    cells: &[(0, 0), (1, 0), (2, 0)],
};

/// South-east travelling glider: moves by (+1, +1) every 4 generations.
pub const GLIDER: Pattern = Pattern {
    name: "glider",
    cells: &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)],
};

pub const BEACON: Pattern = Pattern {
    name: "beacon",
    cells: &[(0, 0), (1, 0), (0, 1), (1, 1), (2, 2), (3, 2), (2, 3), (3, 3)],
};

pub const R_PENTOMINO: Pattern = Pattern {
    name: "r-pentomino",
    cells: &[(1, 0), (2, 0), (0, 1), (1, 1), (1, 2)],
};

pub const PATTERNS: &[Pattern] = &[BLOCK, BLINKER, GLIDER, BEACON, R_PENTOMINO];

impl Pattern {
    /// Looks a pattern up by name (case-insensitive).
    pub fn by_name(name: &str) -> Option<Pattern> {
        PATTERNS
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .copied()
    }

    /// The pattern's cells placed at `origin` on a width x height torus.
    pub fn placed(&self, origin: Cell, width: u32, height: u32) -> AliveSet {
        self.cells
            .iter()
            .map(|&(dx, dy)| Cell::new((origin.x + dx) % width, (origin.y + dy) % height))
            .collect()
    }

    /// A fresh grid containing only this pattern.
    pub fn grid(&self, origin: Cell, width: u32, height: u32) -> Result<Grid> {
        if width == 0 || height == 0 {
            return Err(GolError::InvalidGrid(format!(
                "cannot place {} on a {}x{} grid",
                self.name, width, height
            )));
        }
        Grid::from_alive(width, height, &self.placed(origin, width, height))
    }
}

/// Pseudo-random grid with roughly one cell in three alive; deterministic per seed.
pub fn random_grid(width: u32, height: u32, seed: u64) -> Result<Grid> {
    let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
    let mut alive = AliveSet::new();
    for y in 0..height {
        for x in 0..width {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            if (state >> 33) % 3 == 0 {
                alive.push(Cell::new(x, y));
            }
        }
    }
    Grid::from_alive(width, height, &alive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(Pattern::by_name("Glider").unwrap().cells.len(), 5);
        assert!(Pattern::by_name("spaceship").is_none());
    }

    #[test]
    fn test_placement_wraps() {
        let placed = BLOCK.placed(Cell::new(3, 3), 4, 4);
        assert!(placed.contains(&Cell::new(0, 0)));
        assert!(placed.contains(&Cell::new(3, 3)));
        assert_eq!(placed.len(), 4);
    }

    #[test]
    fn test_random_grid_deterministic() {
        let a = random_grid(16, 16, 7).unwrap();
        let b = random_grid(16, 16, 7).unwrap();
        let c = random_grid(16, 16, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.alive_count() > 0);
    }
}
