// patterns.rs - Named seed patterns, stamped into a grid with wrap-around

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::grid::{Coord, Grid};

pub struct Pattern {
    pub name: &'static str,
    /// Live cells as (x, y) offsets from the stamp origin.
    pub cells: &'static [(usize, usize)],
}

pub const PATTERNS: &[Pattern] = &[
    Pattern {
        name: "glider",
        cells: &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)],
    },
    Pattern {
        name: "blinker",
        cells: &[(0, 0), (1, 0), (2, 0)],
    },
    Pattern {
        name: "block",
        cells: &[(0, 0), (1, 0), (0, 1), (1, 1)],
    },
    Pattern {
        name: "toad",
        cells: &[(1, 0), (2, 0), (3, 0), (0, 1), (1, 1), (2, 1)],
    },
    Pattern {
        name: "beacon",
        cells: &[(0, 0), (1, 0), (0, 1), (1, 1), (2, 2), (3, 2), (2, 3), (3, 3)],
    },
    Pattern {
        name: "r-pentomino",
        cells: &[(1, 0), (2, 0), (0, 1), (1, 1), (1, 2)],
    },
];

pub fn find(name: &str) -> Option<&'static Pattern> {
    PATTERNS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

impl Pattern {
    /// Sets the pattern's cells alive at `origin`, wrapping at the grid edges.
    pub fn stamp(&self, grid: &mut Grid, origin: Coord) {
        let (width, height) = (grid.width(), grid.height());
        for &(dx, dy) in self.cells {
            grid.set((origin.x + dx) % width, (origin.y + dy) % height, true);
        }
    }

    /// Empty grid with just this pattern at `origin`.
    pub fn to_grid(&self, width: usize, height: usize, origin: Coord) -> Grid {
        let mut grid = Grid::new(width, height);
        self.stamp(&mut grid, origin);
        grid
    }
}

/// Roughly a third of the cells alive, reproducible from `seed`.
pub fn random_grid(width: usize, height: usize, seed: u64) -> Grid {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    let mut state = hasher.finish();

    let mut grid = Grid::new(width, height);
    for y in 0..height {
        for x in 0..width {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            grid.set(x, y, (state >> 16) % 3 == 0);
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::step;

    #[test]
    fn test_find_is_case_insensitive() {
        assert_eq!(find("Glider").map(|p| p.name), Some("glider"));
        assert!(find("spaceship").is_none());
    }

    #[test]
    fn test_stamp_wraps_at_edges() {
        let grid = find("block").unwrap().to_grid(4, 4, Coord::new(3, 3));
        assert_eq!(
            grid.alive_cells(),
            vec![Coord::new(0, 0), Coord::new(3, 0), Coord::new(0, 3), Coord::new(3, 3)]
        );
    }

    #[test]
    fn test_glider_returns_shifted_after_four_turns() {
        let glider = find("glider").unwrap();
        let mut grid = glider.to_grid(8, 8, Coord::new(0, 0));
        for _ in 0..4 {
            grid = step(&grid);
        }
        assert_eq!(grid, glider.to_grid(8, 8, Coord::new(1, 1)));
    }

    #[test]
    fn test_random_grid_is_reproducible() {
        let a = random_grid(16, 16, 42);
        assert_eq!(a, random_grid(16, 16, 42));
        assert!(a.alive_count() > 0);
    }
}
