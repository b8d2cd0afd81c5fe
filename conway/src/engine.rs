// engine.rs - Next-generation rule for one halo-extended band

use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::partition::Band;

/// Interior rows of a band after one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandResult {
    /// Index of the first row in the full grid.
    pub top: usize,
    pub cells: Grid,
    pub alive: usize,
    /// Turn this result belongs to, one past the turn it was computed from.
    pub turn: u32,
}

#[inline]
fn next_state(alive: bool, neighbours: usize) -> bool {
    match (alive, neighbours) {
        (true, 2) | (true, 3) => true, // Survival
        (false, 3) => true,            // Birth
        _ => false,                    // Death or stays dead
    }
}

/// Computes the next generation of the band's interior rows.
///
/// Vertical neighbours come from the band's own halo rows; columns wrap modulo the width.
pub fn next_band(band: &Band, turn: u32) -> BandResult {
    let width = band.width();
    let height = band.height();
    let src = &band.cells;
    let mut cells = Grid::new(width, height);
    let mut alive = 0;

    for y in 1..=height {
        for x in 0..width {
            let left = (x + width - 1) % width;
            let right = (x + 1) % width;
            let mut count = 0;
            for row in [y - 1, y, y + 1] {
                for col in [left, x, right] {
                    if (row, col) != (y, x) && src.get(col, row) {
                        count += 1;
                    }
                }
            }
            if next_state(src.get(x, y), count) {
                cells.set(x, y - 1, true);
                alive += 1;
            }
        }
    }

    BandResult {
        top: band.top,
        cells,
        alive,
        turn: turn + 1,
    }
}

/// Whole-grid generation with wrap on both axes, no banding involved.
pub fn step(grid: &Grid) -> Grid {
    let (width, height) = (grid.width(), grid.height());
    let mut next = Grid::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut count = 0;
            for dy in [height - 1, 0, 1] {
                for dx in [width - 1, 0, 1] {
                    if (dx, dy) != (0, 0) && grid.get((x + dx) % width, (y + dy) % height) {
                        count += 1;
                    }
                }
            }
            next.set(x, y, next_state(grid.get(x, y), count));
        }
    }
    next
}
