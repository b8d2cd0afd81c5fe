// grid.rs - Grid types for Conway's Game of Life

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Byte value of a live cell in image form.
pub const ALIVE: u8 = 255;
/// Byte value of a dead cell in image form.
pub const DEAD: u8 = 0;

/// Position of a single cell, `x` is the column and `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Row-major matrix of cells, `true` meaning alive.
///
/// `cells.len() == width * height` always holds, including for grids that arrive over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid")]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

/// Wire form of a [`Grid`], checked before it becomes one.
#[derive(Deserialize)]
struct RawGrid {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl TryFrom<RawGrid> for Grid {
    type Error = Error;

    fn try_from(raw: RawGrid) -> Result<Self> {
        let expected = cell_count(raw.width, raw.height)?;
        if raw.cells.len() != expected {
            return Err(Error::Dimensions {
                width: raw.width,
                height: raw.height,
                expected,
                found: raw.cells.len(),
            });
        }
        Ok(Self {
            width: raw.width,
            height: raw.height,
            cells: raw.cells,
        })
    }
}

fn cell_count(width: usize, height: usize) -> Result<usize> {
    width
        .checked_mul(height)
        .ok_or_else(|| Error::Shape(format!("a {width}x{height} grid is too large")))
}

impl Grid {
    /// All-dead grid of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    /// Builds a grid from image bytes (one byte per cell, non-zero is alive).
    pub fn from_bytes(width: usize, height: usize, bytes: &[u8]) -> Result<Self> {
        let expected = cell_count(width, height)?;
        if bytes.len() != expected {
            return Err(Error::Dimensions {
                width,
                height,
                expected,
                found: bytes.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells: bytes.iter().map(|&b| b != DEAD).collect(),
        })
    }

    /// Grid with exactly the listed cells alive. Coordinates wrap around the edges.
    pub fn from_cells(width: usize, height: usize, alive: &[Coord]) -> Self {
        let mut grid = Self::new(width, height);
        for c in alive {
            grid.set(c.x % width, c.y % height, true);
        }
        grid
    }

    /// Stacks rows of equal width on top of each other.
    pub(crate) fn from_rows<'a>(width: usize, rows: impl IntoIterator<Item = &'a [bool]>) -> Self {
        let mut cells = Vec::new();
        let mut height = 0;
        for row in rows {
            debug_assert_eq!(row.len(), width);
            cells.extend_from_slice(row);
            height += 1;
        }
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, alive: bool) {
        self.cells[y * self.width + x] = alive;
    }

    pub fn row(&self, y: usize) -> &[bool] {
        &self.cells[y * self.width..(y + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[bool]> {
        // chunks_exact(0) panics, an empty grid simply has no rows
        self.cells.chunks_exact(self.width.max(1)).take(self.height)
    }

    /// Image form of the grid, ALIVE=255 and DEAD=0.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.cells
            .iter()
            .map(|&alive| if alive { ALIVE } else { DEAD })
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&alive| alive).count()
    }

    /// Every live cell, in row-major order.
    pub fn alive_cells(&self) -> Vec<Coord> {
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &alive)| alive)
            .map(|(i, _)| Coord::new(i % self.width, i / self.width))
            .collect()
    }

    /// Cells whose state differs between `self` and `next`, in row-major order.
    pub fn flipped_cells(&self, next: &Grid) -> Vec<Coord> {
        debug_assert_eq!((self.width, self.height), (next.width, next.height));
        self.cells
            .iter()
            .zip(&next.cells)
            .enumerate()
            .filter(|&(_, (a, b))| a != b)
            .map(|(i, _)| Coord::new(i % self.width, i / self.width))
            .collect()
    }
}
