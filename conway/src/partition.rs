// partition.rs - Row-band split with toroidal halo rows

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::Grid;

/// Rows `[top, top + height)` of a grid plus one halo row above and below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    /// Index of the first interior row in the full grid.
    pub top: usize,
    /// Halo above, the interior rows, then halo below.
    pub cells: Grid,
}

impl Band {
    /// Number of interior rows, halo excluded.
    pub fn height(&self) -> usize {
        self.cells.height().saturating_sub(2)
    }

    pub fn width(&self) -> usize {
        self.cells.width()
    }
}

/// Interior row ranges for `bands` bands over `height` rows.
///
/// Every band is `height / bands` rows tall except the last, which takes the remainder.
pub fn band_bounds(height: usize, bands: usize) -> Result<Vec<(usize, usize)>> {
    if bands == 0 || bands > height {
        return Err(Error::InvalidPartition { bands, height });
    }
    let step = height / bands;
    Ok((0..bands)
        .map(|i| {
            let top = i * step;
            let bottom = if i == bands - 1 { height } else { top + step };
            (top, bottom)
        })
        .collect())
}

/// Splits `grid` into `bands` halo-extended bands.
pub fn partition(grid: &Grid, bands: usize) -> Result<Vec<Band>> {
    let height = grid.height();
    let bounds = band_bounds(height, bands)?;
    Ok(bounds
        .into_iter()
        .map(|(top, bottom)| {
            let above = if top == 0 { height - 1 } else { top - 1 };
            let below = if bottom >= height { 0 } else { bottom };
            let rows = std::iter::once(grid.row(above))
                .chain((top..bottom).map(|y| grid.row(y)))
                .chain(std::iter::once(grid.row(below)));
            Band {
                top,
                cells: Grid::from_rows(grid.width(), rows),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Coord;

    fn striped(width: usize, height: usize) -> Grid {
        // a distinct pattern per row so misplaced rows are caught
        let alive: Vec<Coord> = (0..height).map(|y| Coord::new(y % width, y)).collect();
        Grid::from_cells(width, height, &alive)
    }

    #[test]
    fn test_last_band_takes_remainder() {
        assert_eq!(band_bounds(10, 3).unwrap(), vec![(0, 3), (3, 6), (6, 10)]);
        assert_eq!(band_bounds(4, 4).unwrap(), vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
        assert_eq!(band_bounds(7, 1).unwrap(), vec![(0, 7)]);
    }

    #[test]
    fn test_rejects_bad_band_counts() {
        assert_eq!(
            band_bounds(5, 0),
            Err(Error::InvalidPartition { bands: 0, height: 5 })
        );
        let grid = Grid::new(4, 3);
        assert_eq!(
            partition(&grid, 4),
            Err(Error::InvalidPartition { bands: 4, height: 3 })
        );
    }

    #[test]
    fn test_interiors_concatenate_to_grid() {
        for height in 1..=12 {
            let grid = striped(5, height);
            for bands in 1..=height {
                let parts = partition(&grid, bands).unwrap();
                assert_eq!(parts.len(), bands);

                let mut next_top = 0;
                let mut rebuilt = Vec::new();
                for band in &parts {
                    assert_eq!(band.top, next_top, "bands must be contiguous");
                    assert_eq!(band.cells.height(), band.height() + 2);
                    for y in 1..=band.height() {
                        rebuilt.extend_from_slice(band.cells.row(y));
                    }
                    next_top += band.height();
                }
                assert_eq!(next_top, height);
                let flat: Vec<bool> = grid.rows().flatten().copied().collect();
                assert_eq!(rebuilt, flat);
            }
        }
    }

    #[test]
    fn test_halo_rows_wrap_toroidally() {
        let grid = striped(6, 9);
        for bands in 1..=9 {
            for band in partition(&grid, bands).unwrap() {
                let above = (band.top + 9 - 1) % 9;
                let below = (band.top + band.height()) % 9;
                assert_eq!(band.cells.row(0), grid.row(above));
                assert_eq!(band.cells.row(band.height() + 1), grid.row(below));
            }
        }
    }

    #[test]
    fn test_single_row_grid_halo_is_itself() {
        let grid = Grid::from_cells(3, 1, &[Coord::new(1, 0)]);
        let bands = partition(&grid, 1).unwrap();
        assert_eq!(bands[0].cells.height(), 3);
        for y in 0..3 {
            assert_eq!(bands[0].cells.row(y), grid.row(0));
        }
    }
}
