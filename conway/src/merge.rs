// merge.rs - Reassembles band results into one generation

use crate::engine::BandResult;
use crate::error::{Error, Result};
use crate::grid::Grid;

/// Full grid after one turn, as produced by merging every band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub grid: Grid,
    pub alive: usize,
    pub turn: u32,
}

/// Concatenates band results, given in partition order, into one grid of `height` rows.
///
/// Every result must report the same turn; a disagreement means the fan-out went wrong and is
/// returned as [`Error::InconsistentTurn`] rather than reconciled.
pub fn merge(results: &[BandResult], height: usize) -> Result<Merged> {
    let first = results
        .first()
        .ok_or_else(|| Error::Shape("no band results".into()))?;
    let width = first.cells.width();
    let turn = first.turn;

    let mut next_top = 0;
    let mut alive = 0;
    for (band, result) in results.iter().enumerate() {
        if result.turn != turn {
            return Err(Error::InconsistentTurn {
                band,
                expected: turn,
                found: result.turn,
            });
        }
        if result.cells.width() != width {
            return Err(Error::Shape(format!(
                "band {band} is {} cells wide, expected {width}",
                result.cells.width()
            )));
        }
        if result.top != next_top {
            return Err(Error::Shape(format!(
                "band {band} starts at row {}, expected row {next_top}",
                result.top
            )));
        }
        next_top += result.cells.height();
        alive += result.alive;
    }
    if next_top != height {
        return Err(Error::Shape(format!(
            "bands cover {next_top} rows, expected {height}"
        )));
    }

    let grid = Grid::from_rows(width, results.iter().flat_map(|r| r.cells.rows()));
    Ok(Merged { grid, alive, turn })
}
