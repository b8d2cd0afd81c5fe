// error.rs - Failures raised by the partition/merge pipeline

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Band count is zero or larger than the grid height.
    #[error("cannot split {height} rows into {bands} bands")]
    InvalidPartition { bands: usize, height: usize },

    /// Band results disagree on which turn they produced.
    #[error("band {band} reports turn {found}, expected turn {expected}")]
    InconsistentTurn {
        band: usize,
        expected: u32,
        found: u32,
    },

    /// Band results cannot be stitched into one grid.
    #[error("cannot merge bands: {0}")]
    Shape(String),

    /// Raw image bytes do not match the requested dimensions.
    #[error("expected {expected} cells for a {width}x{height} grid, got {found}")]
    Dimensions {
        width: usize,
        height: usize,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
