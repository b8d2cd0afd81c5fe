//! Game of Life core: the grid model, the row-band partitioner, the per-band update rule and
//! the merger that stitches band results back together.
//!
//! ```text
//! Grid --partition--> [Band; N] --next_band--> [BandResult; N] --merge--> Merged
//! ```
//!
//! Everything here is pure and synchronous; distribution across workers lives in
//! `conway_broker`.

pub mod engine;
pub mod error;
pub mod grid;
pub mod merge;
pub mod partition;
pub mod patterns;

pub use engine::{BandResult, next_band, step};
pub use error::{Error, Result};
pub use grid::{ALIVE, Coord, DEAD, Grid};
pub use merge::{Merged, merge};
pub use partition::{Band, band_bounds, partition};
pub use patterns::{PATTERNS, Pattern};

use serde::{Deserialize, Serialize};

/// Run parameters shared by the broker and the client loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Turn budget.
    pub turns: u32,
    /// Number of bands each turn is split into.
    pub threads: usize,
    pub image_width: usize,
    pub image_height: usize,
}

impl Params {
    /// Name the initial image is loaded under, `{height}x{width}`.
    pub fn input_name(&self) -> String {
        format!("{}x{}", self.image_height, self.image_width)
    }

    /// Name a snapshot at `turn` is written under, `{height}x{width}x{turn}`.
    pub fn output_name(&self, turn: u32) -> String {
        format!("{}x{}x{}", self.image_height, self.image_width, turn)
    }
}
