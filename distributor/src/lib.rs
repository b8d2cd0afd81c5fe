//! The client side of a run.
//!
//! A [`Distributor`] loads the initial image, starts the broker and then repeatedly takes the
//! latest turn, turning each one into [`Event`]s: flipped cells, a completed turn and, on a
//! timer, the alive-cell count. Keypresses arrive as [`Command`]s. When the run ends the last
//! grid the client saw is written back through the [`ImageIo`] collaborator.

mod distributor;
pub mod event;
pub mod io;

pub use distributor::{ClientConfig, Distributor, DistributorError, Outcome, changed_cells};
pub use event::{Command, Event, State};
pub use io::{ImageIo, IoError, MemoryIo, PgmIo};
