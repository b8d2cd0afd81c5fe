// event.rs - What the client loop reports and what it can be told to do

use conway::Coord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Paused,
    Executing,
    Quitting,
}

/// Output of the client loop, consumed by whatever renders or logs progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Cells whose state changed to reach `completed_turns`.
    CellsFlipped {
        completed_turns: u32,
        cells: Vec<Coord>,
    },
    TurnComplete {
        completed_turns: u32,
    },
    /// Periodic progress report.
    AliveCellsCount {
        completed_turns: u32,
        cells_count: usize,
    },
    ImageOutputComplete {
        completed_turns: u32,
        filename: String,
    },
    StateChange {
        completed_turns: u32,
        new_state: State,
    },
    FinalTurnComplete {
        completed_turns: u32,
        alive: Vec<Coord>,
    },
}

/// Input to the client loop, already decoded from whatever front end produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Pause, or resume when already paused.
    Pause,
    /// Write the current grid without interrupting the run.
    Snapshot,
    /// Finish the turn in flight, save it and end the run.
    Quit,
    /// Halt broker and workers immediately, save the last known turn.
    Stop,
}
