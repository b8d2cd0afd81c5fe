use thiserror::Error;

/// Failures surfaced by the broker's control operations and its turn loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Partition or merge invariant broken (bad band count, inconsistent turn).
    #[error(transparent)]
    Pipeline(#[from] conway::Error),

    #[error("worker {worker} unreachable while updating band {band}: {reason}")]
    WorkerUnreachable {
        worker: String,
        band: usize,
        reason: String,
    },

    #[error("worker {worker} failed on band {band}: {reason}")]
    WorkerFailure {
        worker: String,
        band: usize,
        reason: String,
    },

    #[error("broker has not been started")]
    NotRunning,

    #[error("broker is already running")]
    AlreadyRunning,

    #[error("broker has stopped")]
    AlreadyStopped,

    #[error("no workers configured")]
    NoWorkers,

    /// The broker task is gone, so nothing can answer.
    #[error("broker task exited")]
    BrokerGone,

    #[error("turn loop aborted: {0}")]
    Aborted(String),
}
