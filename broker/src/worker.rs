// worker.rs - The seam between the broker and whatever computes a band

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use conway::{Band, BandResult, next_band};
use thiserror::Error;

/// Band update future type alias.
pub type UpdateFut<'a> = Pin<Box<dyn Future<Output = Result<BandResult, WorkerError>> + Send + 'a>>;
/// Stop future type alias.
pub type StopFut<'a> = Pin<Box<dyn Future<Output = Result<(), WorkerError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// The worker could not be reached at all.
    #[error("unreachable: {0}")]
    Unreachable(String),
    /// The worker answered, but not with a usable result.
    #[error("{0}")]
    Failure(String),
}

/// Something that can advance one band by one turn.
pub trait Worker: Send + Sync {
    /// Label used in logs and errors.
    fn name(&self) -> &str;

    /// Next generation of `band`, tagged with `turn + 1`.
    fn update(&self, band: Band, turn: u32) -> UpdateFut<'_>;

    /// Asks the worker to release its resources. Later updates fail.
    fn stop(&self) -> StopFut<'_>;
}

/// In-process worker running the update rule on the blocking pool.
#[derive(Debug)]
pub struct LocalWorker {
    name: String,
    stopped: AtomicBool,
}

impl LocalWorker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Worker for LocalWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&self, band: Band, turn: u32) -> UpdateFut<'_> {
        Box::pin(async move {
            if self.is_stopped() {
                return Err(WorkerError::Unreachable(format!("{} has been stopped", self.name)));
            }
            tokio::task::spawn_blocking(move || next_band(&band, turn))
                .await
                .map_err(|e| WorkerError::Failure(e.to_string()))
        })
    }

    fn stop(&self) -> StopFut<'_> {
        Box::pin(async move {
            self.stopped.store(true, Ordering::Release);
            Ok(())
        })
    }
}

/// `count` local workers named `local-0`, `local-1`, ...
pub fn local_pool(count: usize) -> Vec<Arc<dyn Worker>> {
    (0..count)
        .map(|i| Arc::new(LocalWorker::new(format!("local-{i}"))) as Arc<dyn Worker>)
        .collect()
}
