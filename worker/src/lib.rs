//! TCP transport for Game of Life workers.
//!
//! [`serve`] runs a worker process; [`RemoteWorker`] is the broker's view of one. Messages are
//! JSON objects, one per line:
//!
//! ```text
//! broker -> worker   {"Update":{"band":{..},"turn":3}}   "Stop"
//! worker -> broker   {"Updated":{..}}   "Stopped"   {"Error":"..."}
//! ```

mod client;
pub mod protocol;
mod server;

pub use client::RemoteWorker;
pub use server::serve;

use conway_broker::WorkerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection closed by peer")]
    Closed,
}

impl From<TransportError> for WorkerError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Io(_) | TransportError::Closed => WorkerError::Unreachable(e.to_string()),
            TransportError::Json(_) => WorkerError::Failure(e.to_string()),
        }
    }
}
