//! Turn orchestration for the distributed Game of Life.
//!
//! The broker owns the canonical grid. Each turn it partitions the grid into bands, sends
//! every band to a [`Worker`], merges the results and then parks at a single-slot
//! [rendezvous](rendezvous) until the client takes the turn. The client therefore sets the
//! pace: a client that stops asking stops the broker one turn later.
//!
//! ```text
//! client --get_latest_turn--> BrokerHandle --request--> Broker task
//!                                                         |
//!                                  TurnLoop: partition -> dispatch -> merge -> publish
//!                                                         |
//!                                               Worker::update per band
//! ```

mod broker;
mod error;
pub mod rendezvous;
pub mod worker;

pub use broker::{BrokerHandle, Status, TurnSnapshot};
pub use error::BrokerError;
pub use worker::{LocalWorker, StopFut, UpdateFut, Worker, WorkerError, local_pool};
